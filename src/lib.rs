//! Impulse Physics – collision detection and constraint solving for 3-D rigid bodies.
//!
//! The crate is organised the way a step flows: a dynamic AABB tree feeds
//! candidate pairs to the narrow phase, whose persistent contact manifolds and
//! the registered joints are then resolved by a warm-started sequential
//! impulse solver. [`PhysicsWorld`] ties the stages together behind a small
//! object-management API.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{Mat3, Quat, Vec3};

pub use collision::{
    broadphase::{BroadPhase, BroadPhaseEvents},
    contact::{ContactManifold, ContactPoint, ContactPointInfo},
    detection::{CollisionDetection, CollisionEventListener},
    narrowphase::{NarrowPhase, NarrowPhaseAlgorithm},
    pair::{OverlappingPair, PairKey},
};
pub use config::{PositionCorrection, WorldConfig};
pub use core::{
    aabb::Aabb,
    mesh::{HeightField, Triangle, TriangleMesh},
    rigidbody::{BodyHandle, RigidBody, RigidBodyBuilder},
    shape::{CollisionShape, ShapeType},
    types::{MassProperties, Material, Transform, Velocity},
};
pub use dynamics::{
    joints::{Joint, JointAnchors, JointDesc, JointHandle, JointKind},
    solver::{ConstraintSolver, SolverStepMetrics},
};
pub use error::{PhysicsError, Result};
pub use utils::allocator::{Arena, Handle};
pub use world::PhysicsWorld;
