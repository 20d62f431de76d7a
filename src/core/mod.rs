//! Core types describing bodies, shapes, and shared geometric data.

pub mod aabb;
pub mod mesh;
pub mod rigidbody;
pub mod shape;
pub mod types;

pub use aabb::Aabb;
pub use mesh::{HeightField, MeshBuilder, Triangle, TriangleMesh};
pub use rigidbody::{BodyHandle, RigidBody, RigidBodyBuilder};
pub use shape::{CollisionShape, ShapeType, SupportMap};
pub use types::{MassProperties, Material, Transform, Velocity};
