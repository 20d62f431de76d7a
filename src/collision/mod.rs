//! Collision detection modules: broad phase, narrow phase, contact manifolds.

pub mod broadphase;
pub mod contact;
pub mod detection;
pub mod dynamic_tree;
pub mod gjk;
pub mod narrowphase;
pub mod pair;

pub use broadphase::{BroadPhase, BroadPhaseEvents};
pub use contact::{ContactManifold, ContactPoint, ContactPointInfo};
pub use detection::{CollisionDetection, CollisionEventListener};
pub use dynamic_tree::DynamicTree;
pub use narrowphase::{NarrowPhase, NarrowPhaseAlgorithm};
pub use pair::{OverlappingPair, PairKey};
