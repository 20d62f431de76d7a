//! Errors returned by the object-management API of the world.

use thiserror::Error;

use crate::{core::rigidbody::BodyHandle, dynamics::joints::JointHandle};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("Unknown body: {0:?}")]
    UnknownBody(BodyHandle),

    #[error("Unknown joint: {0:?}")]
    UnknownJoint(JointHandle),

    #[error("Joint connects body {0:?} to itself")]
    SelfJoint(BodyHandle),

    #[error("Invalid shape: {0}")]
    InvalidShape(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
