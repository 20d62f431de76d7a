//! Global configuration constants and the serializable world configuration.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Velocity iterations performed per step.
pub const DEFAULT_VELOCITY_ITERATIONS: u32 = 10;

/// Position iterations performed per step by the non-linear correction pass.
pub const DEFAULT_POSITION_ITERATIONS: u32 = 5;

/// Fraction of the position error fed back as velocity bias (Baumgarte).
pub const DEFAULT_BAUMGARTE_FACTOR: f32 = 0.2;

/// Default damping applied to linear velocity.
pub const DEFAULT_LINEAR_DAMPING: f32 = 0.02;

/// Default damping applied to angular velocity.
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.02;

/// Margin added around every tight AABB stored in the broad-phase tree.
pub const DEFAULT_AABB_MARGIN: f32 = 0.1;

/// Penetration tolerated without positional correction.
pub const DEFAULT_CONTACT_SLOP: f32 = 0.005;

/// Separation up to which an already touching pair keeps its contacts.
pub const DEFAULT_CONTACT_MARGIN: f32 = 0.02;

/// Drift beyond which a cached contact point is dropped.
pub const DEFAULT_PERSISTENT_CONTACT_THRESHOLD: f32 = 0.03;

/// Approach speed below which restitution is ignored.
pub const DEFAULT_RESTITUTION_VELOCITY_THRESHOLD: f32 = 1.0;

/// Largest per-iteration position correction applied to a contact.
pub const DEFAULT_MAX_POSITION_CORRECTION: f32 = 0.2;

/// Upper bound on accumulated fixed steps consumed by one `step` call.
pub const MAX_SUBSTEPS: u32 = 8;

/// How a constraint removes positional drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PositionCorrection {
    /// Velocity bias proportional to error / dt, scaled by the Baumgarte factor.
    Baumgarte,
    /// Separate pass on positions and orientations after velocity integration.
    #[default]
    NonLinearGaussSeidel,
}

/// Tunable parameters of a [`crate::world::PhysicsWorld`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: Vec3,
    pub time_step: f32,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub baumgarte_factor: f32,
    pub warm_starting: bool,
    pub joint_position_correction: PositionCorrection,
    pub contact_position_correction: PositionCorrection,
    pub contact_slop: f32,
    pub contact_margin: f32,
    pub persistent_contact_threshold: f32,
    pub restitution_velocity_threshold: f32,
    pub max_position_correction: f32,
    pub aabb_margin: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Stop the velocity loop once every incremental impulse drops below this.
    pub convergence_tolerance: Option<f32>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            time_step: DEFAULT_TIME_STEP,
            velocity_iterations: DEFAULT_VELOCITY_ITERATIONS,
            position_iterations: DEFAULT_POSITION_ITERATIONS,
            baumgarte_factor: DEFAULT_BAUMGARTE_FACTOR,
            warm_starting: true,
            joint_position_correction: PositionCorrection::NonLinearGaussSeidel,
            contact_position_correction: PositionCorrection::Baumgarte,
            contact_slop: DEFAULT_CONTACT_SLOP,
            contact_margin: DEFAULT_CONTACT_MARGIN,
            persistent_contact_threshold: DEFAULT_PERSISTENT_CONTACT_THRESHOLD,
            restitution_velocity_threshold: DEFAULT_RESTITUTION_VELOCITY_THRESHOLD,
            max_position_correction: DEFAULT_MAX_POSITION_CORRECTION,
            aabb_margin: DEFAULT_AABB_MARGIN,
            linear_damping: DEFAULT_LINEAR_DAMPING,
            angular_damping: DEFAULT_ANGULAR_DAMPING,
            convergence_tolerance: None,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Err(PhysicsError::InvalidConfig(reason.to_string()));
        if !(self.time_step > 0.0 && self.time_step.is_finite()) {
            return invalid("time_step must be positive and finite");
        }
        if self.velocity_iterations == 0 {
            return invalid("velocity_iterations must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.baumgarte_factor) {
            return invalid("baumgarte_factor must lie in [0, 1]");
        }
        if self.aabb_margin < 0.0 || self.contact_margin < 0.0 || self.contact_slop < 0.0 {
            return invalid("margins and slop must be non-negative");
        }
        if self.max_position_correction <= 0.0 {
            return invalid("max_position_correction must be positive");
        }
        if self.linear_damping < 0.0 || self.angular_damping < 0.0 {
            return invalid("damping must be non-negative");
        }
        if !self.gravity.is_finite() {
            return invalid("gravity must be finite");
        }
        if matches!(self.convergence_tolerance, Some(t) if t <= 0.0) {
            return invalid("convergence_tolerance must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = WorldConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.baumgarte_factor, 0.2);
    }

    #[test]
    fn zero_iterations_rejected() {
        let config = WorldConfig {
            velocity_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PhysicsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn negative_damping_rejected() {
        let config = WorldConfig {
            angular_damping: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
