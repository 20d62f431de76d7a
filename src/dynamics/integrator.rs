use glam::Vec3;

use crate::{
    dynamics::solver::{SolverBody, SolverStepData},
    utils::math,
};

/// Semi-implicit Euler integrator over the step's body arrays.
#[derive(Debug, Clone, Copy)]
pub struct Integrator {
    pub gravity: Vec3,
}

impl Integrator {
    pub fn new(gravity: Vec3) -> Self {
        Self { gravity }
    }

    /// Applies gravity, external forces and damping to the velocities.
    pub fn integrate_velocity(&self, body: &mut SolverBody, dt: f32) {
        if !body.motion_enabled {
            return;
        }

        let mut acceleration = body.force * body.inverse_mass;
        if body.gravity_enabled {
            acceleration += self.gravity;
        }
        body.linear_velocity += acceleration * dt;
        body.angular_velocity += body.inverse_inertia * body.torque * dt;

        body.linear_velocity *= (1.0 - body.linear_damping * dt).max(0.0);
        body.angular_velocity *= (1.0 - body.angular_damping * dt).max(0.0);
    }

    /// Advances position and orientation with the solved velocities.
    pub fn integrate_position(&self, body: &mut SolverBody, dt: f32) {
        if !body.motion_enabled {
            return;
        }

        body.position += body.linear_velocity * dt;
        body.orientation = math::integrate_orientation(body.orientation, body.angular_velocity * dt);
        body.refresh_inertia();
    }

    pub fn integrate_velocities(&self, step: &mut SolverStepData) {
        let dt = step.dt;
        for body in &mut step.bodies {
            self.integrate_velocity(body, dt);
        }
    }

    pub fn integrate_positions(&self, step: &mut SolverStepData) {
        let dt = step.dt;
        for body in &mut step.bodies {
            self.integrate_position(body, dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{rigidbody::RigidBody, shape::CollisionShape},
        utils::allocator::Arena,
    };
    use approx::assert_abs_diff_eq;

    #[test]
    fn gravity_only_moves_dynamic_bodies() {
        let mut bodies = Arena::new();
        let falling = bodies.insert(
            RigidBody::builder(CollisionShape::sphere(0.5))
                .damping(0.0, 0.0)
                .build(),
        );
        let ground = bodies.insert(
            RigidBody::builder(CollisionShape::cuboid(Vec3::ONE))
                .fixed()
                .build(),
        );
        let floating = bodies.insert(
            RigidBody::builder(CollisionShape::sphere(0.5))
                .gravity_enabled(false)
                .build(),
        );

        let integrator = Integrator::new(Vec3::new(0.0, -10.0, 0.0));
        let mut step = SolverStepData::gather(&bodies, 0.1);
        integrator.integrate_velocities(&mut step);
        integrator.integrate_positions(&mut step);

        let falling = step.body(step.index_of(falling).unwrap());
        assert_abs_diff_eq!(falling.linear_velocity.y, -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(falling.position.y, -0.1, epsilon = 1e-6);
        assert_eq!(step.body(step.index_of(ground).unwrap()).linear_velocity, Vec3::ZERO);
        assert_eq!(step.body(step.index_of(floating).unwrap()).position, Vec3::ZERO);
    }

    #[test]
    fn spin_keeps_orientation_normalized() {
        let mut bodies = Arena::new();
        let spinning = bodies.insert(
            RigidBody::builder(CollisionShape::cuboid(Vec3::splat(0.5)))
                .angular_velocity(Vec3::new(3.0, 7.0, -2.0))
                .gravity_enabled(false)
                .build(),
        );
        let integrator = Integrator::new(Vec3::ZERO);
        let mut step = SolverStepData::gather(&bodies, 1.0 / 60.0);
        for _ in 0..600 {
            integrator.integrate_positions(&mut step);
        }
        let q = step.body(step.index_of(spinning).unwrap()).orientation;
        assert_abs_diff_eq!(q.length(), 1.0, epsilon = 1e-5);
    }
}
