use std::collections::HashMap;

use glam::{Mat3, Quat, Vec3};

use crate::{
    config::{PositionCorrection, WorldConfig},
    core::{
        rigidbody::{BodyHandle, RigidBody},
        types::Transform,
    },
    dynamics::{contact_constraint::ContactConstraint, joints::Joint},
    utils::{allocator::Arena, logging::ScopedTimer, math},
};

/// Per-step copy of a body's state that constraints read and mutate.
#[derive(Debug, Clone)]
pub struct SolverBody {
    pub handle: BodyHandle,
    pub position: Vec3,
    pub orientation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub inverse_mass: f32,
    pub local_inverse_inertia: Mat3,
    /// World-space inverse inertia for the current `orientation`.
    pub inverse_inertia: Mat3,
    pub motion_enabled: bool,
    pub force: Vec3,
    pub torque: Vec3,
    pub gravity_enabled: bool,
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl SolverBody {
    pub fn from_body(handle: BodyHandle, body: &RigidBody) -> Self {
        Self {
            handle,
            position: body.transform.position,
            orientation: body.transform.rotation,
            linear_velocity: body.velocity.linear,
            angular_velocity: body.velocity.angular,
            inverse_mass: body.inverse_mass(),
            local_inverse_inertia: body.local_inverse_inertia(),
            inverse_inertia: body.world_inverse_inertia(),
            motion_enabled: body.is_motion_enabled(),
            force: body.force(),
            torque: body.torque(),
            gravity_enabled: body.gravity_enabled,
            linear_damping: body.linear_damping,
            angular_damping: body.angular_damping,
        }
    }

    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.orientation)
    }

    /// Velocity of the material point at offset `r` from the center of mass.
    pub fn velocity_at(&self, r: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    /// Applies `impulse` at offset `r`. Bodies with motion disabled are untouched.
    pub fn apply_impulse(&mut self, impulse: Vec3, r: Vec3) {
        if !self.motion_enabled {
            return;
        }
        self.linear_velocity += impulse * self.inverse_mass;
        self.angular_velocity += self.inverse_inertia * r.cross(impulse);
    }

    /// Applies a position-level impulse as a direct pseudo-velocity update of
    /// position and orientation.
    pub fn apply_position_impulse(&mut self, impulse: Vec3, r: Vec3) {
        if !self.motion_enabled {
            return;
        }
        self.position += impulse * self.inverse_mass;
        let rotation = self.inverse_inertia * r.cross(impulse);
        self.orientation = math::integrate_orientation(self.orientation, rotation);
        self.refresh_inertia();
    }

    pub fn refresh_inertia(&mut self) {
        self.inverse_inertia =
            math::world_inverse_inertia(self.orientation, self.local_inverse_inertia);
    }

    /// Contribution `(1/m) I + skew(r) I⁻¹ skew(r)ᵀ` of this body to a point
    /// constraint's mass matrix; zero when motion is disabled.
    pub fn point_mass_matrix(&self, r: Vec3) -> Mat3 {
        if !self.motion_enabled {
            return Mat3::ZERO;
        }
        let skew = math::skew_symmetric(r);
        Mat3::from_diagonal(Vec3::splat(self.inverse_mass))
            + skew * self.inverse_inertia * skew.transpose()
    }

    /// Contribution of this body to the scalar effective mass along `axis` at `r`.
    pub fn axis_inverse_mass(&self, r: Vec3, axis: Vec3) -> f32 {
        if !self.motion_enabled {
            return 0.0;
        }
        let rn = r.cross(axis);
        self.inverse_mass + rn.dot(self.inverse_inertia * rn)
    }
}

/// Shared per-step arrays of body state, indexed through a handle map.
///
/// Built at the start of a step, mutated by the integrator and every
/// constraint, then written back to the bodies once the step completes.
#[derive(Debug, Clone, Default)]
pub struct SolverStepData {
    pub dt: f32,
    pub bodies: Vec<SolverBody>,
    index: HashMap<BodyHandle, usize>,
}

impl SolverStepData {
    pub fn gather(bodies: &Arena<RigidBody>, dt: f32) -> Self {
        let mut data = Self {
            dt,
            bodies: Vec::with_capacity(bodies.len()),
            index: HashMap::with_capacity(bodies.len()),
        };
        for (handle, body) in bodies.iter() {
            data.index.insert(handle, data.bodies.len());
            data.bodies.push(SolverBody::from_body(handle, body));
        }
        data
    }

    pub fn index_of(&self, handle: BodyHandle) -> Option<usize> {
        self.index.get(&handle).copied()
    }

    pub fn body(&self, index: usize) -> &SolverBody {
        &self.bodies[index]
    }

    pub fn body_mut(&mut self, index: usize) -> &mut SolverBody {
        &mut self.bodies[index]
    }

    /// Mutable access to two distinct bodies.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> (&mut SolverBody, &mut SolverBody) {
        debug_assert_ne!(a, b, "constraint references the same body twice");
        if a < b {
            let (left, right) = self.bodies.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.bodies.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// Copies positions and velocities back into the bodies and refreshes their AABBs.
    pub fn write_back(&self, bodies: &mut Arena<RigidBody>) {
        for state in &self.bodies {
            let Some(body) = bodies.get_mut(state.handle) else {
                log::warn!("body {:?} vanished during the step", state.handle);
                continue;
            };
            if state.motion_enabled {
                body.transform.position = state.position;
                body.transform.rotation = state.orientation;
                body.velocity.linear = state.linear_velocity;
                body.velocity.angular = state.angular_velocity;
            }
            body.clear_forces();
            body.update_aabb();
        }
    }
}

/// Solver parameters taken from the world configuration.
#[derive(Debug, Clone, Copy)]
pub struct SolverSettings {
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub baumgarte_factor: f32,
    pub warm_starting: bool,
    pub joint_position_correction: PositionCorrection,
    pub contact_position_correction: PositionCorrection,
    pub contact_slop: f32,
    pub restitution_velocity_threshold: f32,
    pub max_position_correction: f32,
    pub convergence_tolerance: Option<f32>,
}

impl From<&WorldConfig> for SolverSettings {
    fn from(config: &WorldConfig) -> Self {
        Self {
            velocity_iterations: config.velocity_iterations,
            position_iterations: config.position_iterations,
            baumgarte_factor: config.baumgarte_factor,
            warm_starting: config.warm_starting,
            joint_position_correction: config.joint_position_correction,
            contact_position_correction: config.contact_position_correction,
            contact_slop: config.contact_slop,
            restitution_velocity_threshold: config.restitution_velocity_threshold,
            max_position_correction: config.max_position_correction,
            convergence_tolerance: config.convergence_tolerance,
        }
    }
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self::from(&WorldConfig::default())
    }
}

/// Four-phase protocol shared by joints and contacts.
pub trait Constraint {
    /// Resolves body indices, anchors, effective masses and bias terms.
    fn init(&mut self, step: &SolverStepData, settings: &SolverSettings);

    /// Re-applies the impulse accumulated during the previous step.
    fn warm_start(&mut self, step: &mut SolverStepData);

    /// One velocity iteration. Returns the magnitude of the impulse increment.
    fn solve_velocity(&mut self, step: &mut SolverStepData) -> f32;

    /// One position iteration. Returns the constraint error measured before
    /// the correction; constraints without a position pass return zero.
    fn solve_position(&mut self, step: &mut SolverStepData, settings: &SolverSettings) -> f32;
}

/// Counters and impulse sums recorded by the last solve.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SolverStepMetrics {
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub contacts_solved: usize,
    pub joints_solved: usize,
    pub normal_impulse_sum: f32,
    pub tangent_impulse_sum: f32,
    pub joint_impulse_sum: f32,
    /// Largest constraint error seen by the last position iteration.
    pub max_position_error: f32,
}

impl SolverStepMetrics {
    pub fn merge(&mut self, other: &Self) {
        self.velocity_iterations += other.velocity_iterations;
        self.position_iterations += other.position_iterations;
        self.contacts_solved += other.contacts_solved;
        self.joints_solved += other.joints_solved;
        self.normal_impulse_sum += other.normal_impulse_sum;
        self.tangent_impulse_sum += other.tangent_impulse_sum;
        self.joint_impulse_sum += other.joint_impulse_sum;
        self.max_position_error = self.max_position_error.max(other.max_position_error);
    }
}

/// Sequential-impulse solver over joints and contact constraints.
#[derive(Debug, Clone)]
pub struct ConstraintSolver {
    pub settings: SolverSettings,
    metrics: SolverStepMetrics,
}

impl Default for ConstraintSolver {
    fn default() -> Self {
        Self::new(SolverSettings::default())
    }
}

impl ConstraintSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self {
            settings,
            metrics: SolverStepMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &SolverStepMetrics {
        &self.metrics
    }

    /// Init, warm start and velocity iterations. Stops early once every
    /// increment is below the convergence tolerance, if one is set.
    pub fn solve_velocities(
        &mut self,
        step: &mut SolverStepData,
        joints: &mut [&mut Joint],
        contacts: &mut [ContactConstraint],
    ) {
        let _timer = ScopedTimer::new("solve_velocities");
        let settings = self.settings;
        self.metrics = SolverStepMetrics {
            contacts_solved: contacts.iter().map(|c| c.len()).sum(),
            joints_solved: joints.len(),
            ..Default::default()
        };

        for joint in joints.iter_mut() {
            joint.init(step, &settings);
        }
        for contact in contacts.iter_mut() {
            contact.init(step, &settings);
        }

        if settings.warm_starting {
            for joint in joints.iter_mut() {
                joint.warm_start(step);
            }
            for contact in contacts.iter_mut() {
                contact.warm_start(step);
            }
        }

        for iteration in 0..settings.velocity_iterations {
            let mut largest_increment: f32 = 0.0;
            for joint in joints.iter_mut() {
                largest_increment = largest_increment.max(joint.solve_velocity(step));
            }
            for contact in contacts.iter_mut() {
                largest_increment = largest_increment.max(contact.solve_velocity(step));
            }
            self.metrics.velocity_iterations = iteration + 1;

            if matches!(settings.convergence_tolerance, Some(t) if largest_increment < t) {
                log::trace!("velocity solve converged after {} iterations", iteration + 1);
                break;
            }
        }

        self.metrics.joint_impulse_sum = joints.iter().map(|j| j.impulse_magnitude()).sum();
        for contact in contacts.iter() {
            let (normal, tangent) = contact.impulse_sums();
            self.metrics.normal_impulse_sum += normal;
            self.metrics.tangent_impulse_sum += tangent;
        }
    }

    /// Position iterations for constraints using non-linear correction.
    pub fn solve_positions(
        &mut self,
        step: &mut SolverStepData,
        joints: &mut [&mut Joint],
        contacts: &mut [ContactConstraint],
    ) {
        let _timer = ScopedTimer::new("solve_positions");
        let settings = self.settings;
        for _ in 0..settings.position_iterations {
            let mut largest_error: f32 = 0.0;
            for joint in joints.iter_mut() {
                largest_error = largest_error.max(joint.solve_position(step, &settings));
            }
            for contact in contacts.iter_mut() {
                largest_error = largest_error.max(contact.solve_position(step, &settings));
            }
            self.metrics.position_iterations += 1;
            self.metrics.max_position_error = largest_error;
        }
    }
}
