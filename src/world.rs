use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::{
    collision::{
        contact::ContactManifold,
        detection::{CollisionDetection, CollisionEventListener},
        pair::PairKey,
    },
    config::{WorldConfig, DEFAULT_TIME_STEP, MAX_SUBSTEPS},
    core::rigidbody::{BodyHandle, RigidBody},
    dynamics::{
        contact_constraint::ContactConstraint,
        integrator::Integrator,
        joints::{Joint, JointDesc, JointHandle},
        solver::{ConstraintSolver, SolverSettings, SolverStepData, SolverStepMetrics},
    },
    error::{PhysicsError, Result},
    utils::{allocator::Arena, logging::ScopedTimer},
};

/// Central simulation container: owns bodies and joints and runs the
/// collision and constraint pipelines once per fixed step.
pub struct PhysicsWorld {
    bodies: Arena<RigidBody>,
    joints: Arena<Joint>,
    /// No-collision pairs registered on behalf of joints.
    joint_exclusions: HashMap<JointHandle, PairKey>,
    /// No-collision pairs the host registered directly.
    host_exclusions: HashSet<PairKey>,
    detection: CollisionDetection,
    integrator: Integrator,
    solver: ConstraintSolver,
    config: WorldConfig,
    time_accumulated: f32,
    metrics: SolverStepMetrics,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_STEP)
    }
}

impl PhysicsWorld {
    /// World with default settings. A non-positive `time_step` falls back to
    /// the default step.
    pub fn new(time_step: f32) -> Self {
        let time_step = if time_step > 0.0 && time_step.is_finite() {
            time_step
        } else {
            DEFAULT_TIME_STEP
        };
        Self::build(WorldConfig {
            time_step,
            ..WorldConfig::default()
        })
    }

    pub fn with_config(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        Self {
            bodies: Arena::new(),
            joints: Arena::new(),
            joint_exclusions: HashMap::new(),
            host_exclusions: HashSet::new(),
            detection: CollisionDetection::new(&config),
            integrator: Integrator::new(config.gravity),
            solver: ConstraintSolver::new(SolverSettings::from(&config)),
            config,
            time_accumulated: 0.0,
            metrics: SolverStepMetrics::default(),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn gravity(&self) -> Vec3 {
        self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
        self.integrator.gravity = gravity;
    }

    pub fn set_warm_starting(&mut self, enabled: bool) {
        self.config.warm_starting = enabled;
        self.solver.settings.warm_starting = enabled;
    }

    pub fn set_listener<L>(&mut self, listener: L)
    where
        L: CollisionEventListener + 'static,
    {
        self.detection.set_listener(Box::new(listener));
    }

    pub fn collision_detection(&self) -> &CollisionDetection {
        &self.detection
    }

    /// Metrics of the last fixed step.
    pub fn metrics(&self) -> &SolverStepMetrics {
        &self.metrics
    }

    pub fn add_body(&mut self, mut body: RigidBody) -> Result<BodyHandle> {
        body.shape().validate().map_err(PhysicsError::InvalidShape)?;
        if !body.has_custom_damping() {
            body.linear_damping = self.config.linear_damping;
            body.angular_damping = self.config.angular_damping;
        }
        let aabb = body.update_aabb();
        let handle = self.bodies.insert(body);
        self.detection.add_body(handle, aabb);
        log::debug!("added body {handle:?}");
        Ok(handle)
    }

    /// Removes a body together with every joint, pair and no-collision entry
    /// that references it.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<RigidBody> {
        if !self.bodies.contains(handle) {
            return Err(PhysicsError::UnknownBody(handle));
        }
        let attached: Vec<JointHandle> = self
            .joints
            .iter()
            .filter(|(_, joint)| joint.involves(handle))
            .map(|(joint_handle, _)| joint_handle)
            .collect();
        for joint in attached {
            self.remove_joint(joint)?;
        }
        self.host_exclusions.retain(|key| !key.involves(handle));
        self.detection.remove_body(handle);
        let body = self
            .bodies
            .remove(handle)
            .ok_or(PhysicsError::UnknownBody(handle))?;
        log::debug!("removed body {handle:?}");
        Ok(body)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    /// Mutable access to a body. Transform edits are picked up by the next step.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> + '_ {
        self.bodies.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn add_joint(
        &mut self,
        body1: BodyHandle,
        body2: BodyHandle,
        desc: JointDesc,
    ) -> Result<JointHandle> {
        if body1 == body2 {
            return Err(PhysicsError::SelfJoint(body1));
        }
        let first = self.bodies.get(body1).ok_or(PhysicsError::UnknownBody(body1))?;
        let second = self.bodies.get(body2).ok_or(PhysicsError::UnknownBody(body2))?;

        let joint = Joint::from_desc(
            &desc,
            (body1, first),
            (body2, second),
            self.config.joint_position_correction,
        );
        let handle = self.joints.insert(joint);
        if !desc.collide_connected {
            self.detection.add_no_collision_pair(body1, body2);
            self.joint_exclusions
                .insert(handle, PairKey::new(body1, body2));
        }
        log::debug!("added {:?} joint {handle:?} between {body1:?} and {body2:?}", desc.kind);
        Ok(handle)
    }

    pub fn remove_joint(&mut self, handle: JointHandle) -> Result<Joint> {
        let joint = self
            .joints
            .remove(handle)
            .ok_or(PhysicsError::UnknownJoint(handle))?;
        if let Some(key) = self.joint_exclusions.remove(&handle) {
            self.release_exclusion(key);
        }
        log::debug!("removed joint {handle:?}");
        Ok(joint)
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle)
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> + '_ {
        self.joints.iter()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Anchor error of a joint for the current body state.
    pub fn joint_error(&self, handle: JointHandle) -> Result<f32> {
        let joint = self
            .joints
            .get(handle)
            .ok_or(PhysicsError::UnknownJoint(handle))?;
        let (a, b) = joint.bodies();
        let body1 = self.bodies.get(a).ok_or(PhysicsError::UnknownBody(a))?;
        let body2 = self.bodies.get(b).ok_or(PhysicsError::UnknownBody(b))?;
        Ok(joint.position_error(body1, body2))
    }

    pub fn add_no_collision_pair(&mut self, a: BodyHandle, b: BodyHandle) -> Result<()> {
        self.ensure_body(a)?;
        self.ensure_body(b)?;
        self.detection.add_no_collision_pair(a, b);
        self.host_exclusions.insert(PairKey::new(a, b));
        Ok(())
    }

    /// Drops the host's exclusion of `(a, b)`. Joints between the two bodies
    /// that do not collide-connect keep the pair excluded.
    pub fn remove_no_collision_pair(&mut self, a: BodyHandle, b: BodyHandle) {
        let key = PairKey::new(a, b);
        self.host_exclusions.remove(&key);
        self.release_exclusion(key);
    }

    pub fn is_no_collision_pair(&self, a: BodyHandle, b: BodyHandle) -> bool {
        self.detection.is_no_collision_pair(a, b)
    }

    /// Removes the detection entry for `key` once neither the host nor a
    /// joint holds it.
    fn release_exclusion(&mut self, key: PairKey) {
        let held = self.host_exclusions.contains(&key)
            || self.joint_exclusions.values().any(|other| *other == key);
        if !held {
            let (a, b) = key.bodies();
            self.detection.remove_no_collision_pair(a, b);
        }
    }

    fn ensure_body(&self, handle: BodyHandle) -> Result<()> {
        if self.bodies.contains(handle) {
            Ok(())
        } else {
            Err(PhysicsError::UnknownBody(handle))
        }
    }

    /// Runs broad and narrow phase without advancing time and returns the
    /// manifolds that hold contacts.
    pub fn compute_collision_detection(&mut self) -> impl Iterator<Item = &ContactManifold> {
        self.refresh_aabbs();
        self.detection.compute_collision_detection(&self.bodies)
    }

    /// Manifolds produced by the last collision pass.
    pub fn manifolds(&self) -> impl Iterator<Item = &ContactManifold> {
        self.detection.manifolds()
    }

    pub fn contact_count(&self) -> usize {
        self.detection.manifolds().map(ContactManifold::len).sum()
    }

    /// Advances the simulation using a fixed timestep accumulator and returns
    /// the number of fixed steps taken.
    pub fn step(&mut self, dt: f32) -> u32 {
        if !(dt > 0.0 && dt.is_finite()) {
            return 0;
        }
        self.time_accumulated += dt;

        let mut steps = 0;
        while self.time_accumulated >= self.config.time_step {
            if steps == MAX_SUBSTEPS {
                log::debug!(
                    "dropping {:.4}s of simulation time after {MAX_SUBSTEPS} substeps",
                    self.time_accumulated
                );
                self.time_accumulated = 0.0;
                break;
            }
            self.time_accumulated -= self.config.time_step;
            self.step_once();
            steps += 1;
        }
        steps
    }

    /// One fixed step of `config.time_step` seconds.
    pub fn step_once(&mut self) {
        let _timer = ScopedTimer::new("world::step");
        let dt = self.config.time_step;

        self.refresh_aabbs();
        let bodies = &self.bodies;
        let mut contacts: Vec<ContactConstraint> = self
            .detection
            .compute_collision_detection(bodies)
            .filter_map(|manifold| {
                let body1 = bodies.get(manifold.body1)?;
                let body2 = bodies.get(manifold.body2)?;
                Some(ContactConstraint::new(
                    PairKey::new(manifold.body1, manifold.body2),
                    manifold,
                    body1.material.combine(&body2.material),
                ))
            })
            .collect();

        let mut step = SolverStepData::gather(&self.bodies, dt);
        {
            let _timer = ScopedTimer::new("integrate::velocities");
            self.integrator.integrate_velocities(&mut step);
        }

        let mut joints: Vec<&mut Joint> = self.joints.iter_mut().map(|(_, joint)| joint).collect();
        self.solver
            .solve_velocities(&mut step, &mut joints, &mut contacts);
        {
            let _timer = ScopedTimer::new("integrate::positions");
            self.integrator.integrate_positions(&mut step);
        }
        self.solver
            .solve_positions(&mut step, &mut joints, &mut contacts);

        for contact in &contacts {
            if let Some(manifold) = self.detection.manifold_mut(contact.pair) {
                contact.store_impulses(manifold);
            }
        }

        step.write_back(&mut self.bodies);
        for (handle, body) in self.bodies.iter() {
            self.detection.update_body(handle, body.aabb());
        }
        self.metrics = self.solver.metrics().clone();
    }

    fn refresh_aabbs(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.update_aabb();
        }
    }
}
