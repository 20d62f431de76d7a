use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use crate::{
    config::PositionCorrection,
    core::rigidbody::{BodyHandle, RigidBody},
    dynamics::solver::{Constraint, SolverSettings, SolverStepData},
    utils::{allocator::Handle, math},
};

/// Handle of a joint stored in the world's arena.
pub type JointHandle = Handle<Joint>;

/// Distance under which a distance joint's direction is undefined.
const MIN_AXIS_LENGTH: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointKind {
    BallAndSocket,
    Distance,
}

/// Where the anchors of a [`JointDesc`] are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JointAnchors {
    /// World-space points, converted with the bodies' transforms at creation.
    World { anchor1: Vec3, anchor2: Vec3 },
    /// Points already in each body's local frame.
    Local { anchor1: Vec3, anchor2: Vec3 },
}

/// Description used by the world to create a joint between two bodies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointDesc {
    pub kind: JointKind,
    pub anchors: JointAnchors,
    /// When `false`, the two bodies are registered as a no-collision pair.
    pub collide_connected: bool,
    /// Overrides the world's default correction technique.
    pub position_correction: Option<PositionCorrection>,
}

impl JointDesc {
    /// Ball-and-socket joint pinning both bodies at `anchor` (world space).
    pub fn ball_and_socket(anchor: Vec3) -> Self {
        Self {
            kind: JointKind::BallAndSocket,
            anchors: JointAnchors::World {
                anchor1: anchor,
                anchor2: anchor,
            },
            collide_connected: false,
            position_correction: None,
        }
    }

    /// Rigid rod between two world-space anchors; its length is the current distance.
    pub fn distance(anchor1: Vec3, anchor2: Vec3) -> Self {
        Self {
            kind: JointKind::Distance,
            anchors: JointAnchors::World { anchor1, anchor2 },
            collide_connected: false,
            position_correction: None,
        }
    }

    pub fn with_local_anchors(mut self, anchor1: Vec3, anchor2: Vec3) -> Self {
        self.anchors = JointAnchors::Local { anchor1, anchor2 };
        self
    }

    pub fn collide_connected(mut self, enabled: bool) -> Self {
        self.collide_connected = enabled;
        self
    }

    pub fn position_correction(mut self, technique: PositionCorrection) -> Self {
        self.position_correction = Some(technique);
        self
    }
}

/// Body indices into the step data, resolved during init.
#[derive(Debug, Clone, Copy, Default)]
struct BodyIndices {
    first: usize,
    second: usize,
}

fn resolve(step: &SolverStepData, body1: BodyHandle, body2: BodyHandle) -> Option<BodyIndices> {
    match (step.index_of(body1), step.index_of(body2)) {
        (Some(first), Some(second)) if first != second => Some(BodyIndices { first, second }),
        _ => {
            log::warn!("joint references missing body {body1:?} or {body2:?}");
            None
        }
    }
}

/// Point-to-point joint: keeps one anchor on each body at the same world position.
#[derive(Debug, Clone)]
pub struct BallAndSocketJoint {
    pub body1: BodyHandle,
    pub body2: BodyHandle,
    pub local_anchor1: Vec3,
    pub local_anchor2: Vec3,
    pub position_correction: PositionCorrection,
    indices: Option<BodyIndices>,
    r1: Vec3,
    r2: Vec3,
    inverse_mass_matrix: Mat3,
    bias: Vec3,
    impulse: Vec3,
}

impl BallAndSocketJoint {
    pub fn new(
        body1: BodyHandle,
        body2: BodyHandle,
        local_anchor1: Vec3,
        local_anchor2: Vec3,
        position_correction: PositionCorrection,
    ) -> Self {
        Self {
            body1,
            body2,
            local_anchor1,
            local_anchor2,
            position_correction,
            indices: None,
            r1: Vec3::ZERO,
            r2: Vec3::ZERO,
            inverse_mass_matrix: Mat3::ZERO,
            bias: Vec3::ZERO,
            impulse: Vec3::ZERO,
        }
    }

    /// Accumulated impulse of the last step.
    pub fn impulse(&self) -> Vec3 {
        self.impulse
    }
}

impl Constraint for BallAndSocketJoint {
    fn init(&mut self, step: &SolverStepData, settings: &SolverSettings) {
        self.indices = resolve(step, self.body1, self.body2);
        let Some(indices) = self.indices else {
            return;
        };
        let b1 = step.body(indices.first);
        let b2 = step.body(indices.second);

        self.r1 = b1.orientation * self.local_anchor1;
        self.r2 = b2.orientation * self.local_anchor2;

        // K = sum over movable bodies of (1/m) I + skew(r) I⁻¹ skew(r)ᵀ
        let k = b1.point_mass_matrix(self.r1) + b2.point_mass_matrix(self.r2);
        self.inverse_mass_matrix = math::inverse_or_zero(k);

        self.bias = if self.position_correction == PositionCorrection::Baumgarte {
            let error = (b2.position + self.r2) - (b1.position + self.r1);
            error * (settings.baumgarte_factor / step.dt)
        } else {
            Vec3::ZERO
        };

        if !settings.warm_starting {
            self.impulse = Vec3::ZERO;
        }
    }

    fn warm_start(&mut self, step: &mut SolverStepData) {
        let Some(indices) = self.indices else {
            return;
        };
        let (b1, b2) = step.pair_mut(indices.first, indices.second);
        b1.apply_impulse(-self.impulse, self.r1);
        b2.apply_impulse(self.impulse, self.r2);
    }

    fn solve_velocity(&mut self, step: &mut SolverStepData) -> f32 {
        let Some(indices) = self.indices else {
            return 0.0;
        };
        let (b1, b2) = step.pair_mut(indices.first, indices.second);

        let jv = b2.velocity_at(self.r2) - b1.velocity_at(self.r1);
        let delta = self.inverse_mass_matrix * (-jv - self.bias);
        self.impulse += delta;

        b1.apply_impulse(-delta, self.r1);
        b2.apply_impulse(delta, self.r2);
        delta.length()
    }

    fn solve_position(&mut self, step: &mut SolverStepData, _settings: &SolverSettings) -> f32 {
        if self.position_correction != PositionCorrection::NonLinearGaussSeidel {
            return 0.0;
        }
        let Some(indices) = self.indices else {
            return 0.0;
        };
        let (b1, b2) = step.pair_mut(indices.first, indices.second);

        let r1 = b1.orientation * self.local_anchor1;
        let r2 = b2.orientation * self.local_anchor2;
        let k = b1.point_mass_matrix(r1) + b2.point_mass_matrix(r2);
        let inverse = math::inverse_or_zero(k);

        let error = (b2.position + r2) - (b1.position + r1);
        let lambda = inverse * -error;

        b1.apply_position_impulse(-lambda, r1);
        b2.apply_position_impulse(lambda, r2);
        error.length()
    }
}

/// Keeps the distance between two anchors at a fixed length.
#[derive(Debug, Clone)]
pub struct DistanceJoint {
    pub body1: BodyHandle,
    pub body2: BodyHandle,
    pub local_anchor1: Vec3,
    pub local_anchor2: Vec3,
    pub length: f32,
    pub position_correction: PositionCorrection,
    indices: Option<BodyIndices>,
    r1: Vec3,
    r2: Vec3,
    axis: Vec3,
    effective_mass: f32,
    bias: f32,
    impulse: f32,
}

impl DistanceJoint {
    pub fn new(
        body1: BodyHandle,
        body2: BodyHandle,
        local_anchor1: Vec3,
        local_anchor2: Vec3,
        length: f32,
        position_correction: PositionCorrection,
    ) -> Self {
        Self {
            body1,
            body2,
            local_anchor1,
            local_anchor2,
            length: length.max(0.0),
            position_correction,
            indices: None,
            r1: Vec3::ZERO,
            r2: Vec3::ZERO,
            axis: Vec3::ZERO,
            effective_mass: 0.0,
            bias: 0.0,
            impulse: 0.0,
        }
    }

    pub fn impulse(&self) -> f32 {
        self.impulse
    }
}

impl Constraint for DistanceJoint {
    fn init(&mut self, step: &SolverStepData, settings: &SolverSettings) {
        self.indices = resolve(step, self.body1, self.body2);
        let Some(indices) = self.indices else {
            return;
        };
        let b1 = step.body(indices.first);
        let b2 = step.body(indices.second);

        self.r1 = b1.orientation * self.local_anchor1;
        self.r2 = b2.orientation * self.local_anchor2;
        let delta = (b2.position + self.r2) - (b1.position + self.r1);
        let current = delta.length();

        if current > MIN_AXIS_LENGTH {
            self.axis = delta / current;
            let k = b1.axis_inverse_mass(self.r1, self.axis)
                + b2.axis_inverse_mass(self.r2, self.axis);
            self.effective_mass = if k > math::SINGULAR_EPSILON { 1.0 / k } else { 0.0 };
        } else {
            self.axis = Vec3::ZERO;
            self.effective_mass = 0.0;
        }

        self.bias = if self.position_correction == PositionCorrection::Baumgarte {
            (current - self.length) * settings.baumgarte_factor / step.dt
        } else {
            0.0
        };

        if !settings.warm_starting {
            self.impulse = 0.0;
        }
    }

    fn warm_start(&mut self, step: &mut SolverStepData) {
        let Some(indices) = self.indices else {
            return;
        };
        let impulse = self.axis * self.impulse;
        let (b1, b2) = step.pair_mut(indices.first, indices.second);
        b1.apply_impulse(-impulse, self.r1);
        b2.apply_impulse(impulse, self.r2);
    }

    fn solve_velocity(&mut self, step: &mut SolverStepData) -> f32 {
        let Some(indices) = self.indices else {
            return 0.0;
        };
        let (b1, b2) = step.pair_mut(indices.first, indices.second);

        let jv = self.axis.dot(b2.velocity_at(self.r2) - b1.velocity_at(self.r1));
        let delta = -self.effective_mass * (jv + self.bias);
        self.impulse += delta;

        let impulse = self.axis * delta;
        b1.apply_impulse(-impulse, self.r1);
        b2.apply_impulse(impulse, self.r2);
        delta.abs()
    }

    fn solve_position(&mut self, step: &mut SolverStepData, _settings: &SolverSettings) -> f32 {
        if self.position_correction != PositionCorrection::NonLinearGaussSeidel {
            return 0.0;
        }
        let Some(indices) = self.indices else {
            return 0.0;
        };
        let (b1, b2) = step.pair_mut(indices.first, indices.second);

        let r1 = b1.orientation * self.local_anchor1;
        let r2 = b2.orientation * self.local_anchor2;
        let delta = (b2.position + r2) - (b1.position + r1);
        let current = delta.length();
        if current <= MIN_AXIS_LENGTH {
            return 0.0;
        }
        let axis = delta / current;
        let error = current - self.length;
        let k = b1.axis_inverse_mass(r1, axis) + b2.axis_inverse_mass(r2, axis);
        if k <= math::SINGULAR_EPSILON {
            return error.abs();
        }

        let impulse = axis * (-error / k);
        b1.apply_position_impulse(-impulse, r1);
        b2.apply_position_impulse(impulse, r2);
        error.abs()
    }
}

/// A joint between two bodies.
#[derive(Debug, Clone)]
pub enum Joint {
    BallAndSocket(BallAndSocketJoint),
    Distance(DistanceJoint),
}

impl Joint {
    /// Builds a joint from `desc`, converting world anchors with the current
    /// body transforms.
    pub fn from_desc(
        desc: &JointDesc,
        (handle1, body1): (BodyHandle, &RigidBody),
        (handle2, body2): (BodyHandle, &RigidBody),
        default_correction: PositionCorrection,
    ) -> Self {
        let (local1, local2) = match desc.anchors {
            JointAnchors::World { anchor1, anchor2 } => (
                body1.transform.inverse_transform_point(anchor1),
                body2.transform.inverse_transform_point(anchor2),
            ),
            JointAnchors::Local { anchor1, anchor2 } => (anchor1, anchor2),
        };
        let correction = desc.position_correction.unwrap_or(default_correction);

        match desc.kind {
            JointKind::BallAndSocket => Joint::BallAndSocket(BallAndSocketJoint::new(
                handle1, handle2, local1, local2, correction,
            )),
            JointKind::Distance => {
                let length = body1
                    .transform
                    .transform_point(local1)
                    .distance(body2.transform.transform_point(local2));
                Joint::Distance(DistanceJoint::new(
                    handle1, handle2, local1, local2, length, correction,
                ))
            }
        }
    }

    pub fn kind(&self) -> JointKind {
        match self {
            Joint::BallAndSocket(_) => JointKind::BallAndSocket,
            Joint::Distance(_) => JointKind::Distance,
        }
    }

    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        match self {
            Joint::BallAndSocket(j) => (j.body1, j.body2),
            Joint::Distance(j) => (j.body1, j.body2),
        }
    }

    pub fn involves(&self, body: BodyHandle) -> bool {
        let (a, b) = self.bodies();
        a == body || b == body
    }

    pub fn local_anchors(&self) -> (Vec3, Vec3) {
        match self {
            Joint::BallAndSocket(j) => (j.local_anchor1, j.local_anchor2),
            Joint::Distance(j) => (j.local_anchor1, j.local_anchor2),
        }
    }

    /// Magnitude of the impulse accumulated during the last step.
    pub fn impulse_magnitude(&self) -> f32 {
        match self {
            Joint::BallAndSocket(j) => j.impulse.length(),
            Joint::Distance(j) => j.impulse.abs(),
        }
    }

    /// Current constraint violation given the two bodies' state: anchor
    /// separation for a ball joint, length error for a distance joint.
    pub fn position_error(&self, body1: &RigidBody, body2: &RigidBody) -> f32 {
        let (local1, local2) = self.local_anchors();
        let p1 = body1.transform.transform_point(local1);
        let p2 = body2.transform.transform_point(local2);
        match self {
            Joint::BallAndSocket(_) => p1.distance(p2),
            Joint::Distance(j) => (p1.distance(p2) - j.length).abs(),
        }
    }
}

impl Constraint for Joint {
    fn init(&mut self, step: &SolverStepData, settings: &SolverSettings) {
        match self {
            Joint::BallAndSocket(j) => j.init(step, settings),
            Joint::Distance(j) => j.init(step, settings),
        }
    }

    fn warm_start(&mut self, step: &mut SolverStepData) {
        match self {
            Joint::BallAndSocket(j) => j.warm_start(step),
            Joint::Distance(j) => j.warm_start(step),
        }
    }

    fn solve_velocity(&mut self, step: &mut SolverStepData) -> f32 {
        match self {
            Joint::BallAndSocket(j) => j.solve_velocity(step),
            Joint::Distance(j) => j.solve_velocity(step),
        }
    }

    fn solve_position(&mut self, step: &mut SolverStepData, settings: &SolverSettings) -> f32 {
        match self {
            Joint::BallAndSocket(j) => j.solve_position(step, settings),
            Joint::Distance(j) => j.solve_position(step, settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::shape::CollisionShape, utils::allocator::Arena};
    use approx::assert_abs_diff_eq;

    fn two_bodies(fixed: bool) -> (Arena<RigidBody>, BodyHandle, BodyHandle) {
        let mut bodies = Arena::new();
        let mut builder = RigidBody::builder(CollisionShape::sphere(0.5)).gravity_enabled(false);
        if fixed {
            builder = builder.fixed();
        }
        let a = bodies.insert(builder.build());
        let mut builder = RigidBody::builder(CollisionShape::sphere(0.5))
            .position(Vec3::new(1.0, 0.0, 0.0))
            .gravity_enabled(false);
        if fixed {
            builder = builder.fixed();
        }
        let b = bodies.insert(builder.build());
        (bodies, a, b)
    }

    #[test]
    fn immovable_bodies_disable_the_joint() {
        let (bodies, a, b) = two_bodies(true);
        let mut joint = BallAndSocketJoint::new(
            a,
            b,
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::new(-0.5, 0.1, 0.0),
            PositionCorrection::Baumgarte,
        );
        let mut step = SolverStepData::gather(&bodies, 1.0 / 60.0);
        let settings = SolverSettings::default();
        joint.init(&step, &settings);
        assert_eq!(joint.inverse_mass_matrix, Mat3::ZERO);
        joint.warm_start(&mut step);
        let delta = joint.solve_velocity(&mut step);
        assert_eq!(delta, 0.0);
        for body in &step.bodies {
            assert_eq!(body.linear_velocity, Vec3::ZERO);
            assert!(body.position.is_finite());
        }
    }

    #[test]
    fn velocity_solve_removes_relative_anchor_velocity() {
        let (mut bodies, a, b) = two_bodies(false);
        bodies.get_mut(b).unwrap().velocity.linear = Vec3::new(0.0, 2.0, 0.0);
        let mut joint = BallAndSocketJoint::new(
            a,
            b,
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::new(-0.5, 0.0, 0.0),
            PositionCorrection::NonLinearGaussSeidel,
        );
        let mut step = SolverStepData::gather(&bodies, 1.0 / 60.0);
        joint.init(&step, &SolverSettings::default());
        joint.solve_velocity(&mut step);

        let (i1, i2) = (step.index_of(a).unwrap(), step.index_of(b).unwrap());
        let v1 = step.body(i1).velocity_at(joint.r1);
        let v2 = step.body(i2).velocity_at(joint.r2);
        assert_abs_diff_eq!((v2 - v1).length(), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn distance_joint_position_pass_restores_length() {
        let (bodies, a, b) = two_bodies(false);
        let mut joint = DistanceJoint::new(
            a,
            b,
            Vec3::ZERO,
            Vec3::ZERO,
            0.8,
            PositionCorrection::NonLinearGaussSeidel,
        );
        let mut step = SolverStepData::gather(&bodies, 1.0 / 60.0);
        let settings = SolverSettings::default();
        joint.init(&step, &settings);
        let before = joint.solve_position(&mut step, &settings);
        let after = joint.solve_position(&mut step, &settings);
        assert_abs_diff_eq!(before, 0.2, epsilon = 1e-5);
        assert!(after < 1e-4);
    }

    #[test]
    fn desc_converts_world_anchor_to_local() {
        let (bodies, a, b) = two_bodies(false);
        let desc = JointDesc::ball_and_socket(Vec3::new(0.5, 0.0, 0.0));
        let joint = Joint::from_desc(
            &desc,
            (a, bodies.get(a).unwrap()),
            (b, bodies.get(b).unwrap()),
            PositionCorrection::Baumgarte,
        );
        assert_eq!(joint.local_anchors(), (Vec3::new(0.5, 0.0, 0.0), Vec3::new(-0.5, 0.0, 0.0)));
        assert_abs_diff_eq!(
            joint.position_error(bodies.get(a).unwrap(), bodies.get(b).unwrap()),
            0.0,
            epsilon = 1e-6
        );
    }
}
