use glam::Vec3;

use crate::{
    collision::{contact::ContactManifold, pair::PairKey},
    config::PositionCorrection,
    core::{rigidbody::BodyHandle, types::Material},
    dynamics::solver::{Constraint, SolverBody, SolverSettings, SolverStepData},
    utils::math,
};

/// Solver data for one manifold point.
#[derive(Debug, Clone)]
struct ContactRow {
    local_point1: Vec3,
    local_point2: Vec3,
    world_point1: Vec3,
    world_point2: Vec3,
    normal: Vec3,
    depth: f32,
    r1: Vec3,
    r2: Vec3,
    tangents: [Vec3; 2],
    normal_mass: f32,
    tangent_mass: [f32; 2],
    /// Separating velocity the normal row drives toward.
    target_velocity: f32,
    normal_impulse: f32,
    /// World-space friction impulse carried over from the previous step.
    cached_friction: Vec3,
    tangent_impulse: [f32; 2],
}

impl ContactRow {
    fn effective_mass(b1: &SolverBody, b2: &SolverBody, r1: Vec3, r2: Vec3, axis: Vec3) -> f32 {
        let k = b1.axis_inverse_mass(r1, axis) + b2.axis_inverse_mass(r2, axis);
        if k > math::SINGULAR_EPSILON {
            1.0 / k
        } else {
            0.0
        }
    }

    fn relative_velocity(&self, b1: &SolverBody, b2: &SolverBody) -> Vec3 {
        b2.velocity_at(self.r2) - b1.velocity_at(self.r1)
    }
}

/// Non-penetration and Coulomb friction rows for every point of one manifold.
#[derive(Debug, Clone)]
pub struct ContactConstraint {
    pub pair: PairKey,
    pub body1: BodyHandle,
    pub body2: BodyHandle,
    pub friction: f32,
    pub restitution: f32,
    indices: Option<(usize, usize)>,
    rows: Vec<ContactRow>,
}

impl ContactConstraint {
    /// Captures the manifold's points and cached impulses. `material` is the
    /// combined surface of both bodies.
    pub fn new(pair: PairKey, manifold: &ContactManifold, material: Material) -> Self {
        let rows = manifold
            .points()
            .iter()
            .map(|point| ContactRow {
                local_point1: point.local_point1,
                local_point2: point.local_point2,
                world_point1: point.world_point1,
                world_point2: point.world_point2,
                normal: point.normal,
                depth: point.depth,
                r1: Vec3::ZERO,
                r2: Vec3::ZERO,
                tangents: [Vec3::ZERO; 2],
                normal_mass: 0.0,
                tangent_mass: [0.0; 2],
                target_velocity: 0.0,
                normal_impulse: point.normal_impulse,
                cached_friction: point.friction_impulse,
                tangent_impulse: [0.0; 2],
            })
            .collect();

        Self {
            pair,
            body1: manifold.body1,
            body2: manifold.body2,
            friction: material.friction.max(0.0),
            restitution: material.restitution,
            indices: None,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of accumulated normal impulses and of friction impulse magnitudes.
    pub fn impulse_sums(&self) -> (f32, f32) {
        self.rows.iter().fold((0.0, 0.0), |(normal, tangent), row| {
            let friction = row.tangents[0] * row.tangent_impulse[0]
                + row.tangents[1] * row.tangent_impulse[1];
            (normal + row.normal_impulse, tangent + friction.length())
        })
    }

    /// Copies accumulated impulses back into the manifold for warm starting
    /// the next step.
    pub fn store_impulses(&self, manifold: &mut ContactManifold) {
        for (point, row) in manifold.points_mut().iter_mut().zip(&self.rows) {
            point.normal_impulse = row.normal_impulse;
            point.friction_impulse = row.tangents[0] * row.tangent_impulse[0]
                + row.tangents[1] * row.tangent_impulse[1];
        }
    }
}

impl Constraint for ContactConstraint {
    fn init(&mut self, step: &SolverStepData, settings: &SolverSettings) {
        self.indices = match (step.index_of(self.body1), step.index_of(self.body2)) {
            (Some(a), Some(b)) if a != b => Some((a, b)),
            _ => {
                log::warn!("contact {:?} references a missing body", self.pair);
                None
            }
        };
        let Some((i1, i2)) = self.indices else {
            return;
        };
        let b1 = step.body(i1);
        let b2 = step.body(i2);
        let dt = step.dt;
        let restitution = self.restitution;

        for row in &mut self.rows {
            row.r1 = row.world_point1 - b1.position;
            row.r2 = row.world_point2 - b2.position;

            let (t1, t2) = row.normal.any_orthonormal_pair();
            row.tangents = [t1, t2];
            row.normal_mass = ContactRow::effective_mass(b1, b2, row.r1, row.r2, row.normal);
            row.tangent_mass = [
                ContactRow::effective_mass(b1, b2, row.r1, row.r2, t1),
                ContactRow::effective_mass(b1, b2, row.r1, row.r2, t2),
            ];

            let mut target = 0.0;
            if row.depth < 0.0 {
                // Speculative: the gap may close this step but no further.
                target = row.depth / dt;
            } else if settings.contact_position_correction == PositionCorrection::Baumgarte
                && row.depth > settings.contact_slop
            {
                target = settings.baumgarte_factor / dt * (row.depth - settings.contact_slop);
            }
            let approach = row.normal.dot(row.relative_velocity(b1, b2));
            if approach < -settings.restitution_velocity_threshold {
                target = target.max(-restitution * approach);
            }
            row.target_velocity = target;

            if settings.warm_starting {
                row.tangent_impulse = [row.cached_friction.dot(t1), row.cached_friction.dot(t2)];
            } else {
                row.normal_impulse = 0.0;
                row.tangent_impulse = [0.0; 2];
            }
        }
    }

    fn warm_start(&mut self, step: &mut SolverStepData) {
        let Some((i1, i2)) = self.indices else {
            return;
        };
        let (b1, b2) = step.pair_mut(i1, i2);
        for row in &self.rows {
            let impulse = row.normal * row.normal_impulse
                + row.tangents[0] * row.tangent_impulse[0]
                + row.tangents[1] * row.tangent_impulse[1];
            b1.apply_impulse(-impulse, row.r1);
            b2.apply_impulse(impulse, row.r2);
        }
    }

    fn solve_velocity(&mut self, step: &mut SolverStepData) -> f32 {
        let Some((i1, i2)) = self.indices else {
            return 0.0;
        };
        let (b1, b2) = step.pair_mut(i1, i2);
        let mut largest: f32 = 0.0;

        for row in &mut self.rows {
            // Friction first, bounded by the current normal impulse.
            let limit = self.friction * row.normal_impulse;
            for axis in 0..2 {
                let tangent = row.tangents[axis];
                let vt = tangent.dot(row.relative_velocity(b1, b2));
                let previous = row.tangent_impulse[axis];
                let accumulated = (previous - row.tangent_mass[axis] * vt).clamp(-limit, limit);
                let delta = accumulated - previous;
                row.tangent_impulse[axis] = accumulated;
                b1.apply_impulse(-tangent * delta, row.r1);
                b2.apply_impulse(tangent * delta, row.r2);
                largest = largest.max(delta.abs());
            }

            let vn = row.normal.dot(row.relative_velocity(b1, b2));
            let previous = row.normal_impulse;
            let accumulated = (previous - row.normal_mass * (vn - row.target_velocity)).max(0.0);
            let delta = accumulated - previous;
            row.normal_impulse = accumulated;
            b1.apply_impulse(-row.normal * delta, row.r1);
            b2.apply_impulse(row.normal * delta, row.r2);
            largest = largest.max(delta.abs());
        }
        largest
    }

    fn solve_position(&mut self, step: &mut SolverStepData, settings: &SolverSettings) -> f32 {
        if settings.contact_position_correction != PositionCorrection::NonLinearGaussSeidel {
            return 0.0;
        }
        let Some((i1, i2)) = self.indices else {
            return 0.0;
        };
        let (b1, b2) = step.pair_mut(i1, i2);
        let mut largest: f32 = 0.0;

        for row in &self.rows {
            let p1 = b1.position + b1.orientation * row.local_point1;
            let p2 = b2.position + b2.orientation * row.local_point2;
            let depth = (p1 - p2).dot(row.normal);
            let error = (depth - settings.contact_slop).max(0.0);
            largest = largest.max(error);

            let correction = (settings.baumgarte_factor * error).min(settings.max_position_correction);
            if correction <= 0.0 {
                continue;
            }
            let r1 = p1 - b1.position;
            let r2 = p2 - b2.position;
            let mass = ContactRow::effective_mass(b1, b2, r1, r2, row.normal);
            if mass == 0.0 {
                continue;
            }
            let impulse = row.normal * (correction * mass);
            b1.apply_position_impulse(-impulse, r1);
            b2.apply_position_impulse(impulse, r2);
        }
        largest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collision::contact::ContactPointInfo,
        core::{rigidbody::RigidBody, shape::CollisionShape},
        utils::allocator::Arena,
    };
    use approx::assert_abs_diff_eq;

    /// Unit box resting on a fixed ground with a single contact point under it.
    fn resting_pair(
        depth: f32,
        velocity: Vec3,
    ) -> (Arena<RigidBody>, BodyHandle, BodyHandle, ContactManifold) {
        let mut bodies = Arena::new();
        let ground = bodies.insert(
            RigidBody::builder(CollisionShape::cuboid(Vec3::new(5.0, 0.5, 5.0)))
                .position(Vec3::new(0.0, -0.5, 0.0))
                .fixed()
                .build(),
        );
        let ball = bodies.insert(
            RigidBody::builder(CollisionShape::sphere(0.5))
                .position(Vec3::new(0.0, 0.5 - depth, 0.0))
                .linear_velocity(velocity)
                .gravity_enabled(false)
                .build(),
        );
        let t1 = bodies.get(ground).unwrap().transform;
        let t2 = bodies.get(ball).unwrap().transform;
        let mut manifold = ContactManifold::new(ground, ball);
        let info = ContactPointInfo {
            normal: Vec3::Y,
            depth,
            local_point1: t1.inverse_transform_point(Vec3::ZERO),
            local_point2: t2.inverse_transform_point(Vec3::new(0.0, -depth, 0.0)),
        };
        manifold.add_point(&info, &t1, &t2, 0.03);
        (bodies, ground, ball, manifold)
    }

    fn solve(
        bodies: &Arena<RigidBody>,
        manifold: &ContactManifold,
        material: Material,
        settings: &SolverSettings,
    ) -> (SolverStepData, ContactConstraint) {
        let pair = PairKey::new(manifold.body1, manifold.body2);
        let mut constraint = ContactConstraint::new(pair, manifold, material);
        let mut step = SolverStepData::gather(bodies, 1.0 / 60.0);
        constraint.init(&step, settings);
        constraint.warm_start(&mut step);
        for _ in 0..settings.velocity_iterations {
            constraint.solve_velocity(&mut step);
        }
        (step, constraint)
    }

    #[test]
    fn normal_row_stops_approach() {
        let (bodies, _, ball, manifold) = resting_pair(0.0, Vec3::new(0.0, -0.5, 0.0));
        let (step, constraint) =
            solve(&bodies, &manifold, Material::default(), &SolverSettings::default());
        let v = step.body(step.index_of(ball).unwrap()).linear_velocity;
        assert_abs_diff_eq!(v.y, 0.0, epsilon = 1e-4);
        assert!(constraint.impulse_sums().0 > 0.0);
    }

    #[test]
    fn friction_is_bounded_by_coulomb_cone() {
        let (bodies, _, ball, manifold) = resting_pair(0.0, Vec3::new(5.0, -0.5, 0.0));
        let material = Material {
            friction: 0.2,
            restitution: 0.0,
        };
        let (step, constraint) = solve(&bodies, &manifold, material, &SolverSettings::default());
        let (normal, tangent) = constraint.impulse_sums();
        assert!(tangent <= 0.2 * normal + 1e-5);
        let v = step.body(step.index_of(ball).unwrap()).linear_velocity;
        assert!(v.x > 0.0 && v.x < 5.0);
    }

    #[test]
    fn restitution_reverses_fast_impacts() {
        let (bodies, _, ball, manifold) = resting_pair(0.0, Vec3::new(0.0, -4.0, 0.0));
        let material = Material {
            friction: 0.0,
            restitution: 0.5,
        };
        let (step, _) = solve(&bodies, &manifold, material, &SolverSettings::default());
        let v = step.body(step.index_of(ball).unwrap()).linear_velocity;
        assert_abs_diff_eq!(v.y, 2.0, epsilon = 1e-3);
    }

    #[test]
    fn position_pass_reduces_penetration() {
        let (bodies, _, ball, manifold) = resting_pair(0.1, Vec3::ZERO);
        let settings = SolverSettings {
            contact_position_correction: PositionCorrection::NonLinearGaussSeidel,
            ..SolverSettings::default()
        };
        let (mut step, mut constraint) = solve(&bodies, &manifold, Material::default(), &settings);
        let before = constraint.solve_position(&mut step, &settings);
        let after = constraint.solve_position(&mut step, &settings);
        assert!(after < before);
        let y = step.body(step.index_of(ball).unwrap()).position.y;
        assert!(y > 0.4);
    }

    #[test]
    fn impulses_round_trip_through_manifold() {
        let (bodies, _, _, mut manifold) = resting_pair(0.0, Vec3::new(1.0, -1.0, 0.0));
        let (_, constraint) = solve(&bodies, &manifold, Material::default(), &SolverSettings::default());
        constraint.store_impulses(&mut manifold);
        let point = manifold.points()[0];
        assert_abs_diff_eq!(point.normal_impulse, constraint.impulse_sums().0, epsilon = 1e-6);
        assert!(point.friction_impulse.x < 0.0);
        assert_abs_diff_eq!(point.friction_impulse.y, 0.0, epsilon = 1e-6);
    }
}
