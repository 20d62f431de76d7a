use glam::Vec3;

use crate::core::{rigidbody::BodyHandle, types::Transform};

/// Largest number of points a manifold keeps.
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// Raw narrow-phase output for one contact.
///
/// `normal` points from body 1 toward body 2 in world space. `depth` is
/// positive when the shapes interpenetrate and negative for a speculative
/// contact inside the hysteresis margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPointInfo {
    pub normal: Vec3,
    pub depth: f32,
    /// Point on shape 1, in body 1's local frame.
    pub local_point1: Vec3,
    /// Point on shape 2, in body 2's local frame.
    pub local_point2: Vec3,
}

/// Contact point cached across steps together with its accumulated impulses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub local_point1: Vec3,
    pub local_point2: Vec3,
    pub world_point1: Vec3,
    pub world_point2: Vec3,
    pub normal: Vec3,
    pub depth: f32,
    pub normal_impulse: f32,
    /// Accumulated friction impulse in world space, re-projected onto the
    /// tangent basis each step.
    pub friction_impulse: Vec3,
    /// Steps this point has survived.
    pub age: u32,
}

impl ContactPoint {
    fn from_info(info: &ContactPointInfo, transform1: &Transform, transform2: &Transform) -> Self {
        Self {
            local_point1: info.local_point1,
            local_point2: info.local_point2,
            world_point1: transform1.transform_point(info.local_point1),
            world_point2: transform2.transform_point(info.local_point2),
            normal: info.normal,
            depth: info.depth,
            normal_impulse: 0.0,
            friction_impulse: Vec3::ZERO,
            age: 0,
        }
    }

    /// Midpoint of the two witness points.
    pub fn position(&self) -> Vec3 {
        (self.world_point1 + self.world_point2) * 0.5
    }
}

/// Persistent set of contact points between two bodies.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    pub body1: BodyHandle,
    pub body2: BodyHandle,
    points: Vec<ContactPoint>,
}

impl ContactManifold {
    pub fn new(body1: BodyHandle, body2: BodyHandle) -> Self {
        Self {
            body1,
            body2,
            points: Vec::with_capacity(MAX_MANIFOLD_POINTS),
        }
    }

    pub fn points(&self) -> &[ContactPoint] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [ContactPoint] {
        &mut self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Normal of the deepest point, or zero for an empty manifold.
    pub fn normal(&self) -> Vec3 {
        self.deepest().map(|p| p.normal).unwrap_or(Vec3::ZERO)
    }

    pub fn max_depth(&self) -> f32 {
        self.deepest().map(|p| p.depth).unwrap_or(0.0)
    }

    fn deepest(&self) -> Option<&ContactPoint> {
        self.points.iter().max_by(|a, b| a.depth.total_cmp(&b.depth))
    }

    /// Re-projects cached points with the current transforms and drops those
    /// that separated or slid further than `threshold`.
    pub fn refresh(&mut self, transform1: &Transform, transform2: &Transform, threshold: f32) {
        let threshold_sq = threshold * threshold;
        self.points.retain_mut(|point| {
            point.world_point1 = transform1.transform_point(point.local_point1);
            point.world_point2 = transform2.transform_point(point.local_point2);
            let offset = point.world_point1 - point.world_point2;
            point.depth = offset.dot(point.normal);
            if point.depth < -threshold {
                return false;
            }
            let tangential = offset - point.normal * point.depth;
            point.age = point.age.saturating_add(1);
            tangential.length_squared() <= threshold_sq
        });
    }

    /// Adds a fresh narrow-phase point. A point close to a cached one takes its
    /// place but inherits the accumulated impulses.
    pub fn add_point(
        &mut self,
        info: &ContactPointInfo,
        transform1: &Transform,
        transform2: &Transform,
        threshold: f32,
    ) {
        let mut point = ContactPoint::from_info(info, transform1, transform2);
        let threshold_sq = threshold * threshold;

        if let Some(existing) = self
            .points
            .iter_mut()
            .find(|p| p.world_point1.distance_squared(point.world_point1) <= threshold_sq)
        {
            point.normal_impulse = existing.normal_impulse;
            point.friction_impulse = existing.friction_impulse;
            point.age = existing.age;
            *existing = point;
            return;
        }

        self.points.push(point);
        if self.points.len() > MAX_MANIFOLD_POINTS {
            let drop = self.point_to_drop();
            self.points.swap_remove(drop);
        }
    }

    /// Index of the point whose removal leaves the largest contact area. The
    /// deepest point is never chosen.
    fn point_to_drop(&self) -> usize {
        let deepest = self
            .points
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.depth.total_cmp(&b.depth))
            .map(|(i, _)| i)
            .unwrap_or(0);

        let mut best = if deepest == 0 { 1 } else { 0 };
        let mut best_area = f32::NEG_INFINITY;
        for candidate in 0..self.points.len() {
            if candidate == deepest {
                continue;
            }
            let remaining: Vec<Vec3> = self
                .points
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != candidate)
                .map(|(_, p)| p.world_point1)
                .collect();
            let area = quad_area(&remaining);
            if area > best_area {
                best_area = area;
                best = candidate;
            }
        }
        best
    }
}

/// Area estimate of four points regardless of their ordering: the largest
/// diagonal cross product among the three possible pairings.
fn quad_area(points: &[Vec3]) -> f32 {
    let [p0, p1, p2, p3] = match points {
        [a, b, c, d] => [*a, *b, *c, *d],
        _ => return 0.0,
    };
    let a = (p0 - p1).cross(p2 - p3).length_squared();
    let b = (p0 - p2).cross(p1 - p3).length_squared();
    let c = (p0 - p3).cross(p1 - p2).length_squared();
    a.max(b).max(c)
}
