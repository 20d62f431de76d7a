use glam::Vec3;

use crate::{
    collision::{
        contact::ContactPointInfo,
        gjk::{gjk_epa_with_limit, GjkResult, GJK_MAX_ITERATIONS},
    },
    core::{
        mesh::Triangle,
        shape::{CollisionShape, ShapeType, SupportMap},
        types::Transform,
    },
};

/// Algorithm chosen for an ordered pair of shape types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrowPhaseAlgorithm {
    /// Closed-form center distance test.
    SphereVsSphere,
    /// GJK distance with EPA penetration.
    ConvexVsConvex,
    /// GJK/EPA against each triangle of the first (concave) shape.
    ConcaveVsConvex,
    /// Same as [`NarrowPhaseAlgorithm::ConcaveVsConvex`] with the concave shape second.
    ConvexVsConcave,
    /// Concave against concave never produces contacts.
    Unsupported,
}

impl NarrowPhaseAlgorithm {
    pub fn select(first: ShapeType, second: ShapeType) -> Self {
        match (first, second) {
            (ShapeType::Sphere, ShapeType::Sphere) => Self::SphereVsSphere,
            (a, b) if a.is_convex() && b.is_convex() => Self::ConvexVsConvex,
            (a, b) if b.is_convex() && !a.is_convex() => Self::ConcaveVsConvex,
            (a, b) if a.is_convex() && !b.is_convex() => Self::ConvexVsConcave,
            _ => Self::Unsupported,
        }
    }
}

/// Narrow phase dispatcher.
pub struct NarrowPhase;

impl NarrowPhase {
    /// Appends the contacts between `shape1` and `shape2` to `out` and returns
    /// whether any were found. Pairs separated by no more than `margin` still
    /// report a contact with negative depth.
    pub fn collide(
        shape1: &CollisionShape,
        transform1: &Transform,
        shape2: &CollisionShape,
        transform2: &Transform,
        margin: f32,
        out: &mut Vec<ContactPointInfo>,
    ) -> bool {
        let before = out.len();
        match NarrowPhaseAlgorithm::select(shape1.shape_type(), shape2.shape_type()) {
            NarrowPhaseAlgorithm::SphereVsSphere => {
                if let (
                    CollisionShape::Sphere { radius: r1 },
                    CollisionShape::Sphere { radius: r2 },
                ) = (shape1, shape2)
                {
                    out.extend(sphere_vs_sphere(*r1, transform1, *r2, transform2, margin));
                }
            }
            NarrowPhaseAlgorithm::ConvexVsConvex => {
                out.extend(convex_vs_convex(
                    shape1, transform1, shape2, transform2, margin,
                ));
            }
            NarrowPhaseAlgorithm::ConcaveVsConvex => {
                concave_vs_convex(shape1, transform1, shape2, transform2, margin, false, out);
            }
            NarrowPhaseAlgorithm::ConvexVsConcave => {
                concave_vs_convex(shape2, transform2, shape1, transform1, margin, true, out);
            }
            NarrowPhaseAlgorithm::Unsupported => {
                log::trace!(
                    "no narrow-phase algorithm for {:?} vs {:?}",
                    shape1.shape_type(),
                    shape2.shape_type()
                );
            }
        }
        out.len() > before
    }
}

/// Closed-form sphere test: depth is the sum of radii minus the center distance.
pub fn sphere_vs_sphere(
    radius1: f32,
    transform1: &Transform,
    radius2: f32,
    transform2: &Transform,
    margin: f32,
) -> Option<ContactPointInfo> {
    let delta = transform2.position - transform1.position;
    let distance_sq = delta.length_squared();
    let reach = radius1 + radius2 + margin;
    if distance_sq > reach * reach {
        return None;
    }
    let distance = distance_sq.sqrt();
    let normal = if distance > f32::EPSILON {
        delta / distance
    } else {
        Vec3::X
    };
    let point1 = transform1.position + normal * radius1;
    let point2 = transform2.position - normal * radius2;
    Some(ContactPointInfo {
        normal,
        depth: radius1 + radius2 - distance,
        local_point1: transform1.inverse_transform_point(point1),
        local_point2: transform2.inverse_transform_point(point2),
    })
}

/// General convex test. Degenerate EPA polytopes and GJK iteration caps both
/// report no contact.
pub fn convex_vs_convex<A, B>(
    a: &A,
    transform_a: &Transform,
    b: &B,
    transform_b: &Transform,
    margin: f32,
) -> Option<ContactPointInfo>
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    convex_vs_convex_with_limit(a, transform_a, b, transform_b, margin, GJK_MAX_ITERATIONS)
}

pub fn convex_vs_convex_with_limit<A, B>(
    a: &A,
    transform_a: &Transform,
    b: &B,
    transform_b: &Transform,
    margin: f32,
    max_iterations: usize,
) -> Option<ContactPointInfo>
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let gjk = gjk_epa_with_limit(a, transform_a, b, transform_b, max_iterations);
    let (normal, depth, point_a, point_b) = match gjk {
        Ok(Some(pen)) => (pen.normal, pen.depth, pen.point_a, pen.point_b),
        Ok(None) => {
            log::trace!("EPA polytope degenerate; reporting no contact");
            return None;
        }
        Err(GjkResult::Separated {
            distance,
            point_a,
            point_b,
        }) if distance <= margin => {
            let normal = (point_b - point_a).try_normalize()?;
            (normal, -distance, point_a, point_b)
        }
        Err(GjkResult::NoConvergence) => {
            log::trace!("GJK hit its iteration cap; reporting no contact");
            return None;
        }
        Err(_) => return None,
    };
    Some(ContactPointInfo {
        normal,
        depth,
        local_point1: transform_a.inverse_transform_point(point_a),
        local_point2: transform_b.inverse_transform_point(point_b),
    })
}

/// Tests `convex` against every triangle of `concave` near it. With `flip`
/// set, the convex shape is body 1 and normals point toward the concave shape.
fn concave_vs_convex(
    concave: &CollisionShape,
    concave_transform: &Transform,
    convex: &CollisionShape,
    convex_transform: &Transform,
    margin: f32,
    flip: bool,
    out: &mut Vec<ContactPointInfo>,
) {
    let relative = concave_transform.inverse().combine(convex_transform);
    let region = convex.compute_aabb(&relative).expanded(margin);

    let mut visit = |triangle: Triangle| {
        let contact = if flip {
            convex_vs_convex(convex, convex_transform, &triangle, concave_transform, margin)
        } else {
            convex_vs_convex(&triangle, concave_transform, convex, convex_transform, margin)
        };
        out.extend(contact);
    };

    match concave {
        CollisionShape::ConcaveMesh { mesh } => mesh.for_each_triangle_in(&region, &mut visit),
        CollisionShape::HeightField { field } => field.for_each_triangle_in(&region, &mut visit),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn at(x: f32, y: f32, z: f32) -> Transform {
        Transform::from_position(Vec3::new(x, y, z))
    }

    #[test]
    fn dispatch_table() {
        use NarrowPhaseAlgorithm as A;
        assert_eq!(A::select(ShapeType::Sphere, ShapeType::Sphere), A::SphereVsSphere);
        assert_eq!(A::select(ShapeType::Sphere, ShapeType::Box), A::ConvexVsConvex);
        assert_eq!(A::select(ShapeType::HeightField, ShapeType::Capsule), A::ConcaveVsConvex);
        assert_eq!(A::select(ShapeType::Box, ShapeType::ConcaveMesh), A::ConvexVsConcave);
        assert_eq!(A::select(ShapeType::ConcaveMesh, ShapeType::HeightField), A::Unsupported);
    }

    #[test]
    fn sphere_pair_matches_closed_form() {
        for (x, r1, r2) in [(1.5, 1.0, 1.0), (0.3, 0.5, 0.2), (2.9, 2.0, 1.0)] {
            let contact = sphere_vs_sphere(r1, &at(0.0, 0.0, 0.0), r2, &at(x, 0.0, 0.0), 0.0)
                .expect("overlapping spheres");
            assert_abs_diff_eq!(contact.depth, r1 + r2 - x, epsilon = 1e-6);
            assert_eq!(contact.normal, Vec3::X);
        }
        assert!(sphere_vs_sphere(1.0, &at(0.0, 0.0, 0.0), 1.0, &at(3.0, 0.0, 0.0), 0.0).is_none());
    }

    #[test]
    fn margin_reports_speculative_contact() {
        let cube = CollisionShape::cuboid(Vec3::splat(0.5));
        let mut out = Vec::new();
        assert!(!NarrowPhase::collide(&cube, &at(0.0, 0.0, 0.0), &cube, &at(1.01, 0.0, 0.0), 0.0, &mut out));
        assert!(NarrowPhase::collide(&cube, &at(0.0, 0.0, 0.0), &cube, &at(1.01, 0.0, 0.0), 0.02, &mut out));
        assert_abs_diff_eq!(out[0].depth, -0.01, epsilon = 1e-4);
        assert_abs_diff_eq!(out[0].normal.x, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn unconverged_gjk_reports_no_contact() {
        let cube = CollisionShape::cuboid(Vec3::splat(0.5));
        let (ta, tb) = (at(0.0, 0.0, 0.0), at(3.0, 0.2, 0.0));
        let contact = convex_vs_convex(&cube, &ta, &cube, &tb, 2.5).expect("within margin");
        assert_abs_diff_eq!(contact.depth, -2.0, epsilon = 1e-4);
        assert!(convex_vs_convex_with_limit(&cube, &ta, &cube, &tb, 2.5, 1).is_none());
    }

    #[test]
    fn degenerate_polytope_reports_no_contact() {
        let triangle = Triangle::new(
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(0.0, 0.0, 1.0),
        );
        assert!(convex_vs_convex(&triangle, &at(0.0, 0.0, 0.0), &triangle, &at(0.2, 0.0, 0.1), 0.0).is_none());
    }

    #[test]
    fn sphere_on_heightfield_touches_flat_ground() {
        let ground = CollisionShape::height_field(4, 4, vec![0.0; 16], Vec3::ONE);
        let ball = CollisionShape::sphere(0.5);
        let mut out = Vec::new();
        assert!(NarrowPhase::collide(&ground, &at(0.0, 0.0, 0.0), &ball, &at(-0.1, 0.45, 0.1), 0.0, &mut out));
        for contact in &out {
            assert!(contact.normal.y > 0.95);
            assert_abs_diff_eq!(contact.depth, 0.05, epsilon = 2e-3);
        }

        let mut flipped = Vec::new();
        NarrowPhase::collide(&ball, &at(-0.1, 0.45, 0.1), &ground, &at(0.0, 0.0, 0.0), 0.0, &mut flipped);
        assert!(flipped.iter().all(|c| c.normal.y < -0.95));
    }

    #[test]
    fn concave_pair_has_no_contacts() {
        let mesh = CollisionShape::mesh(
            vec![Vec3::ZERO, Vec3::X, Vec3::Z],
            vec![[0, 1, 2]],
        );
        let mut out = Vec::new();
        assert!(!NarrowPhase::collide(&mesh, &Transform::IDENTITY, &mesh, &Transform::IDENTITY, 0.0, &mut out));
    }
}
