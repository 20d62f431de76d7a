//! GJK distance and EPA penetration depth between convex support maps.
//!
//! Both algorithms work on the Minkowski difference `A - B`. Every vertex
//! keeps the two support points it came from so that witness points on
//! each shape can be recovered from barycentric weights.

use glam::Vec3;

use crate::core::{shape::SupportMap, types::Transform};

pub const GJK_MAX_ITERATIONS: usize = 64;
pub const EPA_MAX_ITERATIONS: usize = 128;

/// Relative progress below which GJK considers the distance converged.
const GJK_RELATIVE_TOLERANCE: f32 = 1e-6;
/// Squared distance under which the origin is treated as touching the simplex.
const GJK_TOUCHING_SQ: f32 = 1e-10;
const EPA_TOLERANCE: f32 = 1e-4;
const DEGENERATE_EPSILON: f32 = 1e-10;

/// Outcome of a GJK distance query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GjkResult {
    /// The shapes are disjoint; witness points are in world space.
    Separated {
        distance: f32,
        point_a: Vec3,
        point_b: Vec3,
    },
    /// The origin lies inside (or on) the Minkowski difference.
    Overlapping,
    /// The iteration cap was hit before convergence.
    NoConvergence,
}

/// Penetration found by EPA. `normal` points from A toward B and the
/// witness points satisfy `point_a - point_b == normal * depth`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penetration {
    pub normal: Vec3,
    pub depth: f32,
    pub point_a: Vec3,
    pub point_b: Vec3,
}

#[derive(Debug, Clone, Copy)]
struct SupportPoint {
    w: Vec3,
    a: Vec3,
    b: Vec3,
}

/// A convex shape placed in the world.
struct Placed<'a, S: SupportMap + ?Sized> {
    shape: &'a S,
    transform: &'a Transform,
}

impl<S: SupportMap + ?Sized> Placed<'_, S> {
    fn support(&self, direction: Vec3) -> Vec3 {
        let local = self
            .shape
            .local_support(self.transform.inverse_transform_vector(direction));
        self.transform.transform_point(local)
    }
}

struct MinkowskiDifference<'a, A: SupportMap + ?Sized, B: SupportMap + ?Sized> {
    a: Placed<'a, A>,
    b: Placed<'a, B>,
}

impl<A: SupportMap + ?Sized, B: SupportMap + ?Sized> MinkowskiDifference<'_, A, B> {
    fn support(&self, direction: Vec3) -> SupportPoint {
        let a = self.a.support(direction);
        let b = self.b.support(-direction);
        SupportPoint { w: a - b, a, b }
    }
}

#[derive(Debug, Clone, Default)]
struct Simplex {
    points: Vec<SupportPoint>,
    weights: Vec<f32>,
}

impl Simplex {
    fn witness_points(&self) -> (Vec3, Vec3) {
        self.points
            .iter()
            .zip(&self.weights)
            .fold((Vec3::ZERO, Vec3::ZERO), |(pa, pb), (p, w)| {
                (pa + p.a * *w, pb + p.b * *w)
            })
    }

    fn keep(&mut self, kept: &[(usize, f32)]) {
        let points: Vec<SupportPoint> = kept.iter().map(|(i, _)| self.points[*i]).collect();
        self.weights = kept.iter().map(|(_, w)| *w).collect();
        self.points = points;
    }

    /// Reduces the simplex to the smallest sub-simplex containing the point
    /// closest to the origin and returns that point. Returns `None` when the
    /// tetrahedron encloses the origin.
    fn closest_to_origin(&mut self) -> Option<Vec3> {
        match self.points.len() {
            1 => {
                self.weights = vec![1.0];
                Some(self.points[0].w)
            }
            2 => {
                let kept = closest_on_segment(self.points[0].w, self.points[1].w);
                self.reduce(&[0, 1], &kept)
            }
            3 => {
                let kept = closest_on_triangle(
                    self.points[0].w,
                    self.points[1].w,
                    self.points[2].w,
                );
                self.reduce(&[0, 1, 2], &kept)
            }
            _ => self.closest_on_tetrahedron(),
        }
    }

    fn reduce(&mut self, indices: &[usize], kept: &[(usize, f32)]) -> Option<Vec3> {
        let mapped: Vec<(usize, f32)> = kept.iter().map(|(i, w)| (indices[*i], *w)).collect();
        self.keep(&mapped);
        Some(self.closest_point())
    }

    fn closest_point(&self) -> Vec3 {
        self.points
            .iter()
            .zip(&self.weights)
            .fold(Vec3::ZERO, |acc, (p, w)| acc + p.w * *w)
    }

    fn closest_on_tetrahedron(&mut self) -> Option<Vec3> {
        let [a, b, c, d] = [
            self.points[0].w,
            self.points[1].w,
            self.points[2].w,
            self.points[3].w,
        ];
        let faces = [
            ([0, 1, 2], d),
            ([0, 2, 3], b),
            ([0, 3, 1], c),
            ([1, 3, 2], a),
        ];

        let mut best: Option<(f32, Vec<(usize, f32)>)> = None;
        for (face, opposite) in faces {
            let [p, q, r] = face.map(|i| self.points[i].w);
            if !origin_outside_plane(p, q, r, opposite) {
                continue;
            }
            let kept = closest_on_triangle(p, q, r);
            let point = kept
                .iter()
                .fold(Vec3::ZERO, |acc, (i, w)| acc + [p, q, r][*i] * *w);
            let dist_sq = point.length_squared();
            if best.as_ref().map_or(true, |(d, _)| dist_sq < *d) {
                let mapped = kept.iter().map(|(i, w)| (face[*i], *w)).collect();
                best = Some((dist_sq, mapped));
            }
        }

        let (_, kept) = best?;
        self.keep(&kept);
        Some(self.closest_point())
    }
}

/// Whether the origin and `opposite` lie on different sides of plane (a, b, c).
/// A flat tetrahedron counts every face as separating.
fn origin_outside_plane(a: Vec3, b: Vec3, c: Vec3, opposite: Vec3) -> bool {
    let normal = (b - a).cross(c - a);
    let sign_origin = (-a).dot(normal);
    let sign_opposite = (opposite - a).dot(normal);
    if sign_opposite.abs() <= DEGENERATE_EPSILON {
        return true;
    }
    sign_origin * sign_opposite < 0.0
}

fn closest_on_segment(a: Vec3, b: Vec3) -> Vec<(usize, f32)> {
    let ab = b - a;
    let denom = ab.length_squared();
    if denom <= DEGENERATE_EPSILON {
        return vec![(0, 1.0)];
    }
    let t = -a.dot(ab) / denom;
    if t <= 0.0 {
        vec![(0, 1.0)]
    } else if t >= 1.0 {
        vec![(1, 1.0)]
    } else {
        vec![(0, 1.0 - t), (1, t)]
    }
}

/// Voronoi-region walk for the point of triangle (a, b, c) closest to the origin.
fn closest_on_triangle(a: Vec3, b: Vec3, c: Vec3) -> Vec<(usize, f32)> {
    let ab = b - a;
    let ac = c - a;
    let ap = -a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return vec![(0, 1.0)];
    }

    let bp = -b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return vec![(1, 1.0)];
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return vec![(0, 1.0 - v), (1, v)];
    }

    let cp = -c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return vec![(2, 1.0)];
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return vec![(0, 1.0 - w), (2, w)];
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return vec![(1, 1.0 - w), (2, w)];
    }

    let sum = va + vb + vc;
    if sum.abs() <= DEGENERATE_EPSILON {
        // Collinear vertices: fall back to the best edge.
        let edges = [(0, 1), (0, 2), (1, 2)];
        let verts = [a, b, c];
        return edges
            .iter()
            .map(|&(i, j)| {
                let kept = closest_on_segment(verts[i], verts[j]);
                let mapped: Vec<(usize, f32)> = kept
                    .iter()
                    .map(|(k, w)| (if *k == 0 { i } else { j }, *w))
                    .collect();
                let point = mapped.iter().fold(Vec3::ZERO, |acc, (k, w)| acc + verts[*k] * *w);
                (point.length_squared(), mapped)
            })
            .min_by(|x, y| x.0.total_cmp(&y.0))
            .map(|(_, kept)| kept)
            .unwrap_or_else(|| vec![(0, 1.0)]);
    }
    let denom = 1.0 / sum;
    let v = vb * denom;
    let w = vc * denom;
    vec![(0, 1.0 - v - w), (1, v), (2, w)]
}

/// Distance query between two convex shapes, giving up after
/// `max_iterations` refinements. On overlap the final simplex is returned
/// alongside so EPA can start from it.
fn gjk<A, B>(diff: &MinkowskiDifference<'_, A, B>, max_iterations: usize) -> (GjkResult, Simplex)
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let initial_direction = {
        let d = diff.b.transform.position - diff.a.transform.position;
        if d.length_squared() > DEGENERATE_EPSILON {
            d
        } else {
            Vec3::X
        }
    };

    let mut simplex = Simplex::default();
    let first = diff.support(initial_direction);
    simplex.points.push(first);
    simplex.weights.push(1.0);
    let mut v = first.w;

    for _ in 0..max_iterations {
        let v_sq = v.length_squared();
        if v_sq <= GJK_TOUCHING_SQ {
            return (GjkResult::Overlapping, simplex);
        }

        let candidate = diff.support(-v);
        let progress = v_sq - v.dot(candidate.w);
        let duplicate = simplex
            .points
            .iter()
            .any(|p| p.w.distance_squared(candidate.w) <= DEGENERATE_EPSILON);
        if duplicate || progress <= GJK_RELATIVE_TOLERANCE * v_sq {
            let (point_a, point_b) = simplex.witness_points();
            return (
                GjkResult::Separated {
                    distance: v_sq.sqrt(),
                    point_a,
                    point_b,
                },
                simplex,
            );
        }

        let previous = simplex.clone();
        simplex.points.push(candidate);
        match simplex.closest_to_origin() {
            None => return (GjkResult::Overlapping, simplex),
            Some(next) => {
                if next.length_squared() >= v_sq {
                    // No improvement: numerical floor reached.
                    let (point_a, point_b) = previous.witness_points();
                    return (
                        GjkResult::Separated {
                            distance: v_sq.sqrt(),
                            point_a,
                            point_b,
                        },
                        previous,
                    );
                }
                v = next;
            }
        }
    }

    (GjkResult::NoConvergence, simplex)
}

/// Runs GJK between `a` placed at `ta` and `b` placed at `tb`.
pub fn gjk_distance<A, B>(a: &A, ta: &Transform, b: &B, tb: &Transform) -> GjkResult
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let diff = MinkowskiDifference {
        a: Placed { shape: a, transform: ta },
        b: Placed { shape: b, transform: tb },
    };
    gjk(&diff, GJK_MAX_ITERATIONS).0
}

/// Full convex query: `Ok(Some)` on overlap with EPA's penetration,
/// `Err(result)` with the GJK outcome otherwise.
pub fn gjk_epa<A, B>(
    a: &A,
    ta: &Transform,
    b: &B,
    tb: &Transform,
) -> Result<Option<Penetration>, GjkResult>
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    gjk_epa_with_limit(a, ta, b, tb, GJK_MAX_ITERATIONS)
}

/// [`gjk_epa`] with an explicit GJK iteration cap.
pub fn gjk_epa_with_limit<A, B>(
    a: &A,
    ta: &Transform,
    b: &B,
    tb: &Transform,
    max_iterations: usize,
) -> Result<Option<Penetration>, GjkResult>
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let diff = MinkowskiDifference {
        a: Placed { shape: a, transform: ta },
        b: Placed { shape: b, transform: tb },
    };
    match gjk(&diff, max_iterations) {
        (GjkResult::Overlapping, simplex) => Ok(epa(&diff, simplex)),
        (other, _) => Err(other),
    }
}

#[derive(Debug, Clone, Copy)]
struct Face {
    indices: [usize; 3],
    normal: Vec3,
    distance: f32,
}

/// Fixed search directions used to grow a degenerate simplex.
const SEARCH_DIRECTIONS: [Vec3; 6] = [
    Vec3::X,
    Vec3::Y,
    Vec3::Z,
    Vec3::NEG_X,
    Vec3::NEG_Y,
    Vec3::NEG_Z,
];

/// Grows the GJK simplex into a tetrahedron that still contains the origin.
fn blow_up<A, B>(diff: &MinkowskiDifference<'_, A, B>, simplex: Simplex) -> Option<[SupportPoint; 4]>
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let mut points = simplex.points;

    if points.len() == 1 {
        let origin = points[0].w;
        let extra = SEARCH_DIRECTIONS
            .iter()
            .map(|d| diff.support(*d))
            .find(|p| p.w.distance_squared(origin) > DEGENERATE_EPSILON)?;
        points.push(extra);
    }

    if points.len() == 2 {
        let axis = (points[1].w - points[0].w).normalize_or_zero();
        let extra = SEARCH_DIRECTIONS.iter().find_map(|d| {
            let perpendicular = d.cross(axis);
            if perpendicular.length_squared() <= 1e-6 {
                return None;
            }
            [perpendicular, -perpendicular].into_iter().find_map(|dir| {
                let p = diff.support(dir);
                let off_line = (p.w - points[0].w).cross(axis).length_squared();
                (off_line > DEGENERATE_EPSILON).then_some(p)
            })
        })?;
        points.push(extra);
    }

    if points.len() == 3 {
        let normal = (points[1].w - points[0].w).cross(points[2].w - points[0].w);
        if normal.length_squared() <= DEGENERATE_EPSILON {
            return None;
        }
        let extra = [normal, -normal].into_iter().find_map(|dir| {
            let p = diff.support(dir);
            ((p.w - points[0].w).dot(normal).abs() > 1e-6).then_some(p)
        })?;
        points.push(extra);
    }

    let [a, b, c, d] = [points[0], points[1], points[2], points[3]];
    let volume = (b.w - a.w).cross(c.w - a.w).dot(d.w - a.w);
    if volume.abs() <= DEGENERATE_EPSILON {
        return None;
    }
    Some([a, b, c, d])
}

fn make_face(vertices: &[SupportPoint], indices: [usize; 3]) -> Option<Face> {
    let [a, b, c] = indices.map(|i| vertices[i].w);
    let normal = (b - a).cross(c - a).try_normalize()?;
    Some(Face {
        indices,
        normal,
        distance: normal.dot(a),
    })
}

/// Expanding polytope search for the face of `A - B` closest to the origin.
///
/// Returns `None` for a degenerate polytope. Hitting the iteration cap
/// returns the best face found so far.
fn epa<A, B>(diff: &MinkowskiDifference<'_, A, B>, simplex: Simplex) -> Option<Penetration>
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let tetra = blow_up(diff, simplex)?;
    let mut vertices: Vec<SupportPoint> = tetra.to_vec();
    let centroid = tetra.iter().fold(Vec3::ZERO, |acc, p| acc + p.w) * 0.25;

    let mut faces = Vec::with_capacity(32);
    for mut indices in [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]] {
        let [a, b, c] = indices.map(|i| vertices[i].w);
        if (b - a).cross(c - a).dot(a - centroid) < 0.0 {
            indices.swap(1, 2);
        }
        faces.push(make_face(&vertices, indices)?);
    }
    if faces.iter().any(|f| f.distance < -EPA_TOLERANCE) {
        return None;
    }

    let mut best = closest_face(&faces)?;
    for _ in 0..EPA_MAX_ITERATIONS {
        best = closest_face(&faces)?;
        let candidate = diff.support(best.normal);
        if candidate.w.dot(best.normal) - best.distance < EPA_TOLERANCE {
            return Some(penetration(&vertices, &best));
        }

        let new_index = vertices.len();
        vertices.push(candidate);

        let mut horizon: Vec<(usize, usize)> = Vec::new();
        faces.retain(|face| {
            let a = vertices[face.indices[0]].w;
            if face.normal.dot(candidate.w - a) <= 0.0 {
                return true;
            }
            let [i, j, k] = face.indices;
            for edge in [(i, j), (j, k), (k, i)] {
                if let Some(pos) = horizon.iter().position(|e| *e == (edge.1, edge.0)) {
                    horizon.swap_remove(pos);
                } else {
                    horizon.push(edge);
                }
            }
            false
        });

        for (i, j) in horizon {
            match make_face(&vertices, [i, j, new_index]) {
                Some(face) => faces.push(face),
                None => return Some(penetration(&vertices, &best)),
            }
        }
        if faces.is_empty() {
            return Some(penetration(&vertices, &best));
        }
    }

    log::trace!("EPA hit its iteration cap; using best face");
    Some(penetration(&vertices, &best))
}

fn closest_face(faces: &[Face]) -> Option<Face> {
    faces
        .iter()
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
        .copied()
}

fn penetration(vertices: &[SupportPoint], face: &Face) -> Penetration {
    let [a, b, c] = face.indices.map(|i| vertices[i]);
    let projection = face.normal * face.distance;
    let [u, v, w] = barycentric(projection, a.w, b.w, c.w);
    Penetration {
        normal: face.normal,
        depth: face.distance.max(0.0),
        point_a: a.a * u + b.a * v + c.a * w,
        point_b: a.b * u + b.b * v + c.b * w,
    }
}

fn barycentric(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> [f32; 3] {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= DEGENERATE_EPSILON {
        return [1.0, 0.0, 0.0];
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    [1.0 - v - w, v, w]
}
