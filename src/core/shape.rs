use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    aabb::Aabb,
    mesh::{HeightField, Triangle, TriangleMesh},
    types::{InertiaTensorExt, Transform},
};
use crate::utils::math::inertia_capsule;

/// Type tag used by the narrow phase to pick a collision algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeType {
    Sphere,
    Box,
    Capsule,
    ConvexHull,
    ConcaveMesh,
    HeightField,
}

impl ShapeType {
    pub fn is_convex(self) -> bool {
        !matches!(self, ShapeType::ConcaveMesh | ShapeType::HeightField)
    }
}

/// Immutable geometry attached to a body, expressed in the body's local frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CollisionShape {
    Sphere {
        radius: f32,
    },
    Box {
        half_extents: Vec3,
    },
    /// Capsule aligned with the local Y axis; `height` is the distance
    /// between the centers of the two caps.
    Capsule {
        radius: f32,
        height: f32,
    },
    ConvexHull {
        vertices: Vec<Vec3>,
    },
    ConcaveMesh {
        mesh: TriangleMesh,
    },
    HeightField {
        field: HeightField,
    },
}

/// Support function of a convex set in its local frame: the farthest point
/// along `direction`.
pub trait SupportMap {
    fn local_support(&self, direction: Vec3) -> Vec3;
}

impl CollisionShape {
    pub fn sphere(radius: f32) -> Self {
        CollisionShape::Sphere { radius }
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        CollisionShape::Box { half_extents }
    }

    pub fn capsule(radius: f32, height: f32) -> Self {
        CollisionShape::Capsule { radius, height }
    }

    pub fn convex_hull(vertices: Vec<Vec3>) -> Self {
        CollisionShape::ConvexHull { vertices }
    }

    pub fn mesh(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Self {
        CollisionShape::ConcaveMesh {
            mesh: TriangleMesh::builder(vertices, indices).build(),
        }
    }

    pub fn height_field(rows: usize, columns: usize, heights: Vec<f32>, scale: Vec3) -> Self {
        CollisionShape::HeightField {
            field: HeightField::new(rows, columns, heights, scale),
        }
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            CollisionShape::Sphere { .. } => ShapeType::Sphere,
            CollisionShape::Box { .. } => ShapeType::Box,
            CollisionShape::Capsule { .. } => ShapeType::Capsule,
            CollisionShape::ConvexHull { .. } => ShapeType::ConvexHull,
            CollisionShape::ConcaveMesh { .. } => ShapeType::ConcaveMesh,
            CollisionShape::HeightField { .. } => ShapeType::HeightField,
        }
    }

    /// Checks the geometric parameters; returns a description of the first problem.
    pub fn validate(&self) -> Result<(), &'static str> {
        let ok = match self {
            CollisionShape::Sphere { radius } => *radius > 0.0 && radius.is_finite(),
            CollisionShape::Box { half_extents } => {
                half_extents.cmpgt(Vec3::ZERO).all() && half_extents.is_finite()
            }
            CollisionShape::Capsule { radius, height } => *radius > 0.0 && *height >= 0.0,
            CollisionShape::ConvexHull { vertices } => {
                !vertices.is_empty() && vertices.iter().all(|v| v.is_finite())
            }
            CollisionShape::ConcaveMesh { mesh } => mesh.is_well_formed(),
            CollisionShape::HeightField { field } => field.is_well_formed(),
        };
        if ok {
            Ok(())
        } else {
            Err(match self.shape_type() {
                ShapeType::Sphere => "sphere radius must be positive",
                ShapeType::Box => "box half extents must be positive",
                ShapeType::Capsule => "capsule needs a positive radius and non-negative height",
                ShapeType::ConvexHull => "convex hull needs at least one finite vertex",
                ShapeType::ConcaveMesh => "mesh indices must reference existing vertices",
                ShapeType::HeightField => "height field needs rows*columns samples (>= 2x2)",
            })
        }
    }

    pub fn local_aabb(&self) -> Aabb {
        match self {
            CollisionShape::Sphere { radius } => {
                Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(*radius))
            }
            CollisionShape::Box { half_extents } => {
                Aabb::from_center_half_extents(Vec3::ZERO, *half_extents)
            }
            CollisionShape::Capsule { radius, height } => Aabb::from_center_half_extents(
                Vec3::ZERO,
                Vec3::new(*radius, height * 0.5 + radius, *radius),
            ),
            CollisionShape::ConvexHull { vertices } => Aabb::from_points(vertices),
            CollisionShape::ConcaveMesh { mesh } => mesh.bounds,
            CollisionShape::HeightField { field } => field.bounds,
        }
    }

    /// World-space bounding box of the shape placed at `transform`.
    pub fn compute_aabb(&self, transform: &Transform) -> Aabb {
        match self {
            CollisionShape::Sphere { radius } => {
                Aabb::from_center_half_extents(transform.position, Vec3::splat(*radius))
            }
            CollisionShape::Capsule { radius, height } => {
                let axis = transform.rotation * Vec3::new(0.0, height * 0.5, 0.0);
                let top = transform.position + axis;
                let bottom = transform.position - axis;
                Aabb::from_points(&[top, bottom]).expanded(*radius)
            }
            CollisionShape::ConvexHull { vertices } => Aabb::from_points(
                &vertices
                    .iter()
                    .map(|v| transform.transform_point(*v))
                    .collect::<Vec<_>>(),
            ),
            _ => self.local_aabb().transformed(transform),
        }
    }

    /// Body-space inertia tensor for a body of the given mass.
    pub fn inertia_tensor(&self, mass: f32) -> Mat3 {
        match self {
            CollisionShape::Sphere { radius } => Mat3::for_solid_sphere(*radius, mass),
            CollisionShape::Box { half_extents } => Mat3::for_solid_box(*half_extents, mass),
            CollisionShape::Capsule { radius, height } => inertia_capsule(*radius, *height, mass),
            _ => Mat3::for_solid_box(self.local_aabb().half_extents(), mass),
        }
    }
}

impl SupportMap for CollisionShape {
    fn local_support(&self, direction: Vec3) -> Vec3 {
        match self {
            CollisionShape::Sphere { radius } => direction.normalize_or(Vec3::X) * *radius,
            CollisionShape::Box { half_extents } => Vec3::new(
                half_extents.x.copysign(direction.x),
                half_extents.y.copysign(direction.y),
                half_extents.z.copysign(direction.z),
            ),
            CollisionShape::Capsule { radius, height } => {
                let cap = if direction.y >= 0.0 { 0.5 * height } else { -0.5 * height };
                Vec3::new(0.0, cap, 0.0) + direction.normalize_or(Vec3::X) * *radius
            }
            CollisionShape::ConvexHull { vertices } => farthest_point(vertices, direction),
            CollisionShape::ConcaveMesh { mesh } => farthest_point(&mesh.vertices, direction),
            CollisionShape::HeightField { field } => {
                let b = field.bounds;
                Vec3::new(
                    if direction.x >= 0.0 { b.max.x } else { b.min.x },
                    if direction.y >= 0.0 { b.max.y } else { b.min.y },
                    if direction.z >= 0.0 { b.max.z } else { b.min.z },
                )
            }
        }
    }
}

impl SupportMap for Triangle {
    fn local_support(&self, direction: Vec3) -> Vec3 {
        farthest_point(&self.vertices, direction)
    }
}

fn farthest_point(points: &[Vec3], direction: Vec3) -> Vec3 {
    points
        .iter()
        .copied()
        .max_by(|a, b| a.dot(direction).total_cmp(&b.dot(direction)))
        .unwrap_or(Vec3::ZERO)
}
