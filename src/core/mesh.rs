use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::aabb::Aabb;

/// Single triangle in a concave shape's local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Vec3; 3],
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self {
            vertices: [a, b, c],
        }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.vertices)
    }

    pub fn normal(&self) -> Vec3 {
        let [a, b, c] = self.vertices;
        (b - a).cross(c - a).normalize_or_zero()
    }
}

/// Triangle soup used as a static concave collision shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
    pub bounds: Aabb,
}

impl TriangleMesh {
    pub fn builder(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> MeshBuilder {
        MeshBuilder::new(vertices, indices)
    }

    pub fn triangle(&self, index: usize) -> Triangle {
        let [a, b, c] = self.indices[index];
        Triangle::new(
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        )
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Whether every index refers to an existing vertex.
    pub fn is_well_formed(&self) -> bool {
        !self.indices.is_empty()
            && self
                .indices
                .iter()
                .flatten()
                .all(|&i| (i as usize) < self.vertices.len())
    }

    /// Calls `visit` for every triangle whose bounds overlap `region`.
    pub fn for_each_triangle_in(&self, region: &Aabb, mut visit: impl FnMut(Triangle)) {
        if !self.bounds.intersects(region) {
            return;
        }
        for index in 0..self.indices.len() {
            let triangle = self.triangle(index);
            if triangle.aabb().intersects(region) {
                visit(triangle);
            }
        }
    }
}

pub struct MeshBuilder {
    vertices: Vec<Vec3>,
    indices: Vec<[u32; 3]>,
}

impl MeshBuilder {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Self {
        Self { vertices, indices }
    }

    /// Merges vertices closer than `epsilon` and drops triangles that collapse.
    pub fn weld_vertices(mut self, epsilon: f32) -> Self {
        if epsilon <= 0.0 {
            return self;
        }
        let inv = 1.0 / epsilon;
        let mut lookup: HashMap<(i64, i64, i64), u32> = HashMap::new();
        let mut remap = Vec::with_capacity(self.vertices.len());
        let mut welded = Vec::with_capacity(self.vertices.len());

        for v in &self.vertices {
            let key = (
                (v.x * inv).round() as i64,
                (v.y * inv).round() as i64,
                (v.z * inv).round() as i64,
            );
            let index = *lookup.entry(key).or_insert_with(|| {
                welded.push(*v);
                (welded.len() - 1) as u32
            });
            remap.push(index);
        }

        self.indices = self
            .indices
            .iter()
            .filter_map(|tri| {
                let mapped = tri.map(|i| remap.get(i as usize).copied().unwrap_or(u32::MAX));
                let distinct =
                    mapped[0] != mapped[1] && mapped[1] != mapped[2] && mapped[0] != mapped[2];
                (distinct && !mapped.contains(&u32::MAX)).then_some(mapped)
            })
            .collect();
        self.vertices = welded;
        self
    }

    pub fn build(self) -> TriangleMesh {
        let bounds = Aabb::from_points(&self.vertices);
        TriangleMesh {
            vertices: self.vertices,
            indices: self.indices,
            bounds,
        }
    }
}

/// Regular grid of heights centered on the local origin, rows along Z and
/// columns along X.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightField {
    pub rows: usize,
    pub columns: usize,
    pub heights: Vec<f32>,
    /// Spacing between samples along X and Z, multiplier for heights along Y.
    pub scale: Vec3,
    pub bounds: Aabb,
}

impl HeightField {
    pub fn new(rows: usize, columns: usize, heights: Vec<f32>, scale: Vec3) -> Self {
        let mut field = Self {
            rows,
            columns,
            heights,
            scale,
            bounds: Aabb::EMPTY,
        };
        field.bounds = field.compute_bounds();
        field
    }

    pub fn is_well_formed(&self) -> bool {
        self.rows >= 2
            && self.columns >= 2
            && self.heights.len() == self.rows * self.columns
            && self.scale.cmpgt(Vec3::ZERO).all()
    }

    fn compute_bounds(&self) -> Aabb {
        if self.heights.is_empty() || self.rows < 2 || self.columns < 2 {
            return Aabb::EMPTY;
        }
        let (lo, hi) = self
            .heights
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), h| {
                (lo.min(*h), hi.max(*h))
            });
        let half_x = (self.columns - 1) as f32 * self.scale.x * 0.5;
        let half_z = (self.rows - 1) as f32 * self.scale.z * 0.5;
        Aabb::new(
            Vec3::new(-half_x, lo * self.scale.y, -half_z),
            Vec3::new(half_x, hi * self.scale.y, half_z),
        )
    }

    pub fn vertex(&self, row: usize, column: usize) -> Vec3 {
        let half_x = (self.columns - 1) as f32 * self.scale.x * 0.5;
        let half_z = (self.rows - 1) as f32 * self.scale.z * 0.5;
        Vec3::new(
            column as f32 * self.scale.x - half_x,
            self.heights[row * self.columns + column] * self.scale.y,
            row as f32 * self.scale.z - half_z,
        )
    }

    /// Calls `visit` for both triangles of every grid cell overlapping `region`.
    pub fn for_each_triangle_in(&self, region: &Aabb, mut visit: impl FnMut(Triangle)) {
        if !self.is_well_formed() || !self.bounds.intersects(region) {
            return;
        }
        let origin = self.bounds.min;
        let to_cell = |value: f32, start: f32, spacing: f32, cells: usize| -> usize {
            (((value - start) / spacing).floor().max(0.0) as usize).min(cells - 1)
        };
        let col_lo = to_cell(region.min.x, origin.x, self.scale.x, self.columns - 1);
        let col_hi = to_cell(region.max.x, origin.x, self.scale.x, self.columns - 1);
        let row_lo = to_cell(region.min.z, origin.z, self.scale.z, self.rows - 1);
        let row_hi = to_cell(region.max.z, origin.z, self.scale.z, self.rows - 1);

        for row in row_lo..=row_hi {
            for column in col_lo..=col_hi {
                let v00 = self.vertex(row, column);
                let v01 = self.vertex(row, column + 1);
                let v10 = self.vertex(row + 1, column);
                let v11 = self.vertex(row + 1, column + 1);
                for triangle in [Triangle::new(v00, v10, v01), Triangle::new(v01, v10, v11)] {
                    if triangle.aabb().intersects(region) {
                        visit(triangle);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welding_merges_duplicate_vertices() {
        let vertices = vec![
            Vec3::ZERO,
            Vec3::X,
            Vec3::Z,
            Vec3::new(1e-5, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
        ];
        let mesh = TriangleMesh::builder(vertices, vec![[0, 1, 2], [3, 4, 1]])
            .weld_vertices(1e-3)
            .build();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.is_well_formed());
    }

    #[test]
    fn heightfield_triangles_face_up() {
        let field = HeightField::new(3, 3, vec![0.0; 9], Vec3::ONE);
        let mut count = 0;
        field.for_each_triangle_in(&field.bounds, |triangle| {
            count += 1;
            assert!(triangle.normal().y > 0.99);
        });
        assert_eq!(count, 8);
    }
}
