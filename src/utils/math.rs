//! Additional math helpers layered on top of `glam`.

use glam::{Mat3, Quat, Vec3};

/// Determinant magnitude under which a 3×3 matrix is treated as singular.
pub const SINGULAR_EPSILON: f32 = 1e-9;

/// Returns the matrix `S` such that `S * x == v.cross(x)`.
pub fn skew_symmetric(v: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(0.0, v.z, -v.y),
        Vec3::new(-v.z, 0.0, v.x),
        Vec3::new(v.y, -v.x, 0.0),
    )
}

/// Inverts `m`, or returns the zero matrix when `m` is singular or not finite.
pub fn inverse_or_zero(m: Mat3) -> Mat3 {
    let det = m.determinant();
    if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
        return Mat3::ZERO;
    }
    m.inverse()
}

/// Rotates a body-space inverse inertia tensor into world space: `R * I⁻¹ * Rᵀ`.
pub fn world_inverse_inertia(rotation: Quat, local_inverse_inertia: Mat3) -> Mat3 {
    let r = Mat3::from_quat(rotation);
    r * local_inverse_inertia * r.transpose()
}

/// Applies a pseudo angular displacement to an orientation:
/// `q += 0.5 * (0, w) * q`, followed by renormalization.
pub fn integrate_orientation(orientation: Quat, angular_displacement: Vec3) -> Quat {
    let spin = Quat::from_xyzw(
        angular_displacement.x,
        angular_displacement.y,
        angular_displacement.z,
        0.0,
    ) * orientation;
    let updated = orientation + spin * 0.5;
    if updated.length_squared() < SINGULAR_EPSILON {
        return orientation;
    }
    updated.normalize()
}

/// Builds an inertia tensor for a solid capsule aligned along Y.
///
/// `height` is the length of the cylindrical section between the two caps.
pub fn inertia_capsule(radius: f32, height: f32, mass: f32) -> Mat3 {
    let cylinder_volume = std::f32::consts::PI * radius * radius * height;
    let sphere_volume = 4.0 / 3.0 * std::f32::consts::PI * radius.powi(3);
    let total_volume = cylinder_volume + sphere_volume;
    if total_volume <= 0.0 {
        return Mat3::ZERO;
    }
    let cylinder_mass = mass * cylinder_volume / total_volume;
    let caps_mass = mass - cylinder_mass;

    let half_height = height * 0.5;
    let radial = 0.5 * cylinder_mass * radius * radius + 0.4 * caps_mass * radius * radius;
    let lateral = cylinder_mass * (3.0 * radius * radius + height * height) / 12.0
        + caps_mass
            * (0.4 * radius * radius + half_height * half_height + 0.75 * half_height * radius);

    Mat3::from_diagonal(Vec3::new(lateral, radial, lateral))
}
