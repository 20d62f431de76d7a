use glam::{Mat3, Quat, Vec3};

use super::{
    aabb::Aabb,
    shape::CollisionShape,
    types::{MassProperties, Material, Transform, Velocity},
};
use crate::{config::{DEFAULT_ANGULAR_DAMPING, DEFAULT_LINEAR_DAMPING}, utils::{allocator::Handle, math}};

/// Handle of a body stored in the world's arena.
pub type BodyHandle = Handle<RigidBody>;

/// Rigid body: kinematic state, mass data, and the shape used for collision.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub transform: Transform,
    pub velocity: Velocity,
    pub material: Material,
    pub gravity_enabled: bool,
    pub linear_damping: f32,
    pub angular_damping: f32,
    force: Vec3,
    torque: Vec3,
    shape: CollisionShape,
    mass_properties: MassProperties,
    inverse_mass: f32,
    local_inverse_inertia: Mat3,
    motion_enabled: bool,
    /// Set when the builder chose damping; otherwise the world's applies.
    custom_damping: bool,
    aabb: Aabb,
}

impl RigidBody {
    pub fn builder(shape: CollisionShape) -> RigidBodyBuilder {
        RigidBodyBuilder::new(shape)
    }

    pub fn shape(&self) -> &CollisionShape {
        &self.shape
    }

    /// World-space bounds as of the last [`RigidBody::update_aabb`].
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    pub fn update_aabb(&mut self) -> Aabb {
        self.aabb = self.shape.compute_aabb(&self.transform);
        self.aabb
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    pub fn rotation(&self) -> Quat {
        self.transform.rotation
    }

    pub fn has_custom_damping(&self) -> bool {
        self.custom_damping
    }

    pub fn is_motion_enabled(&self) -> bool {
        self.motion_enabled
    }

    /// Turns the body static (`false`) or dynamic (`true`). A static body keeps
    /// its transform and has zero velocity.
    pub fn set_motion_enabled(&mut self, enabled: bool) {
        self.motion_enabled = enabled;
        if !enabled {
            self.velocity = Velocity::default();
            self.clear_forces();
        }
    }

    pub fn mass_properties(&self) -> &MassProperties {
        &self.mass_properties
    }

    /// Sets the mass and derives the inertia tensor from the shape.
    pub fn set_mass(&mut self, mass: f32) {
        let mass = mass.max(0.0);
        self.set_mass_properties(MassProperties {
            mass,
            inertia: self.shape.inertia_tensor(mass),
        });
    }

    pub fn set_mass_properties(&mut self, props: MassProperties) {
        self.mass_properties = props;
        self.inverse_mass = props.inverse_mass();
        self.local_inverse_inertia = props.inverse_inertia();
    }

    /// Inverse mass seen by the solver; zero for bodies with motion disabled.
    pub fn inverse_mass(&self) -> f32 {
        if self.motion_enabled {
            self.inverse_mass
        } else {
            0.0
        }
    }

    pub fn local_inverse_inertia(&self) -> Mat3 {
        if self.motion_enabled {
            self.local_inverse_inertia
        } else {
            Mat3::ZERO
        }
    }

    /// Inverse inertia tensor rotated into world space with the current orientation.
    pub fn world_inverse_inertia(&self) -> Mat3 {
        math::world_inverse_inertia(self.transform.rotation, self.local_inverse_inertia())
    }

    pub fn force(&self) -> Vec3 {
        self.force
    }

    pub fn torque(&self) -> Vec3 {
        self.torque
    }

    pub fn apply_force(&mut self, force: Vec3) {
        if self.motion_enabled {
            self.force += force;
        }
    }

    pub fn apply_force_at_point(&mut self, force: Vec3, point: Vec3) {
        if self.motion_enabled {
            self.force += force;
            self.torque += (point - self.transform.position).cross(force);
        }
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        if self.motion_enabled {
            self.torque += torque;
        }
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, point: Vec3) {
        if !self.motion_enabled {
            return;
        }
        self.velocity.linear += impulse * self.inverse_mass;
        let angular = (point - self.transform.position).cross(impulse);
        self.velocity.angular += self.world_inverse_inertia() * angular;
    }

    pub fn clear_forces(&mut self) {
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }
}

pub struct RigidBodyBuilder {
    shape: CollisionShape,
    transform: Transform,
    velocity: Velocity,
    mass: f32,
    motion_enabled: bool,
    gravity_enabled: bool,
    material: Material,
    damping: Option<(f32, f32)>,
}

impl RigidBodyBuilder {
    pub fn new(shape: CollisionShape) -> Self {
        Self {
            shape,
            transform: Transform::IDENTITY,
            velocity: Velocity::default(),
            mass: 1.0,
            motion_enabled: true,
            gravity_enabled: true,
            material: Material::default(),
            damping: None,
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.transform.rotation = rotation.normalize();
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn linear_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity.linear = velocity;
        self
    }

    pub fn angular_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity.angular = velocity;
        self
    }

    pub fn mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    /// Static bodies never move and contribute zero inverse mass to constraints.
    pub fn fixed(mut self) -> Self {
        self.motion_enabled = false;
        self
    }

    pub fn gravity_enabled(mut self, enabled: bool) -> Self {
        self.gravity_enabled = enabled;
        self
    }

    pub fn material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    /// Overrides the world's damping for this body.
    pub fn damping(mut self, linear: f32, angular: f32) -> Self {
        self.damping = Some((linear, angular));
        self
    }

    pub fn build(self) -> RigidBody {
        let (linear_damping, angular_damping) = self
            .damping
            .unwrap_or((DEFAULT_LINEAR_DAMPING, DEFAULT_ANGULAR_DAMPING));
        let mut body = RigidBody {
            transform: self.transform,
            velocity: self.velocity,
            material: self.material,
            gravity_enabled: self.gravity_enabled,
            linear_damping,
            angular_damping,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            shape: self.shape,
            mass_properties: MassProperties::default(),
            inverse_mass: 1.0,
            local_inverse_inertia: Mat3::IDENTITY,
            motion_enabled: true,
            custom_damping: self.damping.is_some(),
            aabb: Aabb::EMPTY,
        };
        body.set_mass(self.mass);
        body.set_motion_enabled(self.motion_enabled);
        body.update_aabb();
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_body_has_zero_inverse_mass() {
        let body = RigidBody::builder(CollisionShape::sphere(1.0))
            .mass(5.0)
            .fixed()
            .build();
        assert_eq!(body.inverse_mass(), 0.0);
        assert_eq!(body.world_inverse_inertia(), Mat3::ZERO);
    }

    #[test]
    fn impulse_off_center_spins_body() {
        let mut body = RigidBody::builder(CollisionShape::cuboid(Vec3::splat(0.5)))
            .mass(2.0)
            .build();
        body.apply_impulse(Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.5, 0.0, 0.0));
        assert!((body.velocity.linear.z - 0.5).abs() < 1e-6);
        assert!(body.velocity.angular.y < 0.0);
    }

    #[test]
    fn builder_computes_world_aabb() {
        let body = RigidBody::builder(CollisionShape::sphere(0.5))
            .position(Vec3::new(3.0, 0.0, 0.0))
            .build();
        assert_eq!(body.aabb().min, Vec3::new(2.5, -0.5, -0.5));
    }
}
