use crate::utils::allocator::EntityId;
use crate::utils::math::angular_velocity_to_quat;

use super::types::{MassProperties, Transform, Velocity};
use glam::{Mat3, Quat, Vec3};

/// Point-mass state with orientation and inertia, integrated by the world each tick.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub id: EntityId,
    pub transform: Transform,
    pub velocity: Velocity,
    pub acceleration: Vec3,
    pub mass_properties: MassProperties,
    pub is_static: bool,
    pub has_gravity: bool,
    /// Set by the world while the body is part of a contact manifold.
    pub collision: bool,
    /// Hint for renderers to extrapolate with the `predict_future_*` helpers.
    pub movement_interpolation: bool,
    pub inverse_mass: f32,
    pub local_inverse_inertia: Mat3,
    pub global_inverse_inertia: Mat3,
}

impl Default for RigidBody {
    fn default() -> Self {
        let mut body = Self {
            id: EntityId::default(),
            transform: Transform::default(),
            velocity: Velocity::default(),
            acceleration: Vec3::ZERO,
            mass_properties: MassProperties::default(),
            is_static: false,
            has_gravity: false,
            collision: false,
            movement_interpolation: true,
            inverse_mass: 1.0,
            local_inverse_inertia: Mat3::IDENTITY,
            global_inverse_inertia: Mat3::IDENTITY,
        };
        body.recompute_inverses();
        body
    }
}

impl RigidBody {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.transform.rotation = rotation.normalize();
        self.refresh_global_inertia();
        self
    }

    pub fn with_mass_properties(mut self, props: MassProperties) -> Self {
        self.set_mass_properties(props);
        self
    }

    pub fn with_gravity(mut self, has_gravity: bool) -> Self {
        self.has_gravity = has_gravity;
        self
    }

    pub fn static_body(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn set_velocity(&mut self, linear: Vec3, angular: Vec3) {
        self.velocity.linear = linear;
        self.velocity.angular = angular;
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    pub fn set_mass_properties(&mut self, props: MassProperties) {
        self.mass_properties = props;
        self.recompute_inverses();
    }

    /// Inverse mass seen by constraints; zero for static bodies.
    pub fn solver_inverse_mass(&self) -> f32 {
        if self.is_static {
            0.0
        } else {
            self.inverse_mass
        }
    }

    /// World-space inverse inertia seen by constraints; zero for static bodies.
    pub fn solver_inverse_inertia(&self) -> Mat3 {
        if self.is_static {
            Mat3::ZERO
        } else {
            self.global_inverse_inertia
        }
    }

    /// Full explicit step: velocity, position, then orientation.
    pub fn update(&mut self, dt: f32) {
        self.update_velocity(dt);
        self.update_position(dt);
        self.update_orientation(dt);
    }

    pub fn update_velocity(&mut self, dt: f32) {
        self.velocity.linear += self.acceleration * dt;
    }

    pub fn update_position(&mut self, dt: f32) {
        self.transform.position += self.velocity.linear * dt;
    }

    pub fn update_orientation(&mut self, dt: f32) {
        self.transform.rotation = self.predict_future_orientation(dt);
        self.refresh_global_inertia();
    }

    pub fn predict_future_position(&self, dt: f32) -> Vec3 {
        self.transform.position + self.velocity.linear * dt
    }

    pub fn predict_future_orientation(&self, dt: f32) -> Quat {
        let delta = angular_velocity_to_quat(self.velocity.angular, dt);
        (delta * self.transform.rotation).normalize()
    }

    /// `R · I⁻¹ · Rᵀ` for the current orientation.
    pub fn refresh_global_inertia(&mut self) {
        let rotation = Mat3::from_quat(self.transform.rotation);
        self.global_inverse_inertia = rotation * self.local_inverse_inertia * rotation.transpose();
    }

    fn recompute_inverses(&mut self) {
        self.inverse_mass = if self.mass_properties.mass.abs() < f32::EPSILON {
            0.0
        } else {
            1.0 / self.mass_properties.mass
        };
        self.local_inverse_inertia = if self.mass_properties.inertia.determinant().abs() < f32::EPSILON {
            Mat3::ZERO
        } else {
            self.mass_properties.inertia.inverse()
        };
        self.refresh_global_inertia();
    }
}
