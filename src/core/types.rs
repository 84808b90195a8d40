use glam::{Mat3, Mat4, Quat, Vec3};
use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Position and orientation of a body or collider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Homogeneous matrix handed to renderers.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    pub fn rotation_matrix(&self) -> Mat3 {
        Mat3::from_quat(self.rotation)
    }

    /// `self ∘ other`: `other` expressed in the frame of `self`.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * other.position,
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    pub fn inverse_transform_vector(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * world
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

/// Mass and body-frame inertia tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f32,
    pub inertia: Mat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self::solid_box(Vec3::ONE, 1.0)
    }
}

impl MassProperties {
    pub fn solid_box(half_extents: Vec3, mass: f32) -> Self {
        Self {
            mass,
            inertia: Mat3::for_solid_box(half_extents, mass),
        }
    }

    pub fn solid_sphere(radius: f32, mass: f32) -> Self {
        Self {
            mass,
            inertia: Mat3::for_solid_sphere(radius, mass),
        }
    }
}

/// Inertia tensors of the primitive solids.
pub trait InertiaTensorExt {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Self;
    fn for_solid_sphere(radius: f32, mass: f32) -> Self;
}

impl InertiaTensorExt for Mat3 {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3 {
        let size = half_extents * 2.0;
        let factor = mass / 12.0;
        Mat3::from_diagonal(Vec3::new(
            factor * (size.y * size.y + size.z * size.z),
            factor * (size.x * size.x + size.z * size.z),
            factor * (size.x * size.x + size.y * size.y),
        ))
    }

    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3 {
        Mat3::from_diagonal(Vec3::splat(0.4 * mass * radius * radius))
    }
}

impl InertiaTensorExt for Matrix3<f64> {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Matrix3<f64> {
        mat3_to_na(Mat3::for_solid_box(half_extents, mass))
    }

    fn for_solid_sphere(radius: f32, mass: f32) -> Matrix3<f64> {
        mat3_to_na(Mat3::for_solid_sphere(radius, mass))
    }
}

pub fn vec3_to_na(v: Vec3) -> Vector3<f64> {
    Vector3::new(v.x as f64, v.y as f64, v.z as f64)
}

pub fn vec3_from_na(v: &Vector3<f64>) -> Vec3 {
    Vec3::new(v.x as f32, v.y as f32, v.z as f32)
}

pub fn quat_from_na(q: &UnitQuaternion<f64>) -> Quat {
    Quat::from_xyzw(q.i as f32, q.j as f32, q.k as f32, q.w as f32).normalize()
}

pub fn mat3_to_na(m: Mat3) -> Matrix3<f64> {
    let c = m.to_cols_array();
    Matrix3::from_column_slice(&c.map(|v| v as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_inertia_is_two_unit_cube() {
        let props = MassProperties::default();
        let expected = 8.0 / 12.0;
        assert!((props.inertia.x_axis.x - expected).abs() < 1e-6);
        assert!((props.inertia.z_axis.z - expected).abs() < 1e-6);
    }

    #[test]
    fn combine_applies_parent_rotation() {
        let parent = Transform::from_position_rotation(
            Vec3::new(1.0, 0.0, 0.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        );
        let child = Transform::from_position(Vec3::new(0.0, 0.0, 1.0));
        let world = parent.combine(&child);
        assert!((world.position - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn nalgebra_inertia_matches_glam_inertia() {
        let half_extents = Vec3::new(0.5, 0.2, 0.1);
        let glam_box = Mat3::for_solid_box(half_extents, 2.0);
        let na_box = Matrix3::<f64>::for_solid_box(half_extents, 2.0);
        for i in 0..3 {
            assert!((na_box[(i, i)] - glam_box.col(i)[i] as f64).abs() < 1e-6);
        }
        assert_eq!(na_box[(0, 1)], 0.0);

        let na_sphere = Matrix3::<f64>::for_solid_sphere(1.0, 5.0);
        assert!((na_sphere[(2, 2)] - 2.0).abs() < 1e-6);
    }
}
