//! Descriptions of articulated-body joints and links.
//!
//! A multibody is assembled from [`LinkDesc`] values in parent-first order; the runtime state lives
//! in [`crate::dynamics::multibody`].

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use super::types::InertiaTensorExt;

/// Joint connecting a link to its parent (or to the world for the root).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    /// Spherical joint parameterized by a rotation vector.
    Ball3D,
    /// Spherical joint parameterized by a quaternion.
    Ball4D,
    /// Unconstrained 6-DOF joint (position + quaternion).
    Free,
    /// Single rotational DOF about a fixed axis.
    Hinge,
}

impl JointType {
    /// Generalized coordinates the joint occupies in `q`.
    pub fn pos_dofs(&self) -> usize {
        match self {
            JointType::Ball3D => 3,
            JointType::Ball4D => 4,
            JointType::Free => 7,
            JointType::Hinge => 1,
        }
    }

    /// Generalized velocities the joint occupies in `qdot`.
    pub fn vel_dofs(&self) -> usize {
        match self {
            JointType::Ball3D | JointType::Ball4D => 3,
            JointType::Free => 6,
            JointType::Hinge => 1,
        }
    }

    /// Whether the orientation lives in a quaternion rather than in `q`.
    pub fn uses_quaternion(&self) -> bool {
        matches!(self, JointType::Ball4D | JointType::Free)
    }
}

/// How the twist part of a ball-joint limit is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TwistMode {
    /// Swing-twist decomposition of the joint rotation.
    #[default]
    Direct,
    /// Euler-axis construction with a switchable vector field.
    Euler,
    /// yzx Euler angle γ with upper and lower rows.
    EulerV2,
    /// Twist accumulated from angular velocity.
    Increment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IntegrationMethod {
    #[default]
    Explicit,
    Rk4,
}

/// Construction parameters for one link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDesc {
    pub joint: JointType,
    pub parent: Option<usize>,
    pub mass: f64,
    /// Body-frame inertia about the center of mass.
    pub inertia: Matrix3<f64>,
    /// From the link's center of mass to its inbound joint, in the link frame.
    pub child_offset: Vector3<f64>,
    /// From the parent's center of mass to the joint, in the parent frame.
    pub parent_offset: Vector3<f64>,
    pub hinge_axis: Vector3<f64>,
    /// Constant slide along the hinge axis between the joint and the link.
    pub hinge_magnitude: f64,
}

impl LinkDesc {
    pub fn new(joint: JointType, parent: Option<usize>) -> Self {
        Self {
            joint,
            parent,
            mass: 1.0,
            inertia: Matrix3::<f64>::for_solid_box(glam::Vec3::ONE, 1.0),
            child_offset: Vector3::zeros(),
            parent_offset: Vector3::zeros(),
            hinge_axis: Vector3::z(),
            hinge_magnitude: 0.0,
        }
    }

    pub fn ball(parent: Option<usize>) -> Self {
        Self::new(JointType::Ball4D, parent)
    }

    pub fn ball_rotation_vector(parent: Option<usize>) -> Self {
        Self::new(JointType::Ball3D, parent)
    }

    pub fn hinge(parent: Option<usize>, axis: Vector3<f64>) -> Self {
        Self {
            hinge_axis: axis.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::z),
            ..Self::new(JointType::Hinge, parent)
        }
    }

    pub fn free() -> Self {
        Self::new(JointType::Free, None)
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_inertia(mut self, inertia: Matrix3<f64>) -> Self {
        self.inertia = inertia;
        self
    }

    /// Mass and solid-box inertia from half extents.
    pub fn with_box(mut self, half_extents: Vector3<f64>, mass: f64) -> Self {
        let size = half_extents * 2.0;
        let factor = mass / 12.0;
        self.mass = mass;
        self.inertia = Matrix3::from_diagonal(&Vector3::new(
            factor * (size.y * size.y + size.z * size.z),
            factor * (size.x * size.x + size.z * size.z),
            factor * (size.x * size.x + size.y * size.y),
        ));
        self
    }

    pub fn with_offsets(mut self, child_offset: Vector3<f64>, parent_offset: Vector3<f64>) -> Self {
        self.child_offset = child_offset;
        self.parent_offset = parent_offset;
        self
    }

    pub fn with_hinge_magnitude(mut self, magnitude: f64) -> Self {
        self.hinge_magnitude = magnitude;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dof_counts_match_parameterization() {
        assert_eq!(JointType::Ball4D.pos_dofs(), 4);
        assert_eq!(JointType::Ball4D.vel_dofs(), 3);
        assert_eq!(JointType::Free.pos_dofs(), 7);
        assert_eq!(JointType::Free.vel_dofs(), 6);
        assert_eq!(JointType::Hinge.vel_dofs(), 1);
        assert_eq!(JointType::Ball3D.pos_dofs(), 3);
    }

    #[test]
    fn hinge_axis_is_normalized() {
        let desc = LinkDesc::hinge(None, Vector3::new(0.0, 0.0, 4.0));
        assert!((desc.hinge_axis.norm() - 1.0).abs() < 1e-12);
    }
}
