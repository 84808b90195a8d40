use super::rigidbody::RigidBody;
use crate::utils::allocator::EntityId;
use crate::utils::math::tangent_vector;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Pins a point on `body` to the position of `parent`, refreshed by the solver every sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointJoint {
    pub body: EntityId,
    pub parent: EntityId,
    pub anchor: Vec3,
    /// Attachment point in the body frame.
    pub extend: Vec3,
}

impl PointJoint {
    pub fn new(body: EntityId, parent: EntityId, parent_body: &RigidBody, extend: Vec3) -> Self {
        Self {
            body,
            parent,
            anchor: parent_body.position(),
            extend,
        }
    }

    pub fn attachment_point(&self, body: &RigidBody) -> Vec3 {
        body.transform.transform_point(self.extend)
    }

    /// Positional error `C = x + R·extend - anchor`.
    pub fn error(&self, body: &RigidBody) -> Vec3 {
        self.attachment_point(body) - self.anchor
    }
}

/// Revolute joint between two bodies, with an optional velocity motor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HingeJoint {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub local_anchor_a: Vec3,
    pub local_anchor_b: Vec3,
    pub local_axis_a: Vec3,
    pub local_axis_b: Vec3,
    /// Two unit vectors on body B perpendicular to its axis.
    pub local_basis_b: [Vec3; 2],
    /// Target angular speed of A relative to B around the hinge axis.
    pub motor_speed: Option<f32>,
}

impl HingeJoint {
    /// Builds the joint from a shared world pivot and axis, using the bodies' current poses.
    pub fn from_world(
        (body_a, a): (EntityId, &RigidBody),
        (body_b, b): (EntityId, &RigidBody),
        pivot: Vec3,
        axis: Vec3,
    ) -> Self {
        let axis = axis.try_normalize().unwrap_or(Vec3::Y);
        let local_axis_b = b.transform.inverse_transform_vector(axis);
        let basis_b1 = tangent_vector(local_axis_b);
        let basis_b2 = basis_b1.cross(local_axis_b).normalize();

        Self {
            body_a,
            body_b,
            local_anchor_a: a.transform.inverse_transform_vector(pivot - a.position()),
            local_anchor_b: b.transform.inverse_transform_vector(pivot - b.position()),
            local_axis_a: a.transform.inverse_transform_vector(axis),
            local_axis_b,
            local_basis_b: [basis_b1, basis_b2],
            motor_speed: None,
        }
    }

    pub fn with_motor(mut self, speed: f32) -> Self {
        self.motor_speed = Some(speed);
        self
    }

    /// World-space lever arms `(r1, r2)` from each body's center to the pivot.
    pub fn lever_arms(&self, a: &RigidBody, b: &RigidBody) -> (Vec3, Vec3) {
        (
            a.transform.rotation * self.local_anchor_a,
            b.transform.rotation * self.local_anchor_b,
        )
    }

    pub fn world_axes(&self, a: &RigidBody, b: &RigidBody) -> (Vec3, Vec3) {
        (
            a.transform.rotation * self.local_axis_a,
            b.transform.rotation * self.local_axis_b,
        )
    }

    pub fn world_basis_b(&self, b: &RigidBody) -> [Vec3; 2] {
        self.local_basis_b.map(|v| b.transform.rotation * v)
    }

    /// Pivot separation `x2 + r2 - x1 - r1`.
    pub fn anchor_error(&self, a: &RigidBody, b: &RigidBody) -> Vec3 {
        let (r1, r2) = self.lever_arms(a, b);
        b.position() + r2 - a.position() - r1
    }

    /// Misalignment of A's axis with B's hinge plane, `(a1·b2, a1·c2)`.
    pub fn axis_error(&self, a: &RigidBody, b: &RigidBody) -> (f32, f32) {
        let (axis_a, _) = self.world_axes(a, b);
        let [b2, c2] = self.world_basis_b(b);
        (axis_a.dot(b2), axis_a.dot(c2))
    }
}
