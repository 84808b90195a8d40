use super::types::Transform;
use crate::utils::allocator::EntityId;
use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

/// Convex geometries understood by the narrow phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
}

impl ColliderShape {
    pub fn bounding_radius(&self) -> f32 {
        match self {
            ColliderShape::Sphere { radius } => *radius,
            ColliderShape::Box { half_extents } => half_extents.length(),
        }
    }

    /// Half extents of the oriented box enclosing the shape.
    pub fn half_extents(&self) -> Vec3 {
        match self {
            ColliderShape::Sphere { radius } => Vec3::splat(*radius),
            ColliderShape::Box { half_extents } => *half_extents,
        }
    }

    /// Support vertices in shape space. Boxes list their 8 corners, spheres their center followed
    /// by a point on the surface.
    pub fn local_vertices(&self) -> Vec<Vec3> {
        match self {
            ColliderShape::Box { half_extents } => [
                (1.0, 1.0, 1.0),
                (1.0, 1.0, -1.0),
                (-1.0, 1.0, -1.0),
                (-1.0, 1.0, 1.0),
                (1.0, -1.0, 1.0),
                (1.0, -1.0, -1.0),
                (-1.0, -1.0, -1.0),
                (-1.0, -1.0, 1.0),
            ]
            .into_iter()
            .map(|(x, y, z)| *half_extents * Vec3::new(x, y, z))
            .collect(),
            ColliderShape::Sphere { radius } => vec![Vec3::ZERO, Vec3::new(*radius, 0.0, 0.0)],
        }
    }
}

/// Farthest point of a collider along a direction, in world and collider space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SupportPoint {
    pub global: Vec3,
    pub local: Vec3,
}

/// Collider attached to a rigid body. The body is referenced by handle, never owned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collider {
    pub id: EntityId,
    pub rigidbody_id: EntityId,
    pub shape: ColliderShape,
    /// Placement relative to the body frame.
    pub offset: Transform,
    vertices: Vec<Vec3>,
    world_transform: Transform,
}

impl Default for Collider {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Collider {
    pub fn new(shape: ColliderShape) -> Self {
        Self::builder().shape(shape).build()
    }

    pub fn sphere(radius: f32) -> Self {
        Self::new(ColliderShape::Sphere { radius })
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::new(ColliderShape::Box { half_extents })
    }

    pub fn builder() -> ColliderBuilder {
        ColliderBuilder::new()
    }

    pub fn attached_to(mut self, rigidbody_id: EntityId) -> Self {
        self.rigidbody_id = rigidbody_id;
        self
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// World transform cached by the last `update_transform`.
    pub fn world_transform(&self) -> &Transform {
        &self.world_transform
    }

    pub fn update_transform(&mut self, body_transform: &Transform) {
        self.world_transform = body_transform.combine(&self.offset);
    }

    pub fn local_to_world(&self, local: Vec3) -> Vec3 {
        self.world_transform.transform_point(local)
    }

    pub fn center(&self) -> Vec3 {
        self.world_transform.position
    }

    pub fn rotation_matrix(&self) -> Mat3 {
        self.world_transform.rotation_matrix()
    }

    pub fn bounding_radius(&self) -> f32 {
        self.shape.bounding_radius()
    }

    pub fn support(&self, direction: Vec3) -> SupportPoint {
        match self.shape {
            ColliderShape::Box { .. } => {
                let mut best = SupportPoint::default();
                let mut best_dist = f32::NEG_INFINITY;
                for &vertex in &self.vertices {
                    let global = self.local_to_world(vertex);
                    let dist = global.dot(direction);
                    if dist > best_dist {
                        best_dist = dist;
                        best = SupportPoint {
                            global,
                            local: vertex,
                        };
                    }
                }
                best
            }
            ColliderShape::Sphere { radius } => {
                let offset = direction.try_normalize().unwrap_or(Vec3::X) * radius;
                SupportPoint {
                    global: self.center() + offset,
                    local: self.world_transform.inverse_transform_vector(offset),
                }
            }
        }
    }
}

pub struct ColliderBuilder {
    shape: ColliderShape,
    offset: Transform,
    rigidbody_id: EntityId,
}

impl Default for ColliderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ColliderBuilder {
    pub fn new() -> Self {
        Self {
            shape: ColliderShape::Box {
                half_extents: Vec3::ONE,
            },
            offset: Transform::default(),
            rigidbody_id: EntityId::default(),
        }
    }

    pub fn shape(mut self, shape: ColliderShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn sphere(self, radius: f32) -> Self {
        self.shape(ColliderShape::Sphere { radius })
    }

    pub fn box_shape(self, half_extents: Vec3) -> Self {
        self.shape(ColliderShape::Box { half_extents })
    }

    pub fn offset(mut self, offset: Transform) -> Self {
        self.offset = offset;
        self
    }

    pub fn rigidbody(mut self, rigidbody_id: EntityId) -> Self {
        self.rigidbody_id = rigidbody_id;
        self
    }

    pub fn build(self) -> Collider {
        Collider {
            id: EntityId::default(),
            rigidbody_id: self.rigidbody_id,
            shape: self.shape,
            offset: self.offset,
            vertices: self.shape.local_vertices(),
            world_transform: self.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn box_support_picks_extreme_corner() {
        let mut collider = Collider::cuboid(Vec3::new(1.0, 2.0, 3.0));
        collider.update_transform(&Transform::from_position(Vec3::new(10.0, 0.0, 0.0)));
        let support = collider.support(Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(support.local, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(support.global, Vec3::new(11.0, 2.0, 3.0));
    }

    #[test]
    fn sphere_support_local_point_is_unrotated() {
        let mut collider = Collider::sphere(0.5);
        collider.update_transform(&Transform::from_position_rotation(
            Vec3::ZERO,
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
        ));
        let support = collider.support(Vec3::Y);
        assert!((support.global - Vec3::new(0.0, 0.5, 0.0)).length() < 1e-5);
        assert!((support.local - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-5);
    }
}
