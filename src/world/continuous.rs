//! Continuous point-mass path: bodies move on straight lines, are stopped at the earliest impact
//! and bounce elastically.

use glam::Vec3;
use log::warn;

use crate::collision::ccd::{overlaps, time_of_impact, CollisionPair, SweptBox};
use crate::config::CONTINUOUS_MAX_EVENTS;
use crate::utils::allocator::EntityId;
use crate::utils::logging::ScopedTimer;

use super::PhysicsWorld;

impl PhysicsWorld {
    /// Oriented box of the body's first collider, swept with the body's linear velocity.
    fn swept_box(&self, body_id: EntityId) -> Option<SweptBox> {
        let body = self.bodies.get(body_id)?;
        let collider = self
            .colliders
            .values()
            .find(|collider| collider.rigidbody_id == body_id)?;
        let transform = collider.world_transform();
        Some(SweptBox::new(
            transform.position,
            transform.rotation,
            collider.shape.half_extents(),
            if body.is_static {
                Vec3::ZERO
            } else {
                body.velocity.linear
            },
        ))
    }

    /// Advances a frame of `frame_time`, stopping at every impact to reflect the velocities.
    pub fn physics_update(&mut self, frame_time: f32) {
        let _timer = ScopedTimer::new("physics::continuous");
        self.update_collider_transforms();

        let mut remaining = frame_time;
        let mut events = 0;
        while remaining > 0.0 {
            if events == CONTINUOUS_MAX_EVENTS {
                warn!("{events} impacts in one frame; moving through the remaining {remaining} s");
                self.move_objects_forward(remaining);
                break;
            }
            match self.find_earliest_collision(remaining) {
                Some(pair) => {
                    self.move_objects_forward(pair.time);
                    self.resolve_collision(&pair);
                    remaining -= pair.time;
                    events += 1;
                }
                None => {
                    self.move_objects_forward(remaining);
                    break;
                }
            }
        }

        let ids: Vec<EntityId> = self.bodies.ids().collect();
        for id in ids {
            let rotation_blocked = self.find_rotation_collision(id, frame_time);
            if let Some(body) = self.bodies.get_mut(id) {
                if body.is_static {
                    continue;
                }
                body.update_velocity(frame_time);
                if !rotation_blocked {
                    body.update_orientation(frame_time);
                }
            }
        }
        self.update_collider_transforms();
    }

    /// Translates every non-static body along its velocity for `time`.
    pub fn move_objects_forward(&mut self, time: f32) {
        for body in self.bodies.values_mut() {
            if !body.is_static {
                body.update_position(time);
            }
        }
        self.update_collider_transforms();
    }

    /// Reflects both velocities about the impact normal: `v' = |−2 v·n| n + v`.
    pub fn resolve_collision(&mut self, pair: &CollisionPair) {
        let [a, b] = pair.bodies;
        for (id, normal) in [(a, pair.normal_for_a), (b, -pair.normal_for_a)] {
            if let Some(body) = self.bodies.get_mut(id) {
                if body.is_static {
                    continue;
                }
                let v = body.velocity.linear;
                body.velocity.linear = (-2.0 * v.dot(normal)).abs() * normal + v;
            }
        }
    }

    /// Earliest approaching impact within `horizon` over all body pairs.
    pub fn find_earliest_collision(&self, horizon: f32) -> Option<CollisionPair> {
        let boxes: Vec<(EntityId, SweptBox, bool)> = self
            .bodies
            .iter()
            .filter_map(|(id, body)| Some((id, self.swept_box(id)?, body.is_static)))
            .collect();

        let mut earliest: Option<CollisionPair> = None;
        for (i, (id_a, box_a, static_a)) in boxes.iter().enumerate() {
            for (id_b, box_b, static_b) in &boxes[i + 1..] {
                if *static_a && *static_b {
                    continue;
                }
                let Some((time, normal_for_a)) = time_of_impact(box_a, box_b, horizon) else {
                    continue;
                };
                if earliest.as_ref().map_or(true, |pair| time < pair.time) {
                    earliest = Some(CollisionPair {
                        time,
                        normal_for_a,
                        bodies: [*id_a, *id_b],
                    });
                }
            }
        }
        earliest
    }

    /// Whether rotating the body by its angular velocity for `dt` would make it overlap another.
    pub fn find_rotation_collision(&self, body_id: EntityId, dt: f32) -> bool {
        let Some(body) = self.bodies.get(body_id) else {
            return false;
        };
        if body.is_static || body.velocity.angular.length_squared() <= f32::EPSILON {
            return false;
        }
        let Some(current) = self.swept_box(body_id) else {
            return false;
        };

        let spin = body.predict_future_orientation(dt) * body.transform.rotation.inverse();
        let rotated = SweptBox {
            axes: current.axes.map(|axis| spin * axis),
            ..current
        };

        self.bodies
            .ids()
            .filter(|&other| other != body_id)
            .filter_map(|other| self.swept_box(other))
            .any(|other| overlaps(&rotated, &other))
    }
}
