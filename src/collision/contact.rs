use glam::Vec3;

use crate::config::{
    CONTACT_SEPARATION_EPSILON, MANIFOLD_CAPACITY, MANIFOLD_MAX_CONTACTS, PERSISTENT_THRESHOLD_SQ,
};
use crate::core::collider::Collider;
use crate::utils::allocator::EntityId;
use crate::utils::math::{sq_dist_point_line, sq_dist_point_triangle};

/// One contact point between colliders A and B. The normal points from A toward B.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Contact {
    pub global_position_a: Vec3,
    pub global_position_b: Vec3,
    /// Contact point in collider A's shape space.
    pub local_position_a: Vec3,
    pub local_position_b: Vec3,
    pub normal: Vec3,
    pub tangent1: Vec3,
    pub tangent2: Vec3,
    pub depth: f32,
    pub normal_impulse_sum: f32,
    pub tangent_impulse_sum1: f32,
    pub tangent_impulse_sum2: f32,
    /// Multipliers of the last solver sweep, reused to warm start the next tick.
    pub cached_normal_lambda: f32,
    pub cached_tangent_lambda1: f32,
    pub cached_tangent_lambda2: f32,
    pub lambda_cached: bool,
    pub persistent: bool,
    pub enable_warm_start: bool,
    pub collider_a: EntityId,
    pub collider_b: EntityId,
    pub body_a: EntityId,
    pub body_b: EntityId,
}

/// Up to four persistent contacts for one collider pair.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    contacts: [Contact; MANIFOLD_CAPACITY],
    len: usize,
    pub collider_a: EntityId,
    pub collider_b: EntityId,
}

impl ContactManifold {
    pub fn new(collider_a: EntityId, collider_b: EntityId) -> Self {
        Self {
            contacts: [Contact::default(); MANIFOLD_CAPACITY],
            len: 0,
            collider_a,
            collider_b,
        }
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts[..self.len]
    }

    pub fn contacts_mut(&mut self) -> &mut [Contact] {
        &mut self.contacts[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends a contact. Returns `false` when the scratch slot is already taken.
    pub fn add_contact(&mut self, contact: Contact) -> bool {
        if self.len >= MANIFOLD_CAPACITY {
            return false;
        }
        self.contacts[self.len] = contact;
        self.len += 1;
        true
    }

    /// Swap-removes the contact at `index`.
    pub fn remove_contact(&mut self, index: usize) {
        if index < self.len {
            self.contacts[index] = self.contacts[self.len - 1];
            self.len -= 1;
        }
    }

    /// Folds a freshly detected contact into the manifold.
    ///
    /// Cached contacts whose anchors separated or drifted are dropped first, the new point is
    /// discarded when it duplicates a survivor, and an overfull manifold is reduced to the four
    /// points spanning the largest area around the deepest one.
    pub fn merge_contact(&mut self, contact: Contact, collider_a: &Collider, collider_b: &Collider) {
        let mut i = 0;
        while i < self.len {
            let cached = &mut self.contacts[i];
            let anchor_a = collider_a.local_to_world(cached.local_position_a);
            let anchor_b = collider_b.local_to_world(cached.local_position_b);
            let drift_a = cached.global_position_a - anchor_a;
            let drift_b = cached.global_position_b - anchor_b;

            if cached.normal.dot(anchor_b - anchor_a) <= CONTACT_SEPARATION_EPSILON
                && drift_a.length_squared() < PERSISTENT_THRESHOLD_SQ
                && drift_b.length_squared() < PERSISTENT_THRESHOLD_SQ
            {
                cached.persistent = true;
                cached.depth = (anchor_a - anchor_b).dot(cached.normal);
                i += 1;
            } else {
                self.remove_contact(i);
            }
        }

        let duplicate = self.contacts().iter().any(|cached| {
            (contact.global_position_a - cached.global_position_a).length_squared()
                < PERSISTENT_THRESHOLD_SQ
        });
        if !duplicate {
            self.add_contact(contact);
        }

        if self.len > MANIFOLD_MAX_CONTACTS {
            self.reduce();
        }
    }

    fn reduce(&mut self) {
        let points = self.contacts();

        let deepest = points
            .iter()
            .enumerate()
            .fold(0, |best, (i, c)| if c.depth > points[best].depth { i } else { best });
        let origin = points[deepest].global_position_a;

        let farthest_from = |score: &dyn Fn(Vec3) -> f32| {
            points
                .iter()
                .enumerate()
                .map(|(i, c)| (i, score(c.global_position_a)))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best })
                .0
        };

        let first = farthest_from(&|p| (p - origin).length_squared());
        let line_end = points[first].global_position_a;
        let second = farthest_from(&|p| sq_dist_point_line(p, origin, line_end));
        let corner = points[second].global_position_a;

        let colinear = (line_end - origin).cross(corner - origin).length_squared() < 1e-4;
        let distinct = points.iter().position(|c| {
            let p = c.global_position_a;
            p != origin && p != line_end && p != corner
        });
        let third = match (colinear, distinct) {
            (true, Some(index)) => index,
            _ => farthest_from(&|p| sq_dist_point_triangle(p, origin, line_end, corner)),
        };

        // Degenerate layouts can pick the same point twice.
        let chosen = [deepest, first, second, third];
        let kept = chosen.map(|i| self.contacts[i]);
        self.clear();
        for (k, contact) in kept.into_iter().enumerate() {
            if !chosen[..k].contains(&chosen[k]) {
                self.add_contact(contact);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Transform;

    fn contact_at(x: f32, z: f32, depth: f32) -> Contact {
        let point = Vec3::new(x, 0.0, z);
        Contact {
            global_position_a: point,
            global_position_b: point,
            local_position_a: point,
            local_position_b: point,
            normal: Vec3::Y,
            depth,
            ..Contact::default()
        }
    }

    fn identity_colliders() -> (Collider, Collider) {
        let mut a = Collider::cuboid(Vec3::ONE);
        let mut b = Collider::cuboid(Vec3::ONE);
        a.update_transform(&Transform::default());
        b.update_transform(&Transform::default());
        (a, b)
    }

    #[test]
    fn overfull_manifold_keeps_deepest_four() {
        let (a, b) = identity_colliders();
        let mut manifold = ContactManifold::new(a.id, b.id);
        let incoming = [
            contact_at(0.0, 0.0, 0.01),
            contact_at(1.0, 0.0, 0.02),
            contact_at(0.0, 1.0, 0.03),
            contact_at(1.0, 1.0, 0.04),
            contact_at(0.5, 0.5, 0.30),
        ];
        for contact in incoming {
            manifold.merge_contact(contact, &a, &b);
        }

        assert_eq!(manifold.len(), MANIFOLD_MAX_CONTACTS);
        let deepest = manifold
            .contacts()
            .iter()
            .map(|c| c.depth)
            .fold(f32::MIN, f32::max);
        assert!((deepest - 0.30).abs() < 1e-6);
    }

    #[test]
    fn near_duplicate_contact_is_discarded() {
        let (a, b) = identity_colliders();
        let mut manifold = ContactManifold::new(a.id, b.id);
        manifold.merge_contact(contact_at(0.0, 0.0, 0.1), &a, &b);
        manifold.merge_contact(contact_at(0.01, 0.0, 0.1), &a, &b);
        assert_eq!(manifold.len(), 1);
        assert!(manifold.contacts()[0].persistent);
    }

    #[test]
    fn drifted_contact_is_dropped() {
        let (mut a, b) = identity_colliders();
        let mut manifold = ContactManifold::new(a.id, b.id);
        manifold.merge_contact(contact_at(0.0, 0.0, 0.1), &a, &b);

        a.update_transform(&Transform::from_position(Vec3::new(0.5, 0.0, 0.0)));
        manifold.merge_contact(contact_at(2.0, 0.0, 0.1), &a, &b);

        assert_eq!(manifold.len(), 1);
        assert_eq!(manifold.contacts()[0].global_position_a.x, 2.0);
    }

    #[test]
    fn colinear_overflow_keeps_each_point_once() {
        let (a, b) = identity_colliders();
        let mut manifold = ContactManifold::new(a.id, b.id);
        for x in [0.0, 1.0, 2.0, 3.0, 4.0] {
            manifold.merge_contact(contact_at(x, 0.0, 0.1), &a, &b);
        }

        assert_eq!(manifold.len(), 3);
        let points = manifold.contacts();
        for (i, first) in points.iter().enumerate() {
            for second in &points[i + 1..] {
                assert_ne!(first.global_position_a, second.global_position_a);
            }
        }
    }
}
