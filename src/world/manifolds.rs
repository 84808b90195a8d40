use crate::collision::{contact::Contact, contact::ContactManifold, narrowphase::NarrowPhase};
use crate::utils::allocator::EntityId;

use super::{ColliderPair, PhysicsWorld};

impl PhysicsWorld {
    /// Every collider pair whose bodies differ and are not both static, in ascending id order.
    fn collider_pairs(&self) -> Vec<ColliderPair> {
        let mut ids: Vec<EntityId> = self.colliders.ids().collect();
        ids.sort();

        let is_static = |collider: EntityId| {
            self.colliders
                .get(collider)
                .and_then(|c| self.bodies.get(c.rigidbody_id))
                .map_or(true, |body| body.is_static)
        };

        let mut pairs = Vec::new();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let (Some(ca), Some(cb)) = (self.colliders.get(a), self.colliders.get(b)) else {
                    continue;
                };
                if ca.rigidbody_id == cb.rigidbody_id || (is_static(a) && is_static(b)) {
                    continue;
                }
                pairs.push((a, b));
            }
        }
        pairs
    }

    fn collide_pair(&self, (a, b): ColliderPair) -> Option<Contact> {
        let collider_a = self.colliders.get(a)?;
        let collider_b = self.colliders.get(b)?;
        NarrowPhase::collide(collider_a, collider_b)
    }

    fn detect_contacts(&self, pairs: &[ColliderPair]) -> Vec<Option<Contact>> {
        #[cfg(feature = "parallel")]
        if self.parallel_enabled {
            use rayon::prelude::*;
            return pairs.par_iter().map(|&pair| self.collide_pair(pair)).collect();
        }
        pairs.iter().map(|&pair| self.collide_pair(pair)).collect()
    }

    /// All-pairs narrow phase: merges new contacts into existing manifolds, creates manifolds
    /// for new pairs and drops those whose pair stopped colliding.
    pub(crate) fn update_manifolds(&mut self) {
        self.prune_manifolds();
        let pairs = self.collider_pairs();
        let results = self.detect_contacts(&pairs);

        for (pair, result) in pairs.into_iter().zip(results) {
            match result {
                Some(contact) => {
                    let (Some(collider_a), Some(collider_b)) =
                        (self.colliders.get(pair.0), self.colliders.get(pair.1))
                    else {
                        continue;
                    };
                    self.manifolds
                        .entry(pair)
                        .or_insert_with(|| ContactManifold::new(pair.0, pair.1))
                        .merge_contact(contact, collider_a, collider_b);
                }
                None => {
                    self.manifolds.remove(&pair);
                }
            }
        }

        for body in self.bodies.values_mut() {
            body.collision = false;
        }
        for manifold in self.manifolds.values() {
            for contact in manifold.contacts() {
                for id in [contact.body_a, contact.body_b] {
                    if let Some(body) = self.bodies.get_mut(id) {
                        body.collision = true;
                    }
                }
            }
        }
    }

    /// Drops manifolds that reference removed colliders.
    pub(crate) fn prune_manifolds(&mut self) {
        let colliders = &self.colliders;
        self.manifolds
            .retain(|(a, b), _| colliders.contains(*a) && colliders.contains(*b));
    }

    pub fn manifolds(&self) -> impl Iterator<Item = &ContactManifold> + '_ {
        self.manifolds.values()
    }

    pub fn manifold_count(&self) -> usize {
        self.manifolds.len()
    }

    /// Manifold of a collider pair, in either order.
    pub fn manifold(&self, a: EntityId, b: EntityId) -> Option<&ContactManifold> {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.manifolds.get(&key)
    }

    /// Every manifold the collider takes part in.
    pub fn manifolds_for_collider(&self, collider: EntityId) -> Vec<&ContactManifold> {
        self.manifolds
            .iter()
            .filter(|((a, b), _)| *a == collider || *b == collider)
            .map(|(_, manifold)| manifold)
            .collect()
    }
}
