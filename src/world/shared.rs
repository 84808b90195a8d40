//! Handle for driving a world from one thread while others add or remove objects.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::PhysicsWorld;

/// Cloneable, lock-protected [`PhysicsWorld`]. A tick holds the lock for its whole duration.
#[derive(Clone, Default)]
pub struct SharedWorld {
    inner: Arc<Mutex<PhysicsWorld>>,
}

impl SharedWorld {
    pub fn new(world: PhysicsWorld) -> Self {
        Self {
            inner: Arc::new(Mutex::new(world)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, PhysicsWorld> {
        self.inner.lock()
    }

    /// Runs `f` with exclusive access to the world.
    pub fn with<R>(&self, f: impl FnOnce(&mut PhysicsWorld) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn tick(&self, dt: f32) {
        self.inner.lock().tick(dt);
    }
}
