//! Utility helpers: math extensions, rotation helpers, allocators and logging.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod rotation;

pub use allocator::{Arena, EntityId, GenerationalId};
pub use math::*;
