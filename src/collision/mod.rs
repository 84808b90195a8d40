//! Collision detection: GJK/EPA narrow phase, contact manifolds and swept tests.

pub mod ccd;
pub mod contact;
pub mod narrowphase;

pub use ccd::{CollisionPair, SweptBox};
pub use contact::{Contact, ContactManifold};
pub use narrowphase::{EPAAlgorithm, GJKAlgorithm, NarrowPhase, SupportResult};
