//! Simulation entities: rigid bodies, colliders, joints and articulation descriptions.

pub mod articulations;
pub mod collider;
pub mod constraints;
pub mod rigidbody;
pub mod types;

pub use articulations::{IntegrationMethod, JointType, LinkDesc, TwistMode};
pub use collider::{Collider, ColliderShape, SupportPoint};
pub use constraints::{HingeJoint, PointJoint};
pub use rigidbody::RigidBody;
pub use types::{InertiaTensorExt, MassProperties, Transform, Velocity};
