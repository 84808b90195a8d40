use std::fmt;

use crate::core::articulations::JointType;
use crate::utils::allocator::EntityId;

/// Errors raised while assembling a simulation. Ticks themselves never fail.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// A link named a parent that does not precede it.
    InvalidParent { link: usize, parent: usize },
    /// A non-root link was added without a parent.
    MissingParent { link: usize },
    /// A link index outside the multibody.
    LinkOutOfRange { link: usize, len: usize },
    /// A joint operation was applied to a link of the wrong kind.
    JointKindMismatch {
        link: usize,
        expected: JointType,
        found: JointType,
    },
    /// A handle that no longer resolves to a live body or collider.
    StaleHandle(EntityId),
    /// The same body was named on both sides of a joint.
    SelfJoint(EntityId),
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicsError::InvalidParent { link, parent } => {
                write!(f, "link {link} cannot have parent {parent}; parents must precede children")
            }
            PhysicsError::MissingParent { link } => {
                write!(f, "link {link} needs a parent; only link 0 may be the root")
            }
            PhysicsError::LinkOutOfRange { link, len } => {
                write!(f, "link {link} is out of range for a multibody with {len} links")
            }
            PhysicsError::JointKindMismatch {
                link,
                expected,
                found,
            } => write!(f, "link {link} is a {found:?} joint, expected {expected:?}"),
            PhysicsError::StaleHandle(id) => write!(
                f,
                "handle {}:{} does not refer to a live object",
                id.index(),
                id.generation()
            ),
            PhysicsError::SelfJoint(id) => {
                write!(f, "body {} cannot be jointed to itself", id.index())
            }
        }
    }
}

impl std::error::Error for PhysicsError {}

pub type PhysicsResult<T> = Result<T, PhysicsError>;
