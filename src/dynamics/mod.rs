//! Simulation dynamics: rigid-body integration, the sequential impulse solver and articulated
//! multibodies with joint limits.

pub mod integrator;
pub mod joint_limit;
pub mod multibody;
pub mod scenario;
pub mod solver;

pub use integrator::Integrator;
pub use joint_limit::{JointLimit, LimitKind, LimitRow};
pub use multibody::{Link, MultiBody};
pub use scenario::{ConstantTorque, LinkTrace, Scenario};
pub use solver::{SequentialImpulseSolver, SolverStepMetrics};
