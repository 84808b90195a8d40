//! Tuning constants and the serde-configurable settings built from them.

use serde::{Deserialize, Serialize};

use crate::core::articulations::{IntegrationMethod, TwistMode};

/// Gravity acceleration given to bodies flagged `has_gravity` (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.8, 0.0];

/// Default fixed timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Wall-time budget of one tick before a warning is logged (in milliseconds).
pub const DEFAULT_TICK_BUDGET_MS: f32 = 16.0;

/// Impacts resolved per frame by the continuous path before the rest of the frame is skipped.
pub const CONTINUOUS_MAX_EVENTS: usize = 64;

/// Sequential-impulse sweeps per tick.
pub const DEFAULT_SOLVER_ITERATIONS: usize = 50;

/// Baumgarte factor for contact penetration.
pub const CONTACT_BAUMGARTE: f32 = 0.1;
/// Penetration allowed before positional correction kicks in.
pub const CONTACT_PENETRATION_SLOP: f32 = 0.001;
pub const CONTACT_RESTITUTION: f32 = 0.7;
/// Approach speed under which restitution is ignored.
pub const CONTACT_RESTITUTION_SLOP: f32 = 0.5;
/// Friction bound as a multiple of the accumulated normal impulse.
pub const CONTACT_FRICTION_RATIO: f32 = 50.0;
/// Weight of the cached multiplier when warm starting.
pub const WARM_START_BLEND: f32 = 0.8;

pub const POINT_JOINT_BAUMGARTE: f32 = 1.6;
pub const POINT_JOINT_DAMPING: f32 = 0.999;
pub const HINGE_BAUMGARTE: f32 = 1.0;

/// Contact slots per manifold; one more than the retained count to hold the incoming point.
pub const MANIFOLD_CAPACITY: usize = 5;
pub const MANIFOLD_MAX_CONTACTS: usize = 4;
/// Squared drift after which a cached contact point is dropped.
pub const PERSISTENT_THRESHOLD_SQ: f32 = 0.0025;
/// Separation along the normal after which a cached contact point is dropped.
pub const CONTACT_SEPARATION_EPSILON: f32 = 0.01;

pub const GJK_MAX_ITERATIONS: usize = 64;
pub const EPA_MAX_ITERATIONS: usize = 30;
pub const EPA_MAX_FACES: usize = 64;
pub const EPA_MAX_LOOSE_EDGES: usize = 32;
pub const EPA_TOLERANCE: f32 = 1e-4;

/// Gravity magnitude used by articulated bodies.
pub const MULTIBODY_GRAVITY: f64 = 9.8;
/// Gravity magnitude used for potential-energy diagnostics.
pub const POTENTIAL_GRAVITY: f64 = 9.81;
/// Determinant under which the generalized mass matrix is regularized.
pub const MASS_MATRIX_SINGULAR_DET: f64 = 1e-7;
/// Relative diagonal regularization applied to a singular mass matrix.
pub const MASS_MATRIX_REGULARIZATION: f64 = 1e-9;
/// Relative diagonal shift of the joint-limit effective mass.
pub const LIMIT_EFFECTIVE_MASS_SHIFT: f64 = 1e-6;
/// Fraction of joint-limit violation corrected by the position pass.
pub const LIMIT_POSITION_CORRECTION: f64 = 0.1;

/// Per-world tunables of the sequential impulse solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    pub iterations: usize,
    pub contact_baumgarte: f32,
    pub penetration_slop: f32,
    pub restitution: f32,
    pub restitution_slop: f32,
    pub friction_ratio: f32,
    pub warm_start: bool,
    pub warm_start_blend: f32,
    pub point_joint_baumgarte: f32,
    pub point_joint_damping: f32,
    pub hinge_baumgarte: f32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_SOLVER_ITERATIONS,
            contact_baumgarte: CONTACT_BAUMGARTE,
            penetration_slop: CONTACT_PENETRATION_SLOP,
            restitution: CONTACT_RESTITUTION,
            restitution_slop: CONTACT_RESTITUTION_SLOP,
            friction_ratio: CONTACT_FRICTION_RATIO,
            warm_start: true,
            warm_start_blend: WARM_START_BLEND,
            point_joint_baumgarte: POINT_JOINT_BAUMGARTE,
            point_joint_damping: POINT_JOINT_DAMPING,
            hinge_baumgarte: HINGE_BAUMGARTE,
        }
    }
}

/// Per-object tunables of an articulated body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiBodySettings {
    pub integration: IntegrationMethod,
    pub twist_mode: TwistMode,
    /// Multiplier applied to generalized velocities after each explicit step.
    pub damping: f64,
    pub gravity: bool,
    /// Runs the positional joint-limit correction after the velocity pass.
    pub position_solve: bool,
}

impl Default for MultiBodySettings {
    fn default() -> Self {
        Self {
            integration: IntegrationMethod::Explicit,
            twist_mode: TwistMode::Direct,
            damping: 1.0,
            gravity: false,
            position_solve: false,
        }
    }
}
