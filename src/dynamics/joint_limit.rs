//! Swing and twist limits for quaternion ball joints.
//!
//! Each violated limit becomes one row of a velocity-level complementarity problem on the
//! generalized velocities of the owning [`MultiBody`]. Rows are gathered by
//! [`MultiBody::check_joint_limits`], solved once per step with non-negative multipliers and
//! optionally pushed back to the position level.

use std::f64::consts::{FRAC_PI_2, PI};

use log::debug;
use nalgebra::{DMatrix, DVector, Matrix3, RowVector3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::multibody::MultiBody;
use crate::config::{LIMIT_EFFECTIVE_MASS_SHIFT, LIMIT_POSITION_CORRECTION};
use crate::core::articulations::{JointType, TwistMode};
use crate::utils::rotation::{
    deformation_gradient, orthogonal_vector, quat_from_matrix, quaternion_to_euler_yzx,
    rotation_vector, swing_twist_decomposition, RodriguesCoefficients,
};

/// Angles closer than this to a singular configuration are treated as singular.
pub const SINGULARITY_EPSILON: f64 = 1e-6;

/// Which measurement produced a constraint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitKind {
    Swing,
    TwistWithoutSwing,
    TwistWithSwing,
    TwistEuler,
    TwistEulerMax,
    TwistEulerMin,
    TwistIncrement,
    RotationMagnitude,
}

/// One violated limit: the link it belongs to and its (negative) error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitRow {
    pub link: usize,
    pub kind: LimitKind,
    pub error: f64,
}

/// Limit configuration and the bookkeeping the twist measurements need between steps.
#[derive(Debug, Clone, PartialEq)]
pub struct JointLimit {
    pub swing_range: Option<f64>,
    pub twist_range: Option<f64>,
    /// Bound on the magnitude of the joint's rotation vector.
    pub rotation_limit: Option<f64>,
    /// Twist axis in the parent frame.
    pub twist_axis: Vector3<f64>,
    pub euler_x: Vector3<f64>,
    pub euler_y: Vector3<f64>,
    pub euler_z: Vector3<f64>,
    /// Maps the joint's Euler axes onto the canonical yzx frame.
    pub decomposition_offset: UnitQuaternion<f64>,
    pub decomposition_offset_matrix: Matrix3<f64>,
    /// Selects the branch of the Euler construction once the elevation crosses ±90°.
    pub vector_field: bool,
    pub total_twist: f64,
    pub last_valid: UnitQuaternion<f64>,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Default for JointLimit {
    fn default() -> Self {
        let mut limit = Self {
            swing_range: None,
            twist_range: None,
            rotation_limit: None,
            twist_axis: Vector3::new(0.0, -1.0, 0.0),
            euler_x: Vector3::new(0.0, -1.0, 0.0),
            euler_y: Vector3::new(0.0, 0.0, 1.0),
            euler_z: Vector3::new(-1.0, 0.0, 0.0),
            decomposition_offset: UnitQuaternion::identity(),
            decomposition_offset_matrix: Matrix3::identity(),
            vector_field: false,
            total_twist: 0.0,
            last_valid: UnitQuaternion::identity(),
            alpha: 0.0,
            beta: 0.0,
            gamma: 0.0,
        };
        limit.refresh_decomposition_offset();
        limit
    }
}

impl JointLimit {
    /// Sets the Euler frame from its x (twist) and z axes, both in the parent frame.
    pub fn configure(
        &mut self,
        x_axis: Vector3<f64>,
        z_axis: Vector3<f64>,
        swing_range: Option<f64>,
        twist_range: Option<f64>,
    ) {
        self.euler_x = x_axis;
        self.euler_z = z_axis;
        self.euler_y = z_axis.cross(&x_axis).normalize();
        self.twist_axis = x_axis;
        self.swing_range = swing_range;
        self.twist_range = twist_range;
        self.refresh_decomposition_offset();
    }

    fn refresh_decomposition_offset(&mut self) {
        let offset = deformation_gradient(
            &self.euler_y,
            &self.euler_z,
            &self.euler_x,
            &Vector3::y(),
            &Vector3::z(),
            &Vector3::x(),
        );
        self.decomposition_offset_matrix = offset;
        self.decomposition_offset = quat_from_matrix(&offset);
    }

    /// yzx Euler angles `[γ, β, α]` of `rotation` expressed in the joint's Euler frame.
    pub fn euler_angles(&self, rotation: &UnitQuaternion<f64>) -> Vector3<f64> {
        let offset = self.decomposition_offset;
        quaternion_to_euler_yzx(&(offset * rotation * offset.inverse()))
    }

    pub fn cache_euler_angles(&mut self, rotation: &UnitQuaternion<f64>) {
        let angles = self.euler_angles(rotation);
        self.gamma = angles[0];
        self.beta = angles[1];
        self.alpha = angles[2];
    }

    /// `t·(R t) - cos(swing)`; negative once the swing exceeds its range.
    pub fn swing_error(&self, r_local: &Matrix3<f64>, swing_range: f64) -> f64 {
        self.twist_axis.dot(&(r_local * self.twist_axis)) - swing_range.cos()
    }

    /// Toggles the vector field when the predicted elevation leaves (-π/2, π/2).
    pub fn switch_constraint(&mut self, rotation: &UnitQuaternion<f64>) {
        if FRAC_PI_2 - self.beta.abs() <= SINGULARITY_EPSILON {
            debug!("joint rotation inside the Euler singular band (beta = {})", self.beta);
            return;
        }

        let step = rotation * self.last_valid.inverse();
        let delta = self.decomposition_offset_matrix * rotation_vector(&step);
        let previous = self.euler_angles(&self.last_valid);
        let (old_alpha, old_beta) = (previous[2], previous[1]);

        let predicted = old_beta + Vector3::new(old_alpha.sin(), 0.0, old_alpha.cos()).dot(&delta);
        if !(-FRAC_PI_2..=FRAC_PI_2).contains(&predicted) {
            self.vector_field = !self.vector_field;
            debug!("Euler vector field switched (predicted beta = {predicted})");
        }
        self.last_valid = *rotation;
    }

    fn euler_twist_normal(&self, r_local: &Matrix3<f64>) -> Vector3<f64> {
        let rotated_x = r_local * self.euler_x;
        if self.vector_field {
            self.euler_y.cross(&rotated_x)
        } else {
            rotated_x.cross(&self.euler_y)
        }
    }

    /// Twist error of the Euler-axis construction, or `None` at the swing singularity.
    pub fn euler_twist_error(&self, r_local: &Matrix3<f64>, twist_range: f64) -> Option<f64> {
        let s = self.euler_twist_normal(r_local);
        let norm = s.norm();
        if norm <= SINGULARITY_EPSILON {
            debug!("Euler twist normal degenerate (|s| = {norm})");
            return None;
        }
        Some((s / norm).dot(&(r_local * self.euler_z)) - twist_range.cos())
    }

    pub fn swing_jacobian(&self, r_local: &Matrix3<f64>) -> RowVector3<f64> {
        (r_local * self.twist_axis).cross(&self.twist_axis).transpose()
    }

    pub fn twist_direct_jacobian(&self, r_local: &Matrix3<f64>, kind: LimitKind) -> RowVector3<f64> {
        let t = self.twist_axis;
        if kind != LimitKind::TwistWithSwing {
            let p = orthogonal_vector(&t);
            return (r_local * p).cross(&p).transpose();
        }

        let t_rotated = r_local * t;
        let s = t.cross(&t_rotated);
        let s_sq = s.norm_squared();
        if s_sq * s_sq <= f64::EPSILON {
            return RowVector3::zeros();
        }
        let m = t.cross_matrix() * t_rotated.cross_matrix();
        let s_rotated = r_local * s;

        let t0 = -s_sq
            * (s_rotated.transpose() * m
                + s.transpose() * s_rotated.cross_matrix()
                + s.transpose() * r_local * m);
        let t1 = 2.0 * s.dot(&s_rotated) * s.transpose() * m;
        (t0 + t1) / (s_sq * s_sq)
    }

    pub fn twist_euler_jacobian(&self, r_local: &Matrix3<f64>) -> RowVector3<f64> {
        let (ex, ey, ez) = (self.euler_x, self.euler_y, self.euler_z);
        let ey_cross = ey.cross_matrix();

        let a0 = ex.transpose() * r_local.transpose() * (ey_cross * r_local * ez).cross_matrix();
        let a1 = -ex.transpose() * r_local.transpose() * ey_cross * (r_local * ez).cross_matrix();
        let s = -ey.cross(&(r_local * ex));
        let a2 = s.transpose() * ey_cross * (r_local * ex).cross_matrix();

        let norm = s.norm();
        if norm <= SINGULARITY_EPSILON {
            return RowVector3::zeros();
        }
        let jacobian = (a0 + a1) / norm - s.dot(&(r_local * ez)) / norm.powi(3) * a2;
        if self.vector_field {
            -jacobian
        } else {
            jacobian
        }
    }

    /// Gradient of the yzx twist angle γ, negated for the lower bound.
    pub fn twist_euler_v2_jacobian(&self, r_local: &Matrix3<f64>, upper: bool) -> RowVector3<f64> {
        let f = self.decomposition_offset_matrix;
        let r = f * r_local * f.transpose();
        let square = r[(1, 2)] * r[(1, 2)] + r[(1, 1)] * r[(1, 1)];
        if square <= f64::EPSILON {
            return RowVector3::zeros();
        }
        let j_yzx = RowVector3::new(
            (-r[(2, 2)] * r[(1, 1)] + r[(2, 1)] * r[(1, 2)]) / square,
            0.0,
            (r[(0, 2)] * r[(1, 1)] - r[(0, 1)] * r[(1, 2)]) / square,
        );
        let jacobian = j_yzx * f;
        if upper {
            jacobian
        } else {
            -jacobian
        }
    }
}

/// `-r̂ᵀ (I - ½[r]× + s[r]×²)` for a rotation vector `r`.
pub fn rotation_magnitude_jacobian(r: &Vector3<f64>) -> RowVector3<f64> {
    let theta = r.norm();
    if theta <= f64::EPSILON {
        return RowVector3::zeros();
    }
    let coeffs = RodriguesCoefficients::new(r);
    -(r / theta).transpose() * coeffs.inverse_jacobian(r)
}

impl MultiBody {
    /// Collects the violated limits of every quaternion ball joint into `limit_rows`.
    pub fn check_joint_limits(&mut self) {
        self.limit_rows.clear();
        let dt = self.dt;
        let twist_mode = self.settings.twist_mode;

        for (index, link) in self.links.iter_mut().enumerate() {
            if link.joint_type != JointType::Ball4D {
                continue;
            }
            let rotation = link.rel_ori;
            let r_local = link.r_local;
            let limit = &mut link.limit;
            let mut push = |kind, error| {
                self.limit_rows.push(LimitRow {
                    link: index,
                    kind,
                    error,
                })
            };

            if let Some(swing_range) = limit.swing_range {
                let error = limit.swing_error(&r_local, swing_range);
                if error < 0.0 {
                    push(LimitKind::Swing, error);
                }
            }

            if let Some(twist_range) = limit.twist_range {
                match twist_mode {
                    TwistMode::Direct => {
                        let (swing, twist) = swing_twist_decomposition(&rotation, &limit.twist_axis);
                        let twist_angle = rotation_vector(&twist).norm();
                        let swing_angle = rotation_vector(&swing).norm();
                        if twist_range - twist_angle < 0.0 {
                            let error = twist_angle.cos() - twist_range.cos();
                            let kind = if swing_angle < SINGULARITY_EPSILON
                                || (swing_angle - PI).abs() < SINGULARITY_EPSILON
                            {
                                LimitKind::TwistWithoutSwing
                            } else {
                                LimitKind::TwistWithSwing
                            };
                            push(kind, error);
                        }
                    }
                    TwistMode::Euler => {
                        limit.switch_constraint(&rotation);
                        if let Some(error) = limit.euler_twist_error(&r_local, twist_range) {
                            if error < 0.0 {
                                push(LimitKind::TwistEuler, error);
                            }
                        }
                    }
                    TwistMode::EulerV2 => {
                        limit.switch_constraint(&rotation);
                        if FRAC_PI_2 - limit.beta > SINGULARITY_EPSILON {
                            let gamma = match (limit.vector_field, limit.gamma >= 0.0) {
                                (false, _) => limit.gamma,
                                (true, true) => limit.gamma - PI,
                                (true, false) => limit.gamma + PI,
                            };
                            let upper = twist_range - gamma;
                            let lower = gamma + twist_range;
                            if upper < 0.0 {
                                push(LimitKind::TwistEulerMax, upper);
                            }
                            if lower < 0.0 {
                                push(LimitKind::TwistEulerMin, lower);
                            }
                        } else {
                            debug!("link {index}: Euler twist skipped near the singularity (beta = {})", limit.beta);
                        }
                    }
                    TwistMode::Increment => {
                        let axis = r_local * limit.twist_axis;
                        let omega = self.qdot.fixed_rows::<3>(link.dq_offset).into_owned();
                        limit.total_twist += axis.dot(&omega) * dt;
                        if limit.total_twist.abs() > twist_range {
                            limit.total_twist = if limit.total_twist > 0.0 {
                                twist_range - SINGULARITY_EPSILON
                            } else {
                                -twist_range + SINGULARITY_EPSILON
                            };
                            push(LimitKind::TwistIncrement, 0.0);
                        }
                    }
                }
            }

            if let Some(rotation_limit) = limit.rotation_limit {
                let magnitude = rotation_vector(&rotation).norm();
                if rotation_limit - magnitude < 0.0 {
                    push(LimitKind::RotationMagnitude, rotation_limit - magnitude);
                }
            }
        }
    }

    fn limit_jacobian_row(&self, row: &LimitRow) -> RowVector3<f64> {
        let link = &self.links[row.link];
        let r_local = &link.r_local;
        let limit = &link.limit;
        match row.kind {
            LimitKind::Swing => limit.swing_jacobian(r_local),
            LimitKind::TwistWithSwing | LimitKind::TwistWithoutSwing => {
                limit.twist_direct_jacobian(r_local, row.kind)
            }
            LimitKind::TwistEuler => limit.twist_euler_jacobian(r_local),
            LimitKind::TwistEulerMax => limit.twist_euler_v2_jacobian(r_local, true),
            LimitKind::TwistEulerMin => limit.twist_euler_v2_jacobian(r_local, false),
            LimitKind::TwistIncrement => {
                let axis = r_local * limit.twist_axis;
                let omega = self.qdot.fixed_rows::<3>(link.dq_offset);
                if axis.dot(&omega) > 0.0 {
                    -axis.transpose()
                } else {
                    axis.transpose()
                }
            }
            LimitKind::RotationMagnitude => rotation_magnitude_jacobian(&rotation_vector(&link.rel_ori)),
        }
    }

    /// One regularized solve of `J Mr⁻¹ Jᵀ λ = -J q̇` with `λ ≥ 0`, applied to `qdot`.
    pub fn solve_velocity_limits(&mut self) {
        if self.limit_rows.is_empty() {
            return;
        }

        let rows = self.limit_rows.len();
        let mut jacobian = DMatrix::zeros(rows, self.total_vel_dofs);
        for (k, row) in self.limit_rows.iter().enumerate() {
            let offset = self.links[row.link].dq_offset;
            jacobian
                .fixed_view_mut::<1, 3>(k, offset)
                .copy_from(&self.limit_jacobian_row(row));
        }

        let coupling = &jacobian * &self.mass_matrix_inverse * jacobian.transpose();
        let shift = coupling.max().abs() * LIMIT_EFFECTIVE_MASS_SHIFT;
        let Some(effective_mass) = (coupling + DMatrix::identity(rows, rows) * shift).try_inverse()
        else {
            debug!("joint-limit effective mass is singular; {rows} rows skipped");
            self.limit_rows.clear();
            return;
        };

        let lambda = (&effective_mass * -(&jacobian * &self.qdot)).map(|l| l.max(0.0));
        self.qdot += &self.mass_matrix_inverse * jacobian.transpose() * lambda;

        self.limit_jacobian = jacobian;
        self.limit_effective_mass = effective_mass;
    }

    /// Pushes a fraction of each violation back into `q` along the same Jacobian.
    pub fn solve_position_limits(&mut self) {
        if self.limit_rows.is_empty() || self.limit_jacobian.nrows() != self.limit_rows.len() {
            return;
        }

        let error = DVector::from_iterator(
            self.limit_rows.len(),
            self.limit_rows
                .iter()
                .map(|row| LIMIT_POSITION_CORRECTION * (-row.error).max(0.0)),
        );
        let lambda = &self.limit_effective_mass * error;
        let correction = &self.mass_matrix_inverse * self.limit_jacobian.transpose() * lambda;
        self.integrate_q(&correction, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rotation(axis: Vector3<f64>, angle: f64) -> Matrix3<f64> {
        UnitQuaternion::from_scaled_axis(axis.normalize() * angle).to_rotation_matrix().into_inner()
    }

    #[test]
    fn swing_error_changes_sign_at_range() {
        let limit = JointLimit::default();
        let inside = rotation(Vector3::x(), 0.2);
        let outside = rotation(Vector3::x(), 0.6);
        assert!(limit.swing_error(&inside, 0.4) > 0.0);
        assert!(limit.swing_error(&outside, 0.4) < 0.0);
    }

    #[test]
    fn swing_jacobian_matches_finite_difference() {
        let limit = JointLimit::default();
        let r = rotation(Vector3::new(1.0, 0.2, 0.3), 0.7);
        let jacobian = limit.swing_jacobian(&r);

        let h = 1e-6;
        for axis in [Vector3::x(), Vector3::y(), Vector3::z()] {
            let perturbed = rotation(axis, h) * r;
            let numeric = (limit.swing_error(&perturbed, 0.0) - limit.swing_error(&r, 0.0)) / h;
            assert_relative_eq!(numeric, jacobian.dot(&axis.transpose()), epsilon = 1e-5);
        }
    }

    #[test]
    fn euler_twist_jacobian_matches_finite_difference() {
        for vector_field in [false, true] {
            let limit = JointLimit {
                vector_field,
                ..JointLimit::default()
            };
            let r = rotation(Vector3::new(0.3, 1.0, 0.2), 0.5);
            let jacobian = limit.twist_euler_jacobian(&r);
            let error = |m: &Matrix3<f64>| limit.euler_twist_error(m, 0.0).expect("away from the singularity");

            let h = 1e-6;
            for axis in [Vector3::x(), Vector3::y(), Vector3::z()] {
                let numeric =
                    (error(&(rotation(axis, h) * r)) - error(&(rotation(axis, -h) * r))) / (2.0 * h);
                assert_relative_eq!(numeric, jacobian.dot(&axis.transpose()), epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn euler_v2_jacobian_matches_finite_difference() {
        let limit = JointLimit::default();
        let q = UnitQuaternion::from_scaled_axis(Vector3::new(0.2, -0.6, 0.3));
        let r = q.to_rotation_matrix().into_inner();
        let upper = limit.twist_euler_v2_jacobian(&r, true);
        let lower = limit.twist_euler_v2_jacobian(&r, false);
        let gamma = |rot: &UnitQuaternion<f64>| limit.euler_angles(rot)[0];

        let h = 1e-6;
        for axis in [Vector3::x(), Vector3::y(), Vector3::z()] {
            let plus = UnitQuaternion::from_scaled_axis(axis * h) * q;
            let minus = UnitQuaternion::from_scaled_axis(axis * -h) * q;
            let d_gamma = (gamma(&plus) - gamma(&minus)) / (2.0 * h);
            // Upper row error is range - γ, lower row error is γ + range.
            assert_relative_eq!(-d_gamma, upper.dot(&axis.transpose()), epsilon = 1e-6);
            assert_relative_eq!(d_gamma, lower.dot(&axis.transpose()), epsilon = 1e-6);
        }
    }

    #[test]
    fn configure_builds_right_handed_euler_frame() {
        let mut limit = JointLimit::default();
        limit.configure(Vector3::new(0.0, -1.0, 0.0), Vector3::new(-1.0, 0.0, 0.0), None, Some(0.5));
        assert_relative_eq!(limit.euler_y, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(limit.decomposition_offset_matrix * limit.euler_x, Vector3::x(), epsilon = 1e-12);
        assert_eq!(limit.twist_range, Some(0.5));
    }

    #[test]
    fn twist_about_axis_reads_as_gamma() {
        let limit = JointLimit::default();
        let q = UnitQuaternion::from_scaled_axis(limit.twist_axis * 0.3);
        let angles = limit.euler_angles(&q);
        assert_relative_eq!(angles[0], 0.3, epsilon = 1e-9);
        assert_relative_eq!(angles[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn rotation_magnitude_jacobian_reduces_angle() {
        let r = Vector3::new(0.4, -0.2, 0.9);
        let jacobian = rotation_magnitude_jacobian(&r);
        // Angular velocity along the rotation axis grows |r|, so the error limit - |r| falls.
        assert!(jacobian.dot(&r.normalize().transpose()) < 0.0);
    }
}
