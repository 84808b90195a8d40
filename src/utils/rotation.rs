//! Double-precision rotation helpers for the articulated-body solver.
//!
//! Rotation vectors `r` encode `exp([r]×)`. The Rodrigues coefficients below switch to their Taylor
//! series near the identity so the Jacobians stay smooth through θ = 0.

use nalgebra::{Matrix3, Quaternion, Rotation3, Unit, UnitQuaternion, Vector3};

/// Below this angle the Rodrigues coefficients use their series expansion.
pub const SMALL_ANGLE: f64 = 1e-4;

/// Applies the rotation vector `omega * h` on the left of `q` and renormalizes.
pub fn quat_integrate(q: &UnitQuaternion<f64>, omega: &Vector3<f64>, h: f64) -> UnitQuaternion<f64> {
    let mut out = UnitQuaternion::from_scaled_axis(omega * h) * q;
    out.renormalize();
    out
}

/// Rotation vector (axis·angle, angle in [0, π]) of `q`.
pub fn rotation_vector(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    q.scaled_axis()
}

/// A unit vector perpendicular to `v`.
pub fn orthogonal_vector(v: &Vector3<f64>) -> Vector3<f64> {
    let candidate = if v.x.abs() >= 0.577_35 {
        Vector3::new(v.y, -v.x, 0.0)
    } else {
        Vector3::new(0.0, v.z, -v.y)
    };
    candidate.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::x)
}

/// Splits `q` into `(swing, twist)` with `q = swing * twist`, the twist being a rotation about
/// `twist_axis` and the swing's axis perpendicular to it.
pub fn swing_twist_decomposition(
    q: &UnitQuaternion<f64>,
    twist_axis: &Vector3<f64>,
) -> (UnitQuaternion<f64>, UnitQuaternion<f64>) {
    let axis = twist_axis.normalize();
    let imaginary = q.imag();
    let projected = axis * imaginary.dot(&axis);

    if q.w.abs() <= f64::EPSILON && projected.norm() <= f64::EPSILON {
        return (*q, UnitQuaternion::identity());
    }

    let twist = UnitQuaternion::from_quaternion(Quaternion::new(
        q.w,
        projected.x,
        projected.y,
        projected.z,
    ));
    let swing = q * twist.inverse();
    (swing, twist)
}

/// Euler angles of `q = Ry(α)·Rz(β)·Rx(γ)`, returned as `[γ, β, α]`.
pub fn quaternion_to_euler_yzx(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    let (w, x, y, z) = (q.w, q.i, q.j, q.k);
    let r11 = -2.0 * (x * z - w * y);
    let r12 = w * w + x * x - y * y - z * z;
    let r21 = 2.0 * (x * y + w * z);
    let r31 = -2.0 * (y * z - w * x);
    let r32 = w * w - x * x + y * y - z * z;

    Vector3::new(
        r31.atan2(r32),
        r21.clamp(-1.0, 1.0).asin(),
        r11.atan2(r12),
    )
}

/// Linear map taking the material frame `(m0, m1, m2)` onto `(w0, w1, w2)`.
pub fn deformation_gradient(
    m0: &Vector3<f64>,
    m1: &Vector3<f64>,
    m2: &Vector3<f64>,
    w0: &Vector3<f64>,
    w1: &Vector3<f64>,
    w2: &Vector3<f64>,
) -> Matrix3<f64> {
    let material = Matrix3::from_columns(&[*m0, *m1, *m2]);
    let world = Matrix3::from_columns(&[*w0, *w1, *w2]);
    material
        .try_inverse()
        .map(|inverse| world * inverse)
        .unwrap_or_else(Matrix3::identity)
}

/// Quaternion of a rotation matrix that may have drifted from orthonormal.
pub fn quat_from_matrix(m: &Matrix3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(m))
}

/// Rotation about `axis` by `angle`.
pub fn axis_angle(axis: &Vector3<f64>, angle: f64) -> Matrix3<f64> {
    match Unit::try_new(*axis, f64::EPSILON) {
        Some(unit) => Rotation3::from_axis_angle(&unit, angle).into_inner(),
        None => Matrix3::identity(),
    }
}

/// `a = sinθ/θ`, `b = (1-cosθ)/θ²`, `c = (1-a)/θ²` and `s = (1 - a/2b)/θ²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RodriguesCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub s: f64,
}

impl RodriguesCoefficients {
    pub fn new(r: &Vector3<f64>) -> Self {
        let theta = r.norm();
        let t2 = theta * theta;
        if theta < SMALL_ANGLE {
            return Self {
                a: 1.0 - t2 / 6.0,
                b: 0.5 - t2 / 24.0,
                c: 1.0 / 6.0 - t2 / 120.0,
                s: 1.0 / 12.0 + t2 / 720.0,
            };
        }
        let a = theta.sin() / theta;
        let b = (1.0 - theta.cos()) / t2;
        let c = (1.0 - a) / t2;
        let s = (1.0 - a / (2.0 * b)) / t2;
        Self { a, b, c, s }
    }

    /// Time derivatives `(ȧ, ḃ, ċ)` along `r_dot`.
    pub fn derivatives(&self, r: &Vector3<f64>, r_dot: &Vector3<f64>) -> (f64, f64, f64) {
        let theta = r.norm();
        let t2 = theta * theta;
        let r_dot_r = r.dot(r_dot);
        let a_dot = (self.c - self.b) * r_dot_r;
        if theta < SMALL_ANGLE {
            let b_dot = (-1.0 / 12.0 + t2 / 180.0) * r_dot_r;
            let c_dot = (-1.0 / 60.0 + t2 / 1260.0) * r_dot_r;
            return (a_dot, b_dot, c_dot);
        }
        let b_dot = (self.a - 2.0 * self.b) / t2 * r_dot_r;
        let c_dot = (self.b - 3.0 * self.c) / t2 * r_dot_r;
        (a_dot, b_dot, c_dot)
    }

    /// `J = I + b[r]× + c[r]×²`, mapping `ṙ` to angular velocity.
    pub fn jacobian(&self, r: &Vector3<f64>) -> Matrix3<f64> {
        let k = r.cross_matrix();
        Matrix3::identity() + k * self.b + k * k * self.c
    }

    /// `J⁻¹ = I - ½[r]× + s[r]×²`.
    pub fn inverse_jacobian(&self, r: &Vector3<f64>) -> Matrix3<f64> {
        let k = r.cross_matrix();
        Matrix3::identity() - k * 0.5 + k * k * self.s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_quat(rng: &mut StdRng) -> UnitQuaternion<f64> {
        let axis = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        let angle = rng.random_range(-3.1..3.1);
        UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), angle)
    }

    #[test]
    fn swing_twist_recomposes_random_rotations() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..128 {
            let q = random_quat(&mut rng);
            let axis = Vector3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(0.1..1.0),
            )
            .normalize();

            let (swing, twist) = swing_twist_decomposition(&q, &axis);
            let recomposed = swing * twist;
            let alignment = recomposed.coords.dot(&q.coords).abs();
            assert_relative_eq!(alignment, 1.0, epsilon = 1e-9);

            let twist_dir = twist.imag();
            assert!(twist_dir.cross(&axis).norm() < 1e-9);
            assert!(swing.imag().dot(&axis).abs() < 1e-9);
        }
    }

    #[test]
    fn yzx_euler_round_trip() {
        let (alpha, beta, gamma) = (0.7, -0.4, 1.1);
        let q = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), alpha)
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), beta)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), gamma);
        let euler = quaternion_to_euler_yzx(&q);
        assert_relative_eq!(euler[0], gamma, epsilon = 1e-9);
        assert_relative_eq!(euler[1], beta, epsilon = 1e-9);
        assert_relative_eq!(euler[2], alpha, epsilon = 1e-9);
    }

    #[test]
    fn rodrigues_series_is_continuous() {
        let dir = Vector3::new(0.3, -0.5, 0.8).normalize();
        let below = RodriguesCoefficients::new(&(dir * (SMALL_ANGLE * 0.999)));
        let above = RodriguesCoefficients::new(&(dir * (SMALL_ANGLE * 1.001)));
        assert_relative_eq!(below.a, above.a, epsilon = 1e-7);
        assert_relative_eq!(below.b, above.b, epsilon = 1e-7);
        assert_relative_eq!(below.c, above.c, epsilon = 1e-7);

        let r = dir * 0.9;
        let coeffs = RodriguesCoefficients::new(&r);
        let product = coeffs.jacobian(&r) * coeffs.inverse_jacobian(&r);
        assert_relative_eq!(product, Matrix3::identity(), epsilon = 1e-9);
    }

    #[test]
    fn deformation_gradient_maps_material_axes() {
        let ex = Vector3::new(0.0, -1.0, 0.0);
        let ey = Vector3::new(0.0, 0.0, 1.0);
        let ez = Vector3::new(-1.0, 0.0, 0.0);
        let f = deformation_gradient(&ey, &ez, &ex, &Vector3::y(), &Vector3::z(), &Vector3::x());
        assert_relative_eq!(f * ex, Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(f * ey, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(f.determinant(), 1.0, epsilon = 1e-12);
    }
}
