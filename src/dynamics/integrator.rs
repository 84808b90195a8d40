use std::f64::consts::{PI, TAU};

use log::debug;
use nalgebra::DVector;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::multibody::MultiBody;
use crate::core::articulations::{IntegrationMethod, JointType};
use crate::core::rigidbody::RigidBody;
use crate::utils::allocator::Arena;
use crate::utils::rotation::quat_integrate;

/// Explicit integration stages for rigid bodies.
#[derive(Debug, Clone, Default)]
pub struct Integrator {
    parallel: bool,
}

impl Integrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parallel(&mut self, enabled: bool) {
        self.parallel = enabled;
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Applies the stored acceleration to non-static bodies that take gravity.
    pub fn integrate_velocity(&self, body: &mut RigidBody, dt: f32) {
        if body.is_static || !body.has_gravity {
            return;
        }
        body.update_velocity(dt);
    }

    pub fn integrate_position(&self, body: &mut RigidBody, dt: f32) {
        if body.is_static {
            return;
        }
        body.update_position(dt);
        body.update_orientation(dt);
    }

    pub fn integrate_velocities(&self, bodies: &mut Arena<RigidBody>, dt: f32) {
        #[cfg(feature = "parallel")]
        if self.parallel {
            bodies
                .par_values_mut()
                .for_each(|body| self.integrate_velocity(body, dt));
            return;
        }
        for body in bodies.values_mut() {
            self.integrate_velocity(body, dt);
        }
    }

    pub fn integrate_positions(&self, bodies: &mut Arena<RigidBody>, dt: f32) {
        #[cfg(feature = "parallel")]
        if self.parallel {
            bodies
                .par_values_mut()
                .for_each(|body| self.integrate_position(body, dt));
            return;
        }
        for body in bodies.values_mut() {
            self.integrate_position(body, dt);
        }
    }
}

impl MultiBody {
    /// Advances the generalized state by `h` with the configured integration method.
    pub(crate) fn step(&mut self, h: f64) {
        self.dt = h;
        match self.settings.integration {
            IntegrationMethod::Explicit => {
                let qddot = self.generalized_acceleration();
                self.qdot += qddot * h;
                self.qdot *= self.settings.damping;
            }
            IntegrationMethod::Rk4 => self.rk4_velocity_update(h),
        }
        self.finish_step(h);
    }

    /// Classic RK4 on `qdot` with `Ht` and `Mr` frozen at the start of the step.
    fn rk4_velocity_update(&mut self, h: f64) {
        let start = self.qdot.clone();
        let k1 = self.generalized_acceleration();

        self.forward_velocities(&(&start + &k1 * (h * 0.5)));
        let k2 = self.generalized_acceleration();

        self.forward_velocities(&(&start + &k2 * (h * 0.5)));
        let k3 = self.generalized_acceleration();

        self.forward_velocities(&(&start + &k3 * h));
        let k4 = self.generalized_acceleration();

        self.qdot = start + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0);
    }

    fn finish_step(&mut self, h: f64) {
        self.check_joint_limits();
        self.solve_velocity_limits();
        if self.settings.position_solve {
            self.solve_position_limits();
        }
        let qdot = self.qdot.clone();
        self.integrate_q(&qdot, h);
        self.clamp_rotation_vectors();
        self.forward();
    }

    /// Advances `q` along generalized velocity `v` for time `h`.
    pub fn integrate_q(&mut self, v: &DVector<f64>, h: f64) {
        for i in 0..self.links.len() {
            let link = &mut self.links[i];
            let (q_offset, dq_offset) = (link.q_offset, link.dq_offset);
            match link.joint_type {
                JointType::Ball3D => {
                    let step = v.fixed_rows::<3>(dq_offset) * h;
                    let mut r = self.q.fixed_rows_mut::<3>(q_offset);
                    r += step;
                }
                JointType::Hinge => self.q[q_offset] += v[dq_offset] * h,
                JointType::Ball4D => {
                    let omega = v.fixed_rows::<3>(dq_offset).into_owned();
                    link.rel_ori = quat_integrate(&link.rel_ori, &omega, h);
                }
                JointType::Free => {
                    let step = v.fixed_rows::<3>(dq_offset) * h;
                    let mut position = self.q.fixed_rows_mut::<3>(q_offset);
                    position += step;
                    let omega = v.fixed_rows::<3>(dq_offset + 3).into_owned();
                    link.rel_ori = quat_integrate(&link.rel_ori, &omega, h);
                }
            }
            self.mirror_quaternion(i);
        }
    }

    /// Re-parameterizes rotation vectors past π to the equivalent shorter one.
    pub(crate) fn clamp_rotation_vectors(&mut self) {
        for (index, link) in self.links.iter().enumerate() {
            if link.joint_type != JointType::Ball3D {
                continue;
            }
            let r = self.q.fixed_rows::<3>(link.q_offset).into_owned();
            let theta = r.norm();
            if theta <= PI {
                continue;
            }
            let r_dot = self.qdot.fixed_rows::<3>(link.dq_offset).into_owned();
            let eta = 1.0 - TAU / theta;
            let new_r = r * eta;
            let new_r_dot = r_dot * eta + r * (TAU * r.dot(&r_dot) / theta.powi(3));
            self.q.fixed_rows_mut::<3>(link.q_offset).copy_from(&new_r);
            self.qdot.fixed_rows_mut::<3>(link.dq_offset).copy_from(&new_r_dot);
            debug!("link {index}: rotation vector re-parameterized (theta = {theta:.4})");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MultiBodySettings;
    use crate::core::articulations::LinkDesc;
    use approx::assert_relative_eq;
    use glam::Vec3;
    use nalgebra::{UnitQuaternion, Vector3};

    #[test]
    fn static_bodies_are_not_integrated() {
        let integrator = Integrator::new();
        let mut body = RigidBody::default().static_body().with_gravity(true);
        body.set_velocity(Vec3::X, Vec3::Y);
        body.acceleration = Vec3::new(0.0, -9.8, 0.0);

        integrator.integrate_velocity(&mut body, 0.1);
        integrator.integrate_position(&mut body, 0.1);
        assert_eq!(body.velocity.linear, Vec3::X);
        assert_eq!(body.transform.position, Vec3::ZERO);
    }

    #[test]
    fn velocity_stage_requires_gravity_flag() {
        let integrator = Integrator::new();
        let mut body = RigidBody::default();
        body.acceleration = Vec3::new(0.0, -9.8, 0.0);
        integrator.integrate_velocity(&mut body, 0.1);
        assert_eq!(body.velocity.linear, Vec3::ZERO);

        body.has_gravity = true;
        integrator.integrate_velocity(&mut body, 0.1);
        assert!((body.velocity.linear.y + 0.98).abs() < 1e-6);
    }

    #[test]
    fn rotation_vector_past_pi_keeps_orientation() {
        let mut body = MultiBody::from_links(
            Vector3::zeros(),
            MultiBodySettings::default(),
            [LinkDesc::ball_rotation_vector(None)],
        )
        .expect("single link");
        let axis = Vector3::new(0.2, -0.7, 0.4).normalize();
        let r = axis * 3.5;
        body.set_rotation_vector(0, r).expect("ball3d");
        body.set_joint_velocity(0, &[0.3, 0.1, -0.2]).expect("ball3d");
        let before = body.link_rotation(0).unwrap();
        let omega_before = body.link_angular_velocity(0).unwrap();

        body.clamp_rotation_vectors();
        body.forward();

        assert!(body.q().fixed_rows::<3>(0).norm() < PI);
        let after = body.link_rotation(0).unwrap();
        assert_relative_eq!(after.angle_to(&before), 0.0, epsilon = 1e-9);
        assert_relative_eq!(body.link_angular_velocity(0).unwrap(), omega_before, epsilon = 1e-9);
    }

    #[test]
    fn quaternion_joint_integrates_and_mirrors() {
        let mut body = MultiBody::from_links(
            Vector3::zeros(),
            MultiBodySettings::default(),
            [LinkDesc::ball(None)],
        )
        .expect("single link");
        let v = DVector::from_vec(vec![0.0, 0.0, 1.0]);
        body.integrate_q(&v, 0.5);
        body.forward();

        let expected = UnitQuaternion::from_scaled_axis(Vector3::new(0.0, 0.0, 0.5));
        let rotation = body.relative_rotation(0).unwrap();
        assert_relative_eq!(rotation.angle_to(&expected), 0.0, epsilon = 1e-12);
        assert_relative_eq!(body.q()[0], rotation.w, epsilon = 1e-15);
        assert_relative_eq!(body.q()[3], rotation.k, epsilon = 1e-15);
    }

    #[test]
    fn damping_applies_to_explicit_steps_only() {
        let speed_after_step = |integration| {
            let settings = MultiBodySettings {
                integration,
                damping: 0.5,
                gravity: false,
                ..MultiBodySettings::default()
            };
            let mut body =
                MultiBody::from_links(Vector3::zeros(), settings, [LinkDesc::free()]).expect("free link");
            body.set_joint_velocity(0, &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).expect("free link");
            body.step(0.01);
            body.qdot()[0]
        };

        assert_relative_eq!(speed_after_step(IntegrationMethod::Explicit), 0.5, epsilon = 1e-12);
        assert_relative_eq!(speed_after_step(IntegrationMethod::Rk4), 1.0, epsilon = 1e-12);
    }
}
