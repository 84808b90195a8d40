//! Forward kinematics, composite Jacobians and the generalized equations of motion.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector, Matrix3, Matrix6, Matrix6xX, UnitQuaternion, Vector3, Vector6};

use super::MultiBody;
use crate::config::{MASS_MATRIX_REGULARIZATION, MASS_MATRIX_SINGULAR_DET, MULTIBODY_GRAVITY};
use crate::core::articulations::JointType;
use crate::utils::rotation::RodriguesCoefficients;

fn stack(top: &Vector3<f64>, bottom: &Vector3<f64>) -> Vector6<f64> {
    Vector6::new(top.x, top.y, top.z, bottom.x, bottom.y, bottom.z)
}

impl MultiBody {
    /// Recomputes poses, Jacobians, link velocities and the generalized mass matrix from `q`
    /// and `qdot`.
    pub fn forward(&mut self) {
        if self.links.is_empty() {
            return;
        }
        self.update_kinematics();
        self.update_joint_jacobians();
        self.update_composite_jacobians();
        let qdot = self.qdot.clone();
        self.forward_velocities(&qdot);
        self.update_mass_matrix();
    }

    fn update_kinematics(&mut self) {
        for i in 0..self.links.len() {
            let parent = self.links[i].parent_idx.map(|p| {
                let link = &self.links[p];
                (link.global_ori, link.r_global, link.position)
            });
            let origin = self.origin;
            let q = &self.q;
            let link = &mut self.links[i];

            match link.joint_type {
                JointType::Ball3D => {
                    let r = q.fixed_rows::<3>(link.q_offset).into_owned();
                    link.rel_ori = UnitQuaternion::from_scaled_axis(r);
                }
                JointType::Hinge => {
                    link.rel_ori =
                        UnitQuaternion::from_scaled_axis(link.hinge_axis * q[link.q_offset]);
                }
                JointType::Ball4D | JointType::Free => {}
            }

            link.global_ori = match (link.joint_type, parent) {
                (JointType::Free, _) | (_, None) => link.rel_ori,
                (_, Some((parent_ori, _, _))) => parent_ori * link.rel_ori,
            };
            link.r_local = link.rel_ori.to_rotation_matrix().into_inner();
            link.r_global = link.global_ori.to_rotation_matrix().into_inner();

            let parent_r = parent.map_or_else(Matrix3::identity, |(_, r, _)| r);
            link.u_gc = link.r_global * link.child_offset;
            link.u_gp = parent_r * link.parent_offset;
            link.hinge_axis_global = link.r_global * link.hinge_axis;
            link.joint_position = parent.map_or(origin, |(_, _, position)| position + link.u_gp);

            link.position = match link.joint_type {
                JointType::Free => q.fixed_rows::<3>(link.q_offset).into_owned(),
                JointType::Hinge => {
                    link.joint_position + link.hinge_axis_global * link.hinge_magnitude - link.u_gc
                }
                JointType::Ball3D | JointType::Ball4D => link.joint_position - link.u_gc,
            };
            if link.joint_type == JointType::Free {
                link.joint_position = link.position + link.u_gc;
            }

            link.inertia = link.r_global * link.local_inertia * link.r_global.transpose();

            if link.joint_type == JointType::Ball4D {
                let rel = link.rel_ori;
                link.limit.cache_euler_angles(&rel);
            }
        }
    }

    /// Per-joint motion subspaces `H` and parent-to-child transfer matrices `D`.
    fn update_joint_jacobians(&mut self) {
        for i in 0..self.links.len() {
            let parent_r = self.links[i]
                .parent_idx
                .map_or_else(Matrix3::identity, |p| self.links[p].r_global);
            let q = &self.q;
            let link = &mut self.links[i];
            let u_c = link.u_gc.cross_matrix();

            match link.joint_type {
                JointType::Ball4D => {
                    link.h.fixed_view_mut::<3, 3>(0, 0).copy_from(&(u_c * parent_r));
                    link.h.fixed_view_mut::<3, 3>(3, 0).copy_from(&parent_r);
                }
                JointType::Ball3D => {
                    let r = q.fixed_rows::<3>(link.q_offset).into_owned();
                    let jacobian = RodriguesCoefficients::new(&r).jacobian(&r);
                    let a = parent_r * jacobian;
                    link.h.fixed_view_mut::<3, 3>(0, 0).copy_from(&(u_c * a));
                    link.h.fixed_view_mut::<3, 3>(3, 0).copy_from(&a);
                }
                JointType::Free => link.h.fill_with_identity(),
                JointType::Hinge => {
                    let axis = link.hinge_axis_global;
                    link.h.fixed_view_mut::<3, 1>(0, 0).copy_from(&(u_c * axis));
                    link.h.fixed_view_mut::<3, 1>(3, 0).copy_from(&axis);
                }
            }

            link.d = Matrix6::identity();
            if link.parent_idx.is_none() {
                continue;
            }
            let coupling = match link.joint_type {
                JointType::Ball3D | JointType::Ball4D => u_c - link.u_gp.cross_matrix(),
                JointType::Hinge => (link.u_gc
                    - link.u_gp
                    - link.hinge_axis_global * link.hinge_magnitude)
                    .cross_matrix(),
                JointType::Free => {
                    link.d = Matrix6::zeros();
                    continue;
                }
            };
            link.d.fixed_view_mut::<3, 3>(0, 3).copy_from(&coupling);
        }
    }

    /// `Ht[i]`: column block of each ancestor `k` is `D[i]·…·D[child of k]·H[k]`.
    fn update_composite_jacobians(&mut self) {
        for i in 0..self.links.len() {
            let mut ht = Matrix6xX::zeros(self.total_vel_dofs);
            let mut transfer = Matrix6::<f64>::identity();
            let mut cursor = Some(i);
            while let Some(k) = cursor {
                let link = &self.links[k];
                ht.view_mut((0, link.dq_offset), (6, link.h.ncols()))
                    .copy_from(&(transfer * &link.h));
                transfer *= link.d;
                cursor = link.parent_idx;
            }
            self.links[i].ht = ht;
        }
    }

    /// Link velocities `Ht·qdot` and the velocity-product accelerations `γ`, `γ_t` for the given
    /// generalized velocities. Poses and Jacobians are left untouched.
    pub(crate) fn forward_velocities(&mut self, qdot: &DVector<f64>) {
        for link in &mut self.links {
            link.velocity = &link.ht * qdot;
        }

        for i in 0..self.links.len() {
            let parent = self.links[i].parent_idx.map(|p| {
                let link = &self.links[p];
                (link.angular_velocity(), link.r_global)
            });
            let q = &self.q;
            let link = &mut self.links[i];
            let omega = link.angular_velocity();
            let offset = link.dq_offset;

            link.gamma = match link.joint_type {
                JointType::Free => Vector6::zeros(),
                JointType::Ball4D => {
                    let r_dot = qdot.fixed_rows::<3>(offset).into_owned();
                    let angular = parent.map_or_else(Vector3::zeros, |(omega_p, r_p)| {
                        omega_p.cross(&(r_p * r_dot))
                    });
                    let linear = link.u_gc.cross(&angular) - omega.cross(&omega.cross(&link.u_gc))
                        + parent.map_or_else(Vector3::zeros, |(omega_p, _)| {
                            omega_p.cross(&omega_p.cross(&link.u_gp))
                        });
                    stack(&linear, &angular)
                }
                JointType::Ball3D => {
                    let r = q.fixed_rows::<3>(link.q_offset).into_owned();
                    let r_dot = qdot.fixed_rows::<3>(offset).into_owned();
                    let coeffs = RodriguesCoefficients::new(&r);
                    let (a_dot, b_dot, c_dot) = coeffs.derivatives(&r, &r_dot);
                    let r_dot_r = r.dot(&r_dot);
                    let jacobian_dot_r_dot = r_dot * (coeffs.c * r_dot_r + a_dot)
                        - (r_dot * b_dot).cross(&r)
                        + r * (c_dot * r_dot_r + coeffs.c * r_dot.norm_squared());

                    let angular = match parent {
                        None => jacobian_dot_r_dot,
                        Some((omega_p, r_p)) => {
                            omega_p.cross(&(r_p * coeffs.jacobian(&r) * r_dot))
                                + r_p * jacobian_dot_r_dot
                        }
                    };
                    let linear = link.u_gc.cross(&angular) - omega.cross(&omega.cross(&link.u_gc))
                        + parent.map_or_else(Vector3::zeros, |(omega_p, _)| {
                            omega_p.cross(&omega_p.cross(&link.u_gp))
                        });
                    stack(&linear, &angular)
                }
                JointType::Hinge => {
                    let angle_rate = qdot[offset];
                    let lever = link.u_gp + link.hinge_axis_global * link.hinge_magnitude;
                    let angular = parent.map_or_else(Vector3::zeros, |(omega_p, _)| {
                        omega_p.cross(&(link.hinge_axis_global * angle_rate))
                    });
                    let linear = link.u_gc.cross(&angular) - omega.cross(&omega.cross(&link.u_gc))
                        + parent.map_or_else(Vector3::zeros, |(omega_p, _)| {
                            omega_p.cross(&omega_p.cross(&lever))
                        });
                    stack(&linear, &angular)
                }
            };
        }

        for i in 0..self.links.len() {
            let mut gamma_t = Vector6::zeros();
            let mut transfer = Matrix6::<f64>::identity();
            let mut cursor = Some(i);
            while let Some(k) = cursor {
                let link = &self.links[k];
                gamma_t += transfer * link.gamma;
                transfer *= link.d;
                cursor = link.parent_idx;
            }
            self.links[i].gamma_t = gamma_t;
        }
    }

    /// `Mr = Σ Htᵀ·M·Ht` and its inverse, regularized when close to singular.
    fn update_mass_matrix(&mut self) {
        let n = self.total_vel_dofs;
        let mut mass_matrix = DMatrix::zeros(n, n);
        for link in &self.links {
            mass_matrix += link.ht.transpose() * link.mass_block() * &link.ht;
        }

        let mut regularized = mass_matrix.clone();
        let determinant = mass_matrix.determinant();
        if determinant < MASS_MATRIX_SINGULAR_DET {
            self.singular_mass_events += 1;
            if self.singular_mass_events == 1 {
                warn!("generalized mass matrix is near singular (det = {determinant:e}); regularizing");
            } else {
                debug!(
                    "generalized mass matrix near singular again (det = {determinant:e}, event {})",
                    self.singular_mass_events
                );
            }
            let epsilon = (MASS_MATRIX_REGULARIZATION * mass_matrix.diagonal().amax()).max(1e-12);
            regularized += DMatrix::<f64>::identity(n, n) * epsilon;
        }

        self.mass_matrix_inverse = match regularized.clone().try_inverse() {
            Some(inverse) => inverse,
            None => regularized.pseudo_inverse(f64::EPSILON).unwrap_or_else(|err| {
                warn!("generalized mass matrix could not be inverted: {err}");
                DMatrix::zeros(n, n)
            }),
        };
        self.mass_matrix = mass_matrix;
    }

    /// `Qr = Σ Htᵀ (F_ext + F_gravity + F_gyro − M·γ_t)` at the current link velocities.
    pub(crate) fn generalized_force(&self) -> DVector<f64> {
        let mut force = DVector::zeros(self.total_vel_dofs);
        for link in &self.links {
            let mut wrench = link.external_force;
            if self.settings.gravity {
                wrench += stack(
                    &Vector3::new(0.0, -MULTIBODY_GRAVITY * link.mass, 0.0),
                    &Vector3::zeros(),
                );
            }
            let omega = link.angular_velocity();
            wrench += stack(&Vector3::zeros(), &-omega.cross(&(link.inertia * omega)));
            wrench -= link.mass_block() * link.gamma_t;
            force += link.ht.transpose() * wrench;
        }
        force
    }

    /// `Mr⁻¹·Qr`.
    pub(crate) fn generalized_acceleration(&self) -> DVector<f64> {
        &self.mass_matrix_inverse * self.generalized_force()
    }
}
