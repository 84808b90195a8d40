use glam::{Mat3, Vec3};
use log::{debug, warn};
use nalgebra::{Matrix3, SMatrix, SVector};

use crate::{
    collision::contact::{Contact, ContactManifold},
    config::SolverSettings,
    core::{
        constraints::{HingeJoint, PointJoint},
        rigidbody::RigidBody,
    },
    utils::{allocator::Arena, math::skew},
};

type HingeJacobian = SMatrix<f32, 5, 12>;
type HingeInverseMass = SMatrix<f32, 12, 12>;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SolverStepMetrics {
    pub contacts_solved: usize,
    pub joints_solved: usize,
    pub normal_impulse_sum: f32,
    pub tangent_impulse_sum: f32,
}

impl SolverStepMetrics {
    fn record_contacts(&mut self, contacts: &[Contact]) {
        self.contacts_solved += contacts.len();
        for contact in contacts {
            self.normal_impulse_sum += contact.normal_impulse_sum.abs();
            self.tangent_impulse_sum +=
                contact.tangent_impulse_sum1.hypot(contact.tangent_impulse_sum2);
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.contacts_solved += other.contacts_solved;
        self.joints_solved += other.joints_solved;
        self.normal_impulse_sum += other.normal_impulse_sum;
        self.tangent_impulse_sum += other.tangent_impulse_sum;
    }
}

/// Which accumulator and cache slot a contact row works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContactRow {
    Normal,
    Tangent1,
    Tangent2,
}

/// Fixed-iteration sequential impulse solver over contacts, point joints and hinges.
#[derive(Debug, Clone, Default)]
pub struct SequentialImpulseSolver {
    pub settings: SolverSettings,
}

impl SequentialImpulseSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    /// Runs `settings.iterations` sweeps. Each sweep visits contacts, then point joints, then hinges.
    pub fn solve(
        &self,
        bodies: &mut Arena<RigidBody>,
        manifolds: &mut [&mut ContactManifold],
        point_joints: &mut [PointJoint],
        hinge_joints: &[HingeJoint],
        dt: f32,
    ) -> SolverStepMetrics {
        let mut metrics = SolverStepMetrics::default();
        if dt <= 0.0 {
            return metrics;
        }

        let iterations = self.settings.iterations;
        for k in 0..iterations {
            for manifold in manifolds.iter_mut() {
                for contact in manifold.contacts_mut() {
                    self.solve_contact(bodies, contact, k, dt);
                }
            }
            for joint in point_joints.iter_mut() {
                self.solve_point_joint(bodies, joint, dt);
            }
            for joint in hinge_joints {
                self.solve_hinge(bodies, joint, dt);
            }
        }

        for manifold in manifolds.iter() {
            metrics.record_contacts(manifold.contacts());
        }
        metrics.joints_solved = point_joints.len() + hinge_joints.len();
        metrics
    }

    /// Normal row followed by the two friction rows of one contact point.
    pub fn solve_contact(
        &self,
        bodies: &mut Arena<RigidBody>,
        contact: &mut Contact,
        k: usize,
        dt: f32,
    ) {
        let Some((body_a, body_b)) = bodies.get2_mut(contact.body_a, contact.body_b) else {
            return;
        };

        if k == 0 {
            contact.normal_impulse_sum = 0.0;
            contact.tangent_impulse_sum1 = 0.0;
            contact.tangent_impulse_sum2 = 0.0;
        }

        for row in [ContactRow::Normal, ContactRow::Tangent1, ContactRow::Tangent2] {
            self.solve_contact_row(body_a, body_b, contact, row, k, dt);
        }
    }

    fn solve_contact_row(
        &self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        contact: &mut Contact,
        row: ContactRow,
        k: usize,
        dt: f32,
    ) {
        let settings = &self.settings;
        let direction = match row {
            ContactRow::Normal => contact.normal,
            ContactRow::Tangent1 => contact.tangent1,
            ContactRow::Tangent2 => contact.tangent2,
        };

        let r_a = contact.global_position_a - body_a.position();
        let r_b = contact.global_position_b - body_b.position();
        let jv = (body_b.velocity.linear + body_b.velocity.angular.cross(r_b)
            - body_a.velocity.linear
            - body_a.velocity.angular.cross(r_a))
        .dot(direction);

        let ang_a = (-r_a).cross(direction);
        let ang_b = r_b.cross(direction);
        let i_a_inv = body_a.solver_inverse_inertia();
        let i_b_inv = body_b.solver_inverse_inertia();
        let inv_mass_a = body_a.solver_inverse_mass();
        let inv_mass_b = body_b.solver_inverse_mass();
        let effective_mass = inv_mass_a
            + ang_a.dot(i_a_inv * ang_a)
            + inv_mass_b
            + ang_b.dot(i_b_inv * ang_b);
        if effective_mass <= f32::EPSILON {
            return;
        }

        let bias = match row {
            ContactRow::Normal => {
                -settings.contact_baumgarte / dt
                    * (contact.depth - settings.penetration_slop).max(0.0)
                    - settings.restitution * (-jv - settings.restitution_slop).max(0.0)
            }
            ContactRow::Tangent1 | ContactRow::Tangent2 => 0.0,
        };
        let fresh = (-jv - bias) / effective_mass;

        let friction_bound = contact.normal_impulse_sum * settings.friction_ratio;
        let (sum, cached) = match row {
            ContactRow::Normal => (&mut contact.normal_impulse_sum, &mut contact.cached_normal_lambda),
            ContactRow::Tangent1 => (
                &mut contact.tangent_impulse_sum1,
                &mut contact.cached_tangent_lambda1,
            ),
            ContactRow::Tangent2 => (
                &mut contact.tangent_impulse_sum2,
                &mut contact.cached_tangent_lambda2,
            ),
        };

        let old_sum = *sum;
        *sum = match row {
            ContactRow::Normal => (old_sum + fresh).max(0.0),
            ContactRow::Tangent1 | ContactRow::Tangent2 => {
                (old_sum + fresh).clamp(-friction_bound, friction_bound)
            }
        };
        let mut lambda = *sum - old_sum;

        if k == 0 && settings.warm_start && contact.enable_warm_start && contact.lambda_cached {
            lambda = settings.warm_start_blend * *cached + (1.0 - settings.warm_start_blend) * lambda;
        }
        if k + 1 == settings.iterations {
            *cached = lambda;
            if row == ContactRow::Normal {
                contact.lambda_cached = true;
            }
        }

        if !body_a.is_static {
            body_a.velocity.linear += -direction * lambda * inv_mass_a;
            body_a.velocity.angular += i_a_inv * ang_a * lambda;
        }
        if !body_b.is_static {
            body_b.velocity.linear += direction * lambda * inv_mass_b;
            body_b.velocity.angular += i_b_inv * ang_b * lambda;
        }
    }

    /// Ball-socket pin of `joint.body` to its parent's current position.
    pub fn solve_point_joint(&self, bodies: &mut Arena<RigidBody>, joint: &mut PointJoint, dt: f32) {
        if let Some(parent) = bodies.get(joint.parent) {
            joint.anchor = parent.position();
        }
        let Some(body) = bodies.get_mut(joint.body) else {
            debug!("point joint on {:?} skipped: body not resolvable", joint.body);
            return;
        };
        if body.is_static {
            return;
        }

        let r = body.transform.rotation * joint.extend;
        let error = body.position() + r - joint.anchor;
        let anchor_velocity = body.velocity.linear + body.velocity.angular.cross(r);

        let s = skew(r).transpose();
        let i_inv = body.global_inverse_inertia;
        let k = Mat3::IDENTITY * body.inverse_mass + s * i_inv * s.transpose();
        if k.determinant().abs() <= f32::EPSILON {
            return;
        }
        let lambda =
            k.inverse() * (-anchor_velocity - (self.settings.point_joint_baumgarte / dt) * error);

        let damping = self.settings.point_joint_damping;
        body.velocity.linear += lambda * body.inverse_mass;
        body.velocity.linear *= damping;
        body.velocity.angular += i_inv * (s.transpose() * lambda);
        body.velocity.angular *= damping;
    }

    /// Five-row hinge solve (anchor plus two axis rows), followed by the motor row when enabled.
    pub fn solve_hinge(&self, bodies: &mut Arena<RigidBody>, joint: &HingeJoint, dt: f32) {
        let Some((body_a, body_b)) = bodies.get2_mut(joint.body_a, joint.body_b) else {
            debug!(
                "hinge between {:?} and {:?} skipped: bodies not resolvable",
                joint.body_a, joint.body_b
            );
            return;
        };

        let (r1, r2) = joint.lever_arms(body_a, body_b);
        let (a1, _) = joint.world_axes(body_a, body_b);
        let a1 = a1.normalize_or_zero();
        let [b2, c2] = joint.world_basis_b(body_b).map(Vec3::normalize_or_zero);
        let b2xa1 = b2.cross(a1);
        let c2xa1 = c2.cross(a1);

        let mut jacobian = HingeJacobian::zeros();
        jacobian
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&-Matrix3::<f32>::identity());
        jacobian.fixed_view_mut::<3, 3>(0, 3).copy_from(&to_na_mat(skew(r1)));
        jacobian
            .fixed_view_mut::<3, 3>(0, 6)
            .copy_from(&Matrix3::<f32>::identity());
        jacobian.fixed_view_mut::<3, 3>(0, 9).copy_from(&to_na_mat(-skew(r2)));
        for (row, axis) in [(3, b2xa1), (4, c2xa1)] {
            for (col, value) in axis.to_array().into_iter().enumerate() {
                jacobian[(row, 3 + col)] = -value;
                jacobian[(row, 9 + col)] = value;
            }
        }

        let mut inverse_mass = HingeInverseMass::zeros();
        for (offset, block) in [
            (0, Mat3::IDENTITY * body_a.solver_inverse_mass()),
            (3, body_a.solver_inverse_inertia()),
            (6, Mat3::IDENTITY * body_b.solver_inverse_mass()),
            (9, body_b.solver_inverse_inertia()),
        ] {
            inverse_mass
                .fixed_view_mut::<3, 3>(offset, offset)
                .copy_from(&to_na_mat(block));
        }

        let velocity = SVector::<f32, 12>::from_iterator(
            [
                body_a.velocity.linear,
                body_a.velocity.angular,
                body_b.velocity.linear,
                body_b.velocity.angular,
            ]
            .into_iter()
            .flat_map(|v| v.to_array()),
        );

        let beta = self.settings.hinge_baumgarte / dt;
        let anchor_error = joint.anchor_error(body_a, body_b);
        let bias = SVector::<f32, 5>::new(
            beta * anchor_error.x,
            beta * anchor_error.y,
            beta * anchor_error.z,
            beta * a1.dot(b2),
            beta * a1.dot(c2),
        );

        let effective_mass = jacobian * inverse_mass * jacobian.transpose();
        match effective_mass.try_inverse() {
            Some(k_inv) => {
                let lambda = k_inv * (-(jacobian * velocity) - bias);
                let delta = inverse_mass * jacobian.transpose() * lambda;
                let segment = |start: usize| Vec3::new(delta[start], delta[start + 1], delta[start + 2]);

                if !body_a.is_static {
                    body_a.velocity.linear += segment(0);
                    body_a.velocity.angular += segment(3);
                }
                if !body_b.is_static {
                    body_b.velocity.linear += segment(6);
                    body_b.velocity.angular += segment(9);
                }
            }
            None => warn!(
                "hinge between {:?} and {:?} has a singular effective mass",
                joint.body_a, joint.body_b
            ),
        }

        if let Some(target) = joint.motor_speed {
            Self::solve_hinge_motor(body_a, body_b, joint, target);
        }
    }

    /// Drives `a·(ω2 - ω1)` toward `-target` along the averaged hinge axis.
    fn solve_hinge_motor(
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        joint: &HingeJoint,
        target: f32,
    ) {
        let (a1, a2) = joint.world_axes(body_a, body_b);
        let axis = ((a1 + a2) * 0.5).normalize_or_zero();
        let i1_inv = body_a.solver_inverse_inertia();
        let i2_inv = body_b.solver_inverse_inertia();

        let jv = axis.dot(body_b.velocity.angular - body_a.velocity.angular) + target;
        let k = axis.dot(i1_inv * axis) + axis.dot(i2_inv * axis);
        if k <= f32::EPSILON {
            return;
        }
        let lambda = -jv / k;

        if !body_a.is_static {
            body_a.velocity.angular += i1_inv * -axis * lambda;
        }
        if !body_b.is_static {
            body_b.velocity.angular += i2_inv * axis * lambda;
        }
    }
}

fn to_na_mat(m: Mat3) -> Matrix3<f32> {
    Matrix3::from_column_slice(&m.to_cols_array())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONTACT_PENETRATION_SLOP;
    use crate::utils::allocator::EntityId;
    use approx::assert_relative_eq;

    fn resting_contact(ground: EntityId, body: EntityId, at: Vec3, depth: f32) -> Contact {
        Contact {
            global_position_a: at,
            global_position_b: at,
            normal: Vec3::Y,
            tangent1: Vec3::X,
            tangent2: Vec3::Z,
            depth,
            enable_warm_start: true,
            body_a: ground,
            body_b: body,
            ..Contact::default()
        }
    }

    fn ground_and_body(bodies: &mut Arena<RigidBody>) -> (EntityId, EntityId) {
        let ground = bodies.insert(RigidBody::default().static_body());
        let body = bodies.insert(RigidBody::default().with_position(Vec3::new(0.0, 1.0, 0.0)));
        (ground, body)
    }

    #[test]
    fn contact_stops_approach_without_pulling() {
        let mut bodies = Arena::new();
        let (ground, body) = ground_and_body(&mut bodies);
        if let Some(b) = bodies.get_mut(body) {
            b.set_velocity(Vec3::new(0.0, -2.0, 0.0), Vec3::ZERO);
        }

        let mut manifold = ContactManifold::new(EntityId::default(), EntityId::default());
        manifold.add_contact(resting_contact(ground, body, Vec3::new(0.0, 0.0, 0.0), 0.01));

        let solver = SequentialImpulseSolver::default();
        let metrics = solver.solve(&mut bodies, &mut [&mut manifold], &mut [], &[], 1.0 / 60.0);

        let contact = manifold.contacts()[0];
        assert!(contact.normal_impulse_sum >= 0.0);
        assert!(contact.lambda_cached);
        assert_eq!(metrics.contacts_solved, 1);

        let b = bodies.get(body).expect("body is live");
        let r_b = contact.global_position_b - b.position();
        let normal_velocity = (b.velocity.linear + b.velocity.angular.cross(r_b)).dot(Vec3::Y);
        assert!(normal_velocity > -1e-3, "normal velocity was {normal_velocity}");
    }

    #[test]
    fn warm_start_blends_cached_multiplier() {
        let mut bodies = Arena::new();
        let (ground, body) = ground_and_body(&mut bodies);
        let at = Vec3::new(0.0, 1.0, 0.0);

        let mut contact = resting_contact(ground, body, at, CONTACT_PENETRATION_SLOP);
        contact.lambda_cached = true;
        contact.cached_normal_lambda = 0.5;
        let mut manifold = ContactManifold::new(EntityId::default(), EntityId::default());
        manifold.add_contact(contact);

        let solver = SequentialImpulseSolver::new(SolverSettings {
            iterations: 1,
            ..SolverSettings::default()
        });
        solver.solve(&mut bodies, &mut [&mut manifold], &mut [], &[], 1.0 / 60.0);

        let b = bodies.get(body).expect("body is live");
        assert_relative_eq!(b.velocity.linear.y, 0.4, epsilon = 1e-6);
        assert_relative_eq!(manifold.contacts()[0].cached_normal_lambda, 0.4, epsilon = 1e-6);
    }

    #[test]
    fn point_joint_cancels_anchor_velocity() {
        let mut bodies = Arena::new();
        let parent = bodies.insert(RigidBody::default().static_body());
        let body = bodies.insert(RigidBody::default().with_position(Vec3::new(1.0, 0.0, 0.0)));
        if let Some(b) = bodies.get_mut(body) {
            b.set_velocity(Vec3::new(0.0, -1.0, 0.0), Vec3::ZERO);
        }

        let parent_body = bodies.get(parent).expect("parent is live");
        let mut joint = PointJoint::new(body, parent, parent_body, Vec3::new(-1.0, 0.0, 0.0));
        let solver = SequentialImpulseSolver::default();
        solver.solve_point_joint(&mut bodies, &mut joint, 1.0 / 60.0);

        let b = bodies.get(body).expect("body is live");
        let r = b.transform.rotation * joint.extend;
        let anchor_velocity = b.velocity.linear + b.velocity.angular.cross(r);
        assert!(anchor_velocity.length() < 1e-3, "anchor velocity was {anchor_velocity:?}");
        assert!(b.velocity.angular.length() > 0.0);
    }

    #[test]
    fn hinge_pulls_anchors_together() {
        let mut bodies = Arena::new();
        let a = bodies.insert(RigidBody::default().static_body());
        let b = bodies.insert(RigidBody::default().with_position(Vec3::new(2.0, 0.0, 0.0)));
        let joint = {
            let body_a = bodies.get(a).expect("a is live");
            let body_b = bodies.get(b).expect("b is live");
            HingeJoint::from_world((a, body_a), (b, body_b), Vec3::new(1.0, 0.0, 0.0), Vec3::Z)
        };
        if let Some(body) = bodies.get_mut(b) {
            body.set_velocity(Vec3::new(0.0, -3.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        }

        let solver = SequentialImpulseSolver::default();
        solver.solve(&mut bodies, &mut [], &mut [], &[joint], 1.0 / 60.0);

        let (body_a, body_b) = (bodies.get(a).expect("a"), bodies.get(b).expect("b"));
        let (_, r2) = joint.lever_arms(body_a, body_b);
        let pivot_velocity = body_b.velocity.linear + body_b.velocity.angular.cross(r2);
        assert!(pivot_velocity.length() < 1e-3, "pivot velocity was {pivot_velocity:?}");
        assert!(body_b.velocity.angular.x.abs() < 1e-3);
    }

    #[test]
    fn joints_act_on_the_handles_they_were_built_with() {
        let mut bodies = Arena::new();
        let bystander = bodies.insert(RigidBody::default().with_position(Vec3::new(0.0, 5.0, 0.0)));
        let a = bodies.insert(RigidBody::default().static_body());
        let b = bodies.insert(RigidBody::default().with_position(Vec3::new(0.0, -1.0, 0.0)));
        if let Some(body) = bodies.get_mut(b) {
            body.set_velocity(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO);
        }

        let (mut point, hinge) = {
            let body_a = bodies.get(a).expect("a is live");
            let body_b = bodies.get(b).expect("b is live");
            (
                PointJoint::new(b, a, body_a, Vec3::new(0.0, 1.0, 0.0)),
                HingeJoint::from_world((a, body_a), (b, body_b), Vec3::ZERO, Vec3::Z),
            )
        };
        assert_eq!((point.body, point.parent), (b, a));
        assert_eq!((hinge.body_a, hinge.body_b), (a, b));

        let solver = SequentialImpulseSolver::default();
        solver.solve_point_joint(&mut bodies, &mut point, 1.0 / 60.0);
        assert!(bodies.get(b).expect("b").velocity.linear.x < 2.0);

        solver.solve(&mut bodies, &mut [], &mut [], &[hinge], 1.0 / 60.0);
        let body_b = bodies.get(b).expect("b");
        let (_, r2) = hinge.lever_arms(bodies.get(a).expect("a"), body_b);
        let pivot_velocity = body_b.velocity.linear + body_b.velocity.angular.cross(r2);
        assert!(pivot_velocity.length() < 1e-3, "pivot velocity was {pivot_velocity:?}");
        assert_eq!(bodies.get(bystander).expect("bystander").velocity.linear, Vec3::ZERO);
    }
}
