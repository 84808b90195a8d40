//! Articulated bodies in reduced (joint) coordinates.
//!
//! Links are stored parent-first. Each link owns a slice of the generalized positions `q` and
//! velocities `qdot`; [`MultiBody::forward`] turns those into world-space link poses, the
//! composite Jacobians `Ht` and the generalized mass matrix used by the integrators.

mod kinematics;

use log::warn;
use nalgebra::{
    DMatrix, DVector, Matrix3, Matrix6, Matrix6xX, UnitQuaternion, Vector3, Vector6,
};

use super::joint_limit::{JointLimit, LimitRow};
use super::scenario::Scenario;
use crate::config::{MultiBodySettings, POTENTIAL_GRAVITY};
use crate::core::articulations::{JointType, LinkDesc};
use crate::core::types::{quat_from_na, vec3_from_na, Transform};
use crate::error::{PhysicsError, PhysicsResult};
use crate::utils::logging::ScopedTimer;

/// One rigid link and its inbound joint.
#[derive(Debug, Clone)]
pub struct Link {
    pub joint_type: JointType,
    pub parent_idx: Option<usize>,
    pub q_offset: usize,
    pub dq_offset: usize,

    pub mass: f64,
    /// Body-frame inertia about the center of mass.
    pub local_inertia: Matrix3<f64>,
    /// World-frame inertia, refreshed by [`MultiBody::forward`].
    pub inertia: Matrix3<f64>,

    pub child_offset: Vector3<f64>,
    pub parent_offset: Vector3<f64>,
    pub hinge_axis: Vector3<f64>,
    pub hinge_magnitude: f64,

    /// Rotation relative to the parent link (relative to the world for the root).
    pub rel_ori: UnitQuaternion<f64>,
    pub global_ori: UnitQuaternion<f64>,
    pub r_local: Matrix3<f64>,
    pub r_global: Matrix3<f64>,
    pub position: Vector3<f64>,
    pub joint_position: Vector3<f64>,
    /// `child_offset` in world coordinates.
    pub u_gc: Vector3<f64>,
    /// `parent_offset` rotated by the parent's orientation.
    pub u_gp: Vector3<f64>,
    pub hinge_axis_global: Vector3<f64>,

    /// Spatial velocity `[v; ω]` of the center of mass.
    pub velocity: Vector6<f64>,
    /// Spatial force `[f; τ]` applied this tick.
    pub external_force: Vector6<f64>,

    pub h: Matrix6xX<f64>,
    pub d: Matrix6<f64>,
    pub gamma: Vector6<f64>,
    pub ht: Matrix6xX<f64>,
    pub gamma_t: Vector6<f64>,

    pub limit: JointLimit,
}

impl Link {
    fn from_desc(desc: &LinkDesc, q_offset: usize, dq_offset: usize) -> Self {
        let vel_dofs = desc.joint.vel_dofs();
        Self {
            joint_type: desc.joint,
            parent_idx: desc.parent,
            q_offset,
            dq_offset,
            mass: desc.mass,
            local_inertia: desc.inertia,
            inertia: desc.inertia,
            child_offset: desc.child_offset,
            parent_offset: desc.parent_offset,
            hinge_axis: desc.hinge_axis,
            hinge_magnitude: desc.hinge_magnitude,
            rel_ori: UnitQuaternion::identity(),
            global_ori: UnitQuaternion::identity(),
            r_local: Matrix3::identity(),
            r_global: Matrix3::identity(),
            position: Vector3::zeros(),
            joint_position: Vector3::zeros(),
            u_gc: desc.child_offset,
            u_gp: desc.parent_offset,
            hinge_axis_global: desc.hinge_axis,
            velocity: Vector6::zeros(),
            external_force: Vector6::zeros(),
            h: Matrix6xX::zeros(vel_dofs),
            d: Matrix6::identity(),
            gamma: Vector6::zeros(),
            ht: Matrix6xX::zeros(0),
            gamma_t: Vector6::zeros(),
            limit: JointLimit::default(),
        }
    }

    /// 6×6 spatial mass block `diag(m·I, I_world)`.
    pub fn mass_block(&self) -> Matrix6<f64> {
        let mut block = Matrix6::zeros();
        block
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(Matrix3::identity() * self.mass));
        block.fixed_view_mut::<3, 3>(3, 3).copy_from(&self.inertia);
        block
    }

    pub fn linear_velocity(&self) -> Vector3<f64> {
        self.velocity.fixed_rows::<3>(0).into_owned()
    }

    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.velocity.fixed_rows::<3>(3).into_owned()
    }
}

/// Tree of links integrated in generalized coordinates.
pub struct MultiBody {
    pub settings: MultiBodySettings,
    pub(crate) links: Vec<Link>,
    /// World position of the root joint.
    pub(crate) origin: Vector3<f64>,
    pub(crate) q: DVector<f64>,
    pub(crate) qdot: DVector<f64>,
    pub(crate) total_pos_dofs: usize,
    pub(crate) total_vel_dofs: usize,
    pub(crate) mass_matrix: DMatrix<f64>,
    pub(crate) mass_matrix_inverse: DMatrix<f64>,
    pub(crate) limit_rows: Vec<LimitRow>,
    pub(crate) limit_jacobian: DMatrix<f64>,
    pub(crate) limit_effective_mass: DMatrix<f64>,
    pub(crate) singular_mass_events: usize,
    pub(crate) dt: f64,
    pub(crate) time: f64,
    scenario: Option<Box<dyn Scenario>>,
}

impl std::fmt::Debug for MultiBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiBody")
            .field("links", &self.links.len())
            .field("total_vel_dofs", &self.total_vel_dofs)
            .field("time", &self.time)
            .field("has_scenario", &self.scenario.is_some())
            .finish()
    }
}

impl MultiBody {
    pub fn new(origin: Vector3<f64>, settings: MultiBodySettings) -> Self {
        Self {
            settings,
            links: Vec::new(),
            origin,
            q: DVector::zeros(0),
            qdot: DVector::zeros(0),
            total_pos_dofs: 0,
            total_vel_dofs: 0,
            mass_matrix: DMatrix::zeros(0, 0),
            mass_matrix_inverse: DMatrix::zeros(0, 0),
            limit_rows: Vec::new(),
            limit_jacobian: DMatrix::zeros(0, 0),
            limit_effective_mass: DMatrix::zeros(0, 0),
            singular_mass_events: 0,
            dt: 0.0,
            time: 0.0,
            scenario: None,
        }
    }

    /// Appends a link. Only the first link may omit its parent and parents must precede children.
    pub fn add_link(&mut self, desc: LinkDesc) -> PhysicsResult<usize> {
        let index = self.links.len();
        match desc.parent {
            Some(parent) if parent >= index => {
                return Err(PhysicsError::InvalidParent {
                    link: index,
                    parent,
                });
            }
            None if index > 0 => return Err(PhysicsError::MissingParent { link: index }),
            _ => {}
        }

        let link = Link::from_desc(&desc, self.total_pos_dofs, self.total_vel_dofs);
        self.total_pos_dofs += desc.joint.pos_dofs();
        self.total_vel_dofs += desc.joint.vel_dofs();
        self.q = self.q.clone().resize_vertically(self.total_pos_dofs, 0.0);
        self.qdot = self.qdot.clone().resize_vertically(self.total_vel_dofs, 0.0);
        self.links.push(link);
        self.mirror_quaternion(index);

        for link in &mut self.links {
            link.ht = Matrix6xX::zeros(self.total_vel_dofs);
        }
        Ok(index)
    }

    /// Builds the links from descriptions and runs the first forward pass.
    pub fn from_links(
        origin: Vector3<f64>,
        settings: MultiBodySettings,
        descs: impl IntoIterator<Item = LinkDesc>,
    ) -> PhysicsResult<Self> {
        let mut body = Self::new(origin, settings);
        for desc in descs {
            body.add_link(desc)?;
        }
        body.initialize();
        Ok(body)
    }

    /// Seeds the joint-limit history and computes the first kinematic state.
    pub fn initialize(&mut self) {
        self.forward();
        for link in &mut self.links {
            link.limit.last_valid = link.rel_ori;
            link.limit.cache_euler_angles(&link.rel_ori);
        }
        if let Some(mut scenario) = self.scenario.take() {
            if let Err(err) = scenario.setup(self) {
                warn!("scenario setup failed: {err}");
            }
            self.scenario = Some(scenario);
            self.forward();
        }
    }

    pub fn set_scenario(&mut self, scenario: impl Scenario + 'static) {
        self.scenario = Some(Box::new(scenario));
    }

    pub fn with_scenario(mut self, scenario: impl Scenario + 'static) -> Self {
        self.set_scenario(scenario);
        self
    }

    pub fn has_scenario(&self) -> bool {
        self.scenario.is_some()
    }

    /// One step of size `dt`: clears external forces, runs the scenario controller, integrates.
    pub fn tick(&mut self, dt: f64) {
        if dt <= 0.0 || self.links.is_empty() {
            return;
        }
        let _timer = ScopedTimer::new("multibody::tick");
        self.dt = dt;

        for link in &mut self.links {
            link.external_force = Vector6::zeros();
        }
        if let Some(mut scenario) = self.scenario.take() {
            scenario.control(self, dt);
            self.scenario = Some(scenario);
        }

        self.step(dt);
        self.time += dt;

        if let Some(mut scenario) = self.scenario.take() {
            scenario.record(self, self.time);
            self.scenario = Some(scenario);
        }
    }

    pub(crate) fn check_link(&self, link: usize) -> PhysicsResult<&Link> {
        self.links.get(link).ok_or(PhysicsError::LinkOutOfRange {
            link,
            len: self.links.len(),
        })
    }

    fn expect_joint(&self, link: usize, expected: &[JointType]) -> PhysicsResult<&Link> {
        let found = self.check_link(link)?;
        if expected.contains(&found.joint_type) {
            Ok(found)
        } else {
            Err(PhysicsError::JointKindMismatch {
                link,
                expected: expected[0],
                found: found.joint_type,
            })
        }
    }

    /// Writes a quaternion-jointed link's orientation into its slice of `q` as `(w, i, j, k)`.
    pub(crate) fn mirror_quaternion(&mut self, index: usize) {
        let link = &self.links[index];
        let offset = match link.joint_type {
            JointType::Ball4D => link.q_offset,
            JointType::Free => link.q_offset + 3,
            _ => return,
        };
        let rel = link.rel_ori;
        self.q[offset] = rel.w;
        self.q[offset + 1] = rel.i;
        self.q[offset + 2] = rel.j;
        self.q[offset + 3] = rel.k;
    }

    /// Sets the relative rotation of a Ball4D or Free joint.
    pub fn set_joint_rotation(&mut self, link: usize, rotation: UnitQuaternion<f64>) -> PhysicsResult<()> {
        self.expect_joint(link, &[JointType::Ball4D, JointType::Free])?;
        self.links[link].rel_ori = rotation;
        self.links[link].limit.last_valid = rotation;
        self.mirror_quaternion(link);
        self.forward();
        Ok(())
    }

    pub fn set_rotation_vector(&mut self, link: usize, r: Vector3<f64>) -> PhysicsResult<()> {
        let offset = self.expect_joint(link, &[JointType::Ball3D])?.q_offset;
        self.q.fixed_rows_mut::<3>(offset).copy_from(&r);
        self.forward();
        Ok(())
    }

    pub fn set_hinge_angle(&mut self, link: usize, angle: f64) -> PhysicsResult<()> {
        let offset = self.expect_joint(link, &[JointType::Hinge])?.q_offset;
        self.q[offset] = angle;
        self.forward();
        Ok(())
    }

    pub fn set_free_position(&mut self, link: usize, position: Vector3<f64>) -> PhysicsResult<()> {
        let offset = self.expect_joint(link, &[JointType::Free])?.q_offset;
        self.q.fixed_rows_mut::<3>(offset).copy_from(&position);
        self.forward();
        Ok(())
    }

    /// Overwrites the generalized velocities of one joint.
    pub fn set_joint_velocity(&mut self, link: usize, velocity: &[f64]) -> PhysicsResult<()> {
        let found = self.check_link(link)?;
        let (offset, dofs) = (found.dq_offset, found.joint_type.vel_dofs());
        for (k, value) in velocity.iter().take(dofs).enumerate() {
            self.qdot[offset + k] = *value;
        }
        self.forward();
        Ok(())
    }

    /// Mutable generalized velocities. Call [`MultiBody::forward`] after editing.
    pub fn qdot_mut(&mut self) -> &mut DVector<f64> {
        &mut self.qdot
    }

    /// Configures the swing/twist limits of a Ball4D joint. Axes are in the parent frame.
    pub fn configure_ball_joint(
        &mut self,
        link: usize,
        x_axis: Vector3<f64>,
        z_axis: Vector3<f64>,
        swing_range: Option<f64>,
        twist_range: Option<f64>,
    ) -> PhysicsResult<()> {
        self.expect_joint(link, &[JointType::Ball4D])?;
        let target = &mut self.links[link];
        target.limit.configure(x_axis, z_axis, swing_range, twist_range);
        target.limit.last_valid = target.rel_ori;
        target.limit.cache_euler_angles(&target.rel_ori);
        Ok(())
    }

    pub fn set_rotation_limit(&mut self, link: usize, limit: Option<f64>) -> PhysicsResult<()> {
        self.expect_joint(link, &[JointType::Ball4D])?;
        self.links[link].limit.rotation_limit = limit;
        Ok(())
    }

    /// Adds a world-frame force and torque to a link for the current tick.
    pub fn apply_external_force(
        &mut self,
        link: usize,
        force: Vector3<f64>,
        torque: Vector3<f64>,
    ) -> PhysicsResult<()> {
        self.check_link(link)?;
        let mut wrench = Vector6::zeros();
        wrench.fixed_rows_mut::<3>(0).copy_from(&force);
        wrench.fixed_rows_mut::<3>(3).copy_from(&torque);
        self.links[link].external_force += wrench;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, link: usize) -> PhysicsResult<&Link> {
        self.check_link(link)
    }

    pub fn q(&self) -> &DVector<f64> {
        &self.q
    }

    pub fn qdot(&self) -> &DVector<f64> {
        &self.qdot
    }

    pub fn mass_matrix(&self) -> &DMatrix<f64> {
        &self.mass_matrix
    }

    pub fn mass_matrix_inverse(&self) -> &DMatrix<f64> {
        &self.mass_matrix_inverse
    }

    pub fn limit_rows(&self) -> &[LimitRow] {
        &self.limit_rows
    }

    /// Number of times the generalized mass matrix had to be regularized.
    pub fn singular_mass_events(&self) -> usize {
        self.singular_mass_events
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn total_vel_dofs(&self) -> usize {
        self.total_vel_dofs
    }

    pub fn total_pos_dofs(&self) -> usize {
        self.total_pos_dofs
    }

    /// World transform of a link in render (glam) types.
    pub fn link_transform(&self, link: usize) -> PhysicsResult<Transform> {
        let found = self.check_link(link)?;
        Ok(Transform::from_position_rotation(
            vec3_from_na(&found.position),
            quat_from_na(&found.global_ori),
        ))
    }

    pub fn link_position(&self, link: usize) -> PhysicsResult<Vector3<f64>> {
        Ok(self.check_link(link)?.position)
    }

    pub fn link_rotation(&self, link: usize) -> PhysicsResult<UnitQuaternion<f64>> {
        Ok(self.check_link(link)?.global_ori)
    }

    pub fn relative_rotation(&self, link: usize) -> PhysicsResult<UnitQuaternion<f64>> {
        Ok(self.check_link(link)?.rel_ori)
    }

    pub fn link_velocity(&self, link: usize) -> PhysicsResult<Vector3<f64>> {
        Ok(self.check_link(link)?.linear_velocity())
    }

    pub fn link_angular_velocity(&self, link: usize) -> PhysicsResult<Vector3<f64>> {
        Ok(self.check_link(link)?.angular_velocity())
    }

    /// Cached yzx Euler angles `(α, β, γ)` of a joint in its limit frame.
    pub fn euler_angles(&self, link: usize) -> PhysicsResult<(f64, f64, f64)> {
        let limit = &self.check_link(link)?.limit;
        Ok((limit.alpha, limit.beta, limit.gamma))
    }

    pub fn total_twist(&self, link: usize) -> PhysicsResult<f64> {
        Ok(self.check_link(link)?.limit.total_twist)
    }

    pub fn vector_field(&self, link: usize) -> PhysicsResult<bool> {
        Ok(self.check_link(link)?.limit.vector_field)
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.links
            .iter()
            .map(|link| {
                let omega = link.angular_velocity();
                0.5 * omega.dot(&(link.inertia * omega))
                    + 0.5 * link.mass * link.linear_velocity().norm_squared()
            })
            .sum()
    }

    pub fn potential_energy(&self) -> f64 {
        self.links
            .iter()
            .map(|link| link.mass * POTENTIAL_GRAVITY * link.position.y)
            .sum()
    }

    /// Kinetic energy, plus potential energy when gravity is enabled.
    pub fn total_energy(&self) -> f64 {
        let potential = if self.settings.gravity {
            self.potential_energy()
        } else {
            0.0
        };
        self.kinetic_energy() + potential
    }

    pub fn linear_momentum(&self) -> Vector3<f64> {
        self.links
            .iter()
            .map(|link| link.linear_velocity() * link.mass)
            .sum()
    }

    /// Angular momentum about the world origin.
    pub fn angular_momentum(&self) -> Vector3<f64> {
        self.links
            .iter()
            .map(|link| {
                link.inertia * link.angular_velocity()
                    + link.position.cross(&(link.linear_velocity() * link.mass))
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pendulum() -> MultiBody {
        MultiBody::from_links(
            Vector3::zeros(),
            MultiBodySettings::default(),
            [
                LinkDesc::ball(None).with_offsets(Vector3::new(0.0, 1.0, 0.0), Vector3::zeros()),
                LinkDesc::ball(Some(0))
                    .with_offsets(Vector3::new(0.0, 1.0, 0.0), Vector3::new(0.0, -1.0, 0.0)),
            ],
        )
        .expect("valid chain")
    }

    #[test]
    fn add_link_rejects_forward_parents() {
        let mut body = MultiBody::new(Vector3::zeros(), MultiBodySettings::default());
        body.add_link(LinkDesc::ball(None)).expect("root");
        assert_eq!(
            body.add_link(LinkDesc::ball(Some(1))),
            Err(PhysicsError::InvalidParent { link: 1, parent: 1 })
        );
        assert_eq!(
            body.add_link(LinkDesc::ball(None)),
            Err(PhysicsError::MissingParent { link: 1 })
        );
    }

    #[test]
    fn dof_totals_match_state_vectors() {
        let mut body = MultiBody::new(Vector3::zeros(), MultiBodySettings::default());
        body.add_link(LinkDesc::free()).expect("root");
        body.add_link(LinkDesc::hinge(Some(0), Vector3::z())).expect("hinge");
        body.add_link(LinkDesc::ball_rotation_vector(Some(1))).expect("ball");

        assert_eq!(body.total_vel_dofs(), 6 + 1 + 3);
        assert_eq!(body.total_pos_dofs(), 7 + 1 + 3);
        assert_eq!(body.qdot().len(), body.total_vel_dofs());
        assert_eq!(body.q()[3], 1.0);
    }

    #[test]
    fn hanging_chain_places_links_below_origin() {
        let body = pendulum();
        assert_relative_eq!(body.link_position(0).unwrap(), Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(body.link_position(1).unwrap(), Vector3::new(0.0, -3.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn hinge_limit_configuration_is_rejected() {
        let mut body = MultiBody::new(Vector3::zeros(), MultiBodySettings::default());
        body.add_link(LinkDesc::hinge(None, Vector3::z())).expect("root");
        let err = body
            .configure_ball_joint(0, Vector3::x(), Vector3::z(), Some(0.5), None)
            .unwrap_err();
        assert!(matches!(err, PhysicsError::JointKindMismatch { link: 0, .. }));
    }

    #[test]
    fn momentum_sums_link_contributions() {
        let mut body = pendulum();
        body.set_joint_velocity(0, &[0.0, 0.0, 1.0]).expect("ball link");
        // Rotation about z through the origin moves both links along +x.
        let momentum = body.linear_momentum();
        assert_relative_eq!(momentum, Vector3::new(1.0 + 3.0, 0.0, 0.0), epsilon = 1e-12);
        assert!(body.kinetic_energy() > 0.0);
    }
}
