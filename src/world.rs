use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{
    collision::contact::ContactManifold,
    config::{DEFAULT_GRAVITY, DEFAULT_TICK_BUDGET_MS, DEFAULT_TIME_STEP},
    core::{
        collider::Collider,
        constraints::{HingeJoint, PointJoint},
        rigidbody::RigidBody,
    },
    dynamics::{
        integrator::Integrator,
        multibody::MultiBody,
        solver::{SequentialImpulseSolver, SolverStepMetrics},
    },
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::{Arena, EntityId},
        logging::{warn_if_tick_budget_exceeded, ScopedTimer},
    },
};

mod continuous;
mod manifolds;
pub mod shared;

pub use shared::SharedWorld;

/// Which pipeline `tick` runs for simple rigid bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimulationMode {
    /// Narrow phase, manifolds and the sequential impulse solver.
    #[default]
    Discrete,
    /// Swept boxes with elastic reflection at the time of impact.
    Continuous,
}

/// Ordered collider pair keying a manifold.
pub type ColliderPair = (EntityId, EntityId);

/// Central simulation container: bodies, colliders, joints, manifolds and multibodies.
pub struct PhysicsWorld {
    pub bodies: Arena<RigidBody>,
    pub colliders: Arena<Collider>,
    pub multibodies: Arena<MultiBody>,
    pub point_joints: Vec<PointJoint>,
    pub hinge_joints: Vec<HingeJoint>,
    pub integrator: Integrator,
    pub solver: SequentialImpulseSolver,
    pub gravity: Vec3,
    pub time_step: f32,
    pub mode: SimulationMode,
    /// Ticks slower than this are reported with `warn!`. `None` disables the check.
    pub tick_budget_ms: Option<f32>,
    manifolds: BTreeMap<ColliderPair, ContactManifold>,
    parallel_enabled: bool,
    last_metrics: SolverStepMetrics,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_STEP)
    }
}

impl PhysicsWorld {
    pub fn new(time_step: f32) -> Self {
        let ts = if time_step <= 0.0 {
            DEFAULT_TIME_STEP
        } else {
            time_step
        };

        Self {
            bodies: Arena::new(),
            colliders: Arena::new(),
            multibodies: Arena::new(),
            point_joints: Vec::new(),
            hinge_joints: Vec::new(),
            integrator: Integrator::new(),
            solver: SequentialImpulseSolver::default(),
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            time_step: ts,
            mode: SimulationMode::Discrete,
            tick_budget_ms: Some(DEFAULT_TICK_BUDGET_MS),
            manifolds: BTreeMap::new(),
            parallel_enabled: false,
            last_metrics: SolverStepMetrics::default(),
        }
    }

    pub fn with_mode(mut self, mode: SimulationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables rayon for the narrow phase, rigid-body integration and multibody ticks. Without
    /// the `parallel` feature the flag is recorded but everything runs sequentially.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.parallel_enabled = enabled;
        self.integrator.set_parallel(enabled);
    }

    pub fn parallel_enabled(&self) -> bool {
        self.parallel_enabled
    }

    pub fn add_rigidbody(&mut self, body: RigidBody) -> EntityId {
        let id = self.bodies.insert(body);
        if let Some(stored) = self.bodies.get_mut(id) {
            stored.id = id;
        }
        id
    }

    /// Adds a collider attached to a live body and places it at the body's pose.
    pub fn add_collider(&mut self, collider: Collider) -> PhysicsResult<EntityId> {
        let body_transform = self
            .bodies
            .get(collider.rigidbody_id)
            .map(|body| body.transform)
            .ok_or(PhysicsError::StaleHandle(collider.rigidbody_id))?;

        let id = self.colliders.insert(collider);
        if let Some(stored) = self.colliders.get_mut(id) {
            stored.id = id;
            stored.update_transform(&body_transform);
        }
        Ok(id)
    }

    /// Pins `extend` (in `body`'s frame) to the current position of `parent`.
    pub fn add_point_joint(
        &mut self,
        body: EntityId,
        parent: EntityId,
        extend: Vec3,
    ) -> PhysicsResult<usize> {
        if body == parent {
            return Err(PhysicsError::SelfJoint(body));
        }
        if !self.bodies.contains(body) {
            return Err(PhysicsError::StaleHandle(body));
        }
        let parent_body = self
            .bodies
            .get(parent)
            .ok_or(PhysicsError::StaleHandle(parent))?;
        self.point_joints
            .push(PointJoint::new(body, parent, parent_body, extend));
        Ok(self.point_joints.len() - 1)
    }

    /// Adds a hinge through the world-space `pivot` about `axis`, built from the current poses.
    pub fn add_hinge_joint(
        &mut self,
        body_a: EntityId,
        body_b: EntityId,
        pivot: Vec3,
        axis: Vec3,
        motor_speed: Option<f32>,
    ) -> PhysicsResult<usize> {
        if body_a == body_b {
            return Err(PhysicsError::SelfJoint(body_a));
        }
        let a = self
            .bodies
            .get(body_a)
            .ok_or(PhysicsError::StaleHandle(body_a))?;
        let b = self
            .bodies
            .get(body_b)
            .ok_or(PhysicsError::StaleHandle(body_b))?;

        let mut joint = HingeJoint::from_world((body_a, a), (body_b, b), pivot, axis);
        joint.motor_speed = motor_speed;
        self.hinge_joints.push(joint);
        Ok(self.hinge_joints.len() - 1)
    }

    pub fn add_multibody(&mut self, multibody: MultiBody) -> EntityId {
        self.multibodies.insert(multibody)
    }

    /// Removes a body together with its colliders, joints and manifolds.
    pub fn remove_rigidbody(&mut self, id: EntityId) -> Option<RigidBody> {
        let body = self.bodies.remove(id)?;
        let attached: Vec<EntityId> = self
            .colliders
            .iter()
            .filter(|(_, collider)| collider.rigidbody_id == id)
            .map(|(collider_id, _)| collider_id)
            .collect();
        for collider_id in attached {
            self.colliders.remove(collider_id);
        }
        self.point_joints
            .retain(|joint| joint.body != id && joint.parent != id);
        self.hinge_joints
            .retain(|joint| joint.body_a != id && joint.body_b != id);
        self.prune_manifolds();
        Some(body)
    }

    pub fn body(&self, id: EntityId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id)
    }

    pub fn collider(&self, id: EntityId) -> Option<&Collider> {
        self.colliders.get(id)
    }

    pub fn multibody(&self, id: EntityId) -> Option<&MultiBody> {
        self.multibodies.get(id)
    }

    pub fn multibody_mut(&mut self, id: EntityId) -> Option<&mut MultiBody> {
        self.multibodies.get_mut(id)
    }

    /// Metrics of the last constraint resolution.
    pub fn last_solver_metrics(&self) -> SolverStepMetrics {
        self.last_metrics
    }

    /// Gives every non-static body flagged `has_gravity` the world's gravity as acceleration.
    pub fn initialize_physics(&mut self) {
        let gravity = self.gravity;
        for body in self.bodies.values_mut() {
            if body.has_gravity && !body.is_static {
                body.acceleration = gravity;
            }
        }
        self.update_collider_transforms();
    }

    /// One discrete tick of the rigid-body pipeline.
    pub fn run_physics(&mut self, dt: f32) {
        let timer = ScopedTimer::new("physics::tick");

        self.update_collider_transforms();
        self.integrator.integrate_velocities(&mut self.bodies, dt);
        {
            let _timer = ScopedTimer::new("physics::narrowphase");
            self.update_manifolds();
        }
        {
            let _timer = ScopedTimer::new("physics::solver");
            self.constraint_resolver(dt);
        }
        {
            let _timer = ScopedTimer::new("physics::integrate");
            self.integrator.integrate_positions(&mut self.bodies, dt);
        }

        if let Some(budget) = self.tick_budget_ms {
            warn_if_tick_budget_exceeded(timer.elapsed(), budget);
        }
    }

    /// Runs the sequential impulse solver over every manifold and joint.
    pub fn constraint_resolver(&mut self, dt: f32) -> SolverStepMetrics {
        let mut manifolds: Vec<&mut ContactManifold> = self.manifolds.values_mut().collect();
        let metrics = self.solver.solve(
            &mut self.bodies,
            &mut manifolds,
            &mut self.point_joints,
            &self.hinge_joints,
            dt,
        );
        self.last_metrics = metrics;
        metrics
    }

    /// Advances rigid bodies through the configured pipeline and every multibody by `dt`.
    pub fn tick(&mut self, dt: f32) {
        match self.mode {
            SimulationMode::Discrete => self.run_physics(dt),
            SimulationMode::Continuous => self.physics_update(dt),
        }
        self.tick_multibodies(f64::from(dt));
    }

    fn tick_multibodies(&mut self, dt: f64) {
        if self.multibodies.is_empty() {
            return;
        }
        let _timer = ScopedTimer::new("physics::multibodies");

        #[cfg(feature = "parallel")]
        if self.parallel_enabled {
            use rayon::prelude::*;
            self.multibodies
                .par_values_mut()
                .for_each(|multibody| multibody.tick(dt));
            return;
        }
        for multibody in self.multibodies.values_mut() {
            multibody.tick(dt);
        }
    }

    pub(crate) fn update_collider_transforms(&mut self) {
        for collider in self.colliders.values_mut() {
            if let Some(body) = self.bodies.get(collider.rigidbody_id) {
                collider.update_transform(&body.transform);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MassProperties;

    fn world_with_two_bodies() -> (PhysicsWorld, EntityId, EntityId) {
        let mut world = PhysicsWorld::new(1.0 / 60.0);
        let a = world.add_rigidbody(RigidBody::default());
        let b = world.add_rigidbody(RigidBody::default().with_position(Vec3::X));
        (world, a, b)
    }

    #[test]
    fn joints_reject_self_and_stale_handles() {
        let (mut world, a, b) = world_with_two_bodies();
        assert_eq!(
            world.add_point_joint(a, a, Vec3::ZERO),
            Err(PhysicsError::SelfJoint(a))
        );
        world.remove_rigidbody(b);
        assert_eq!(
            world.add_hinge_joint(a, b, Vec3::ZERO, Vec3::Z, None),
            Err(PhysicsError::StaleHandle(b))
        );
    }

    #[test]
    fn collider_requires_live_body() {
        let mut world = PhysicsWorld::default();
        let orphan = Collider::sphere(0.5).attached_to(EntityId::new(4, 0));
        assert!(world.add_collider(orphan).is_err());
    }

    #[test]
    fn gravity_is_assigned_only_to_dynamic_gravity_bodies() {
        let mut world = PhysicsWorld::default();
        let falling = world.add_rigidbody(RigidBody::default().with_gravity(true));
        let floating = world.add_rigidbody(RigidBody::default());
        let ground = world.add_rigidbody(
            RigidBody::default()
                .with_gravity(true)
                .with_mass_properties(MassProperties::solid_box(Vec3::ONE, 0.0))
                .static_body(),
        );
        world.initialize_physics();

        assert_eq!(world.body(falling).unwrap().acceleration, world.gravity);
        assert_eq!(world.body(floating).unwrap().acceleration, Vec3::ZERO);
        assert_eq!(world.body(ground).unwrap().acceleration, Vec3::ZERO);
    }

    #[test]
    fn removing_a_body_drops_its_joints() {
        let (mut world, a, b) = world_with_two_bodies();
        world.add_point_joint(a, b, Vec3::ZERO).expect("live bodies");
        world
            .add_hinge_joint(a, b, Vec3::ZERO, Vec3::Y, Some(1.0))
            .expect("live bodies");
        world.remove_rigidbody(b);
        assert!(world.point_joints.is_empty());
        assert!(world.hinge_joints.is_empty());
    }
}
