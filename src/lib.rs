//! Rigid Articulation – rigid-body and articulated-body physics for Rust.
//!
//! Rigid bodies collide through GJK/EPA into persistent contact manifolds that a sequential
//! impulse solver resolves together with point and hinge joints. Articulated bodies are
//! integrated in joint coordinates with swing/twist joint limits.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{Mat3, Mat4, Quat, Vec3};

pub use collision::{
    ccd::CollisionPair,
    contact::{Contact, ContactManifold},
    narrowphase::{EPAAlgorithm, GJKAlgorithm, NarrowPhase},
};
pub use config::{MultiBodySettings, SolverSettings};
pub use core::{
    articulations::{IntegrationMethod, JointType, LinkDesc, TwistMode},
    collider::{Collider, ColliderShape},
    constraints::{HingeJoint, PointJoint},
    rigidbody::RigidBody,
    types::{MassProperties, Transform, Velocity},
};
pub use dynamics::{
    integrator::Integrator,
    joint_limit::{LimitKind, LimitRow},
    multibody::MultiBody,
    scenario::{ConstantTorque, LinkTrace, Scenario},
    solver::{SequentialImpulseSolver, SolverStepMetrics},
};
pub use error::{PhysicsError, PhysicsResult};
pub use utils::allocator::{Arena, EntityId, GenerationalId};
pub use world::{PhysicsWorld, SharedWorld, SimulationMode};

/// High-level convenience wrapper that owns a [`PhysicsWorld`] and steps it at a fixed rate.
pub struct PhysicsEngine {
    world: PhysicsWorld,
    accumulator: f32,
}

impl PhysicsEngine {
    /// Creates a new physics engine with the provided fixed timestep.
    pub fn new(timestep: f32) -> Self {
        Self {
            world: PhysicsWorld::new(timestep),
            accumulator: 0.0,
        }
    }

    /// Adds a rigid body to the world and returns its generated [`EntityId`].
    pub fn add_body(&mut self, body: RigidBody) -> EntityId {
        self.world.add_rigidbody(body)
    }

    /// Adds a collider associated with a rigid body and returns its [`EntityId`].
    pub fn add_collider(&mut self, collider: Collider) -> PhysicsResult<EntityId> {
        self.world.add_collider(collider)
    }

    pub fn add_multibody(&mut self, multibody: MultiBody) -> EntityId {
        self.world.add_multibody(multibody)
    }

    /// Assigns gravity to the bodies that take it. Call once after populating the world.
    pub fn initialize(&mut self) {
        self.world.initialize_physics();
    }

    /// Runs as many fixed ticks as fit into the accumulated time. Returns how many ran.
    pub fn step(&mut self, dt: f32) -> usize {
        self.accumulator += dt;
        let mut ticks = 0;
        while self.accumulator >= self.world.time_step {
            self.accumulator -= self.world.time_step;
            self.world.tick(self.world.time_step);
            ticks += 1;
        }
        ticks
    }

    /// Enables or disables parallel execution for the narrow phase, integration and multibodies.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.world.set_parallel_enabled(enabled);
    }

    /// Returns whether the engine is currently using parallel execution.
    pub fn parallel_enabled(&self) -> bool {
        self.world.parallel_enabled()
    }

    /// Immutable access to a rigid body by id.
    pub fn get_body(&self, id: EntityId) -> Option<&RigidBody> {
        self.world.body(id)
    }

    /// Mutable access to a rigid body by id.
    pub fn get_body_mut(&mut self, id: EntityId) -> Option<&mut RigidBody> {
        self.world.body_mut(id)
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }
}
