use rigid_articulation::*;

fn continuous_world() -> PhysicsWorld {
    PhysicsWorld::new(1.0 / 60.0).with_mode(SimulationMode::Continuous)
}

fn add_box(world: &mut PhysicsWorld, body: RigidBody, half_extents: Vec3) -> EntityId {
    let id = world.add_rigidbody(body);
    world
        .add_collider(Collider::cuboid(half_extents).attached_to(id))
        .expect("body is live");
    id
}

fn moving(position: Vec3, velocity: Vec3) -> RigidBody {
    let mut body = RigidBody::default().with_position(position);
    body.set_velocity(velocity, Vec3::ZERO);
    body
}

#[test]
fn box_reflects_off_static_wall() {
    let mut world = continuous_world();
    let cube = add_box(&mut world, moving(Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0)), Vec3::splat(0.5));
    add_box(
        &mut world,
        RigidBody::default().with_position(Vec3::new(3.0, 0.0, 0.0)).static_body(),
        Vec3::new(0.5, 5.0, 5.0),
    );

    // Touches the wall at t = 0.5 and spends the rest of the frame moving back.
    world.tick(1.0);

    let body = world.body(cube).unwrap();
    assert!((body.velocity.linear - Vec3::new(-4.0, 0.0, 0.0)).length() < 1e-4);
    assert!(body.position().x.abs() < 1e-4, "x = {}", body.position().x);
}

#[test]
fn fast_box_does_not_tunnel_through_thin_wall() {
    let mut world = continuous_world();
    let bullet = add_box(&mut world, moving(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0)), Vec3::splat(0.5));
    add_box(
        &mut world,
        RigidBody::default().with_position(Vec3::new(10.0, 0.0, 0.0)).static_body(),
        Vec3::new(0.05, 5.0, 5.0),
    );

    world.tick(1.0);

    let body = world.body(bullet).unwrap();
    assert!(body.velocity.linear.x < 0.0);
    assert!(body.position().x < 9.45 + 1e-3, "x = {}", body.position().x);
}

#[test]
fn reflection_leaves_resting_target_in_place() {
    let mut world = continuous_world();
    let left = add_box(&mut world, moving(Vec3::new(-2.5, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0)), Vec3::splat(0.5));
    let middle = add_box(&mut world, moving(Vec3::ZERO, Vec3::ZERO), Vec3::splat(0.5));
    add_box(
        &mut world,
        RigidBody::default().with_position(Vec3::new(3.0, 0.0, 0.0)).static_body(),
        Vec3::new(0.5, 5.0, 5.0),
    );

    world.tick(1.0);

    // Impact at t = 0.75. Each body reflects its own velocity, so the resting target keeps none.
    let striker = world.body(left).unwrap().velocity.linear;
    let target = world.body(middle).unwrap().velocity.linear;
    assert!((striker.x + 2.0).abs() < 1e-4, "striker {striker:?}");
    assert!(world.body(left).unwrap().position().x < -1.0);
    assert!(target.length() < 1e-4, "target {target:?}");
}

#[test]
fn discrete_and_continuous_modes_are_selectable() {
    let world = continuous_world();
    assert_eq!(world.mode, SimulationMode::Continuous);
    assert_eq!(PhysicsWorld::default().mode, SimulationMode::Discrete);
}
