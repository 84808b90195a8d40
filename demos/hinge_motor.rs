use rigid_articulation::*;

fn main() -> Result<(), PhysicsError> {
    env_logger::init();

    let mut world = PhysicsWorld::new(1.0 / 60.0);
    let base = world.add_rigidbody(RigidBody::default().static_body());
    let wheel = world.add_rigidbody(
        RigidBody::default()
            .with_position(Vec3::new(0.0, 0.0, 0.5))
            .with_mass_properties(MassProperties::solid_sphere(0.5, 2.0)),
    );
    world.add_hinge_joint(wheel, base, Vec3::new(0.0, 0.0, 0.5), Vec3::Z, Some(4.0))?;

    let pendulum = world.add_rigidbody(
        RigidBody::default()
            .with_position(Vec3::new(2.0, -1.0, 0.0))
            .with_gravity(true),
    );
    world.add_point_joint(pendulum, base, Vec3::new(-2.0, 1.0, 0.0))?;
    world.initialize_physics();

    for frame in 0..180 {
        world.tick(1.0 / 60.0);
        if frame % 30 == 29 {
            let spin = world.body(wheel).map(|b| b.velocity.angular.z).unwrap_or_default();
            let bob = world.body(pendulum).map(|b| b.position()).unwrap_or_default();
            println!("frame {:>3}: wheel spin {spin:.3} rad/s, pendulum at {bob:?}", frame + 1);
        }
    }
    Ok(())
}
