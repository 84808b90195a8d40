use rigid_articulation::*;

fn main() -> Result<(), PhysicsError> {
    env_logger::init();

    let mut engine = PhysicsEngine::new(1.0 / 60.0);
    engine.set_parallel_enabled(true);

    let ground = engine.add_body(RigidBody::default().static_body());
    engine.add_collider(Collider::cuboid(Vec3::new(5.0, 0.5, 5.0)).attached_to(ground))?;

    let mut boxes = Vec::new();
    for i in 0..3 {
        let body = engine.add_body(
            RigidBody::default()
                .with_position(Vec3::new(i as f32 * 1.5 - 1.5, 1.2 + i as f32, 0.0))
                .with_rotation(Quat::from_rotation_z(0.1 * i as f32))
                .with_mass_properties(MassProperties::solid_box(Vec3::splat(0.5), 1.0))
                .with_gravity(true),
        );
        engine.add_collider(Collider::cuboid(Vec3::splat(0.5)).attached_to(body))?;
        boxes.push(body);
    }
    engine.initialize();

    for frame in 0..240 {
        engine.step(1.0 / 60.0);
        if frame % 60 == 59 {
            let metrics = engine.world().last_solver_metrics();
            println!(
                "t = {:.1} s: {} contacts, normal impulse {:.3}",
                (frame + 1) as f32 / 60.0,
                metrics.contacts_solved,
                metrics.normal_impulse_sum
            );
        }
    }

    for id in boxes {
        if let Some(body) = engine.get_body(id) {
            println!("box {:?} rests at {:?}", id, body.position());
        }
    }
    Ok(())
}
