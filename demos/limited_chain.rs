use nalgebra::Vector3;
use rigid_articulation::*;

fn main() -> Result<(), PhysicsError> {
    env_logger::init();

    let half = Vector3::new(0.0, 0.5, 0.0);
    let settings = MultiBodySettings {
        gravity: true,
        twist_mode: TwistMode::Direct,
        position_solve: true,
        damping: 0.999,
        ..MultiBodySettings::default()
    };
    let mut chain = MultiBody::new(Vector3::zeros(), settings);
    chain.add_link(LinkDesc::ball(None).with_offsets(half, Vector3::zeros()))?;
    for parent in 0..3 {
        chain.add_link(LinkDesc::ball(Some(parent)).with_offsets(half, -half))?;
    }
    for link in 0..chain.len() {
        chain.configure_ball_joint(
            link,
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(-1.0, 0.0, 0.0),
            Some(0.6),
            Some(0.3),
        )?;
    }
    chain.set_joint_velocity(0, &[2.0, 0.0, 1.0])?;
    let mut chain = chain.with_scenario(ConstantTorque::new(3, Vector3::new(0.0, 0.5, 0.0)));
    chain.initialize();

    let mut world = PhysicsWorld::new(1.0 / 240.0);
    let id = world.add_multibody(chain);

    for frame in 0..960 {
        world.tick(1.0 / 240.0);
        if frame % 240 == 239 {
            if let Some(chain) = world.multibody(id) {
                println!(
                    "t = {:.2} s: energy {:.4}, active limit rows {}, tip at {:?}",
                    chain.time(),
                    chain.total_energy(),
                    chain.limit_rows().len(),
                    chain.link_position(3)?
                );
            }
        }
    }
    Ok(())
}
