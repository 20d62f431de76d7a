use impulse_physics::*;

fn main() -> Result<()> {
    env_logger::init();

    let config = WorldConfig {
        velocity_iterations: 20,
        convergence_tolerance: Some(1e-4),
        ..WorldConfig::default()
    };
    let mut world = PhysicsWorld::with_config(config)?;

    let mut previous = world.add_body(
        RigidBody::builder(CollisionShape::sphere(0.1))
            .position(Vec3::new(0.0, 5.0, 0.0))
            .fixed()
            .build(),
    )?;

    // Links start horizontal so the chain swings down.
    let mut joints = Vec::new();
    for i in 1..=6 {
        let x = i as f32 * 0.6;
        let link = world.add_body(
            RigidBody::builder(CollisionShape::sphere(0.2))
                .position(Vec3::new(x, 5.0, 0.0))
                .build(),
        )?;
        let anchor = Vec3::new(x - 0.3, 5.0, 0.0);
        joints.push(world.add_joint(previous, link, JointDesc::ball_and_socket(anchor))?);
        previous = link;
    }

    for frame in 0..240 {
        world.step(1.0 / 60.0);
        if frame % 60 == 59 {
            let worst = joints
                .iter()
                .filter_map(|joint| world.joint_error(*joint).ok())
                .fold(0.0f32, f32::max);
            let metrics = world.metrics();
            println!(
                "t={:.1}s tip={:?} iterations={} joint error={:.5}",
                (frame + 1) as f32 / 60.0,
                world.body(previous).map(RigidBody::position),
                metrics.velocity_iterations,
                worst
            );
        }
    }
    Ok(())
}
