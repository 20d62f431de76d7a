use approx::assert_abs_diff_eq;
use impulse_physics::*;

fn ground(world: &mut PhysicsWorld) -> BodyHandle {
    world
        .add_body(
            RigidBody::builder(CollisionShape::cuboid(Vec3::new(5.0, 0.5, 5.0)))
                .position(Vec3::new(0.0, -0.5, 0.0))
                .fixed()
                .build(),
        )
        .unwrap()
}

#[test]
fn bodies_fall_under_gravity() {
    let mut world = PhysicsWorld::new(1.0 / 60.0);
    let body = world
        .add_body(
            RigidBody::builder(CollisionShape::sphere(0.5))
                .position(Vec3::new(0.0, 10.0, 0.0))
                .build(),
        )
        .unwrap();

    world.step(1.0 / 60.0);

    let position_y = world.body(body).expect("body should exist").position().y;
    assert!(position_y < 10.0, "body should start falling, y = {}", position_y);
}

#[test]
fn sphere_settles_on_static_box() {
    let mut world = PhysicsWorld::default();
    ground(&mut world);
    let ball = world
        .add_body(
            RigidBody::builder(CollisionShape::sphere(0.5))
                .position(Vec3::new(0.0, 1.5, 0.0))
                .build(),
        )
        .unwrap();

    for _ in 0..300 {
        world.step_once();
    }

    let body = world.body(ball).unwrap();
    let slop = world.config().contact_slop;
    assert!(body.position().y > 0.5 - slop - 0.01, "sank to {}", body.position().y);
    assert!(body.position().y < 0.52, "floating at {}", body.position().y);
    assert!(body.velocity.linear.length() < 0.05);
    assert!(world.metrics().normal_impulse_sum > 0.0);
}

#[test]
fn restitution_bounces_ball() {
    let mut world = PhysicsWorld::default();
    ground(&mut world);
    let ball = world
        .add_body(
            RigidBody::builder(CollisionShape::sphere(0.5))
                .position(Vec3::new(0.0, 3.0, 0.0))
                .material(Material::rubber())
                .build(),
        )
        .unwrap();

    let mut bounced = false;
    for _ in 0..120 {
        world.step_once();
        if world.body(ball).unwrap().velocity.linear.y > 1.0 {
            bounced = true;
            break;
        }
    }
    assert!(bounced);
}

#[test]
fn static_bodies_do_not_move() {
    let mut world = PhysicsWorld::default();
    let floor = ground(&mut world);
    world
        .add_body(
            RigidBody::builder(CollisionShape::cuboid(Vec3::splat(0.5)))
                .position(Vec3::new(0.0, 0.45, 0.0))
                .build(),
        )
        .unwrap();
    for _ in 0..30 {
        world.step_once();
    }
    let body = world.body(floor).unwrap();
    assert_eq!(body.position(), Vec3::new(0.0, -0.5, 0.0));
    assert_eq!(body.velocity.linear, Vec3::ZERO);
}

#[test]
fn stale_handles_never_resolve() {
    let mut world = PhysicsWorld::default();
    let first = world
        .add_body(RigidBody::builder(CollisionShape::sphere(1.0)).build())
        .unwrap();
    world.remove_body(first).unwrap();
    let second = world
        .add_body(RigidBody::builder(CollisionShape::sphere(2.0)).build())
        .unwrap();

    assert_eq!(first.index(), second.index());
    assert!(world.body(first).is_none());
    assert!(world.body(second).is_some());
    assert!(matches!(
        world.remove_body(first),
        Err(PhysicsError::UnknownBody(handle)) if handle == first
    ));
    assert_eq!(
        world.add_no_collision_pair(first, second),
        Err(PhysicsError::UnknownBody(first))
    );
}

#[test]
fn world_config_round_trips_gravity() {
    let config = WorldConfig {
        gravity: Vec3::new(0.0, -1.62, 0.0),
        ..WorldConfig::default()
    };
    let mut world = PhysicsWorld::with_config(config).unwrap();
    let body = world
        .add_body(
            RigidBody::builder(CollisionShape::sphere(0.5))
                .damping(0.0, 0.0)
                .build(),
        )
        .unwrap();
    world.step_once();
    let dt = world.config().time_step;
    assert_abs_diff_eq!(world.body(body).unwrap().velocity.linear.y, -1.62 * dt, epsilon = 1e-6);

    world.set_gravity(Vec3::ZERO);
    world.step_once();
    assert_abs_diff_eq!(world.body(body).unwrap().velocity.linear.y, -1.62 * dt, epsilon = 1e-6);
}
