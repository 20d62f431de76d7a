use impulse_physics::{CollisionShape, PhysicsWorld, RigidBody, Vec3};
use std::sync::{Arc, Mutex};
use std::thread;

#[test]
fn test_physics_world_is_sync_and_send() {
    fn assert_sync_send<T: Sync + Send>() {}
    assert_sync_send::<PhysicsWorld>();
}

#[test]
fn test_shared_physics_world_across_threads() {
    let world = Arc::new(Mutex::new(PhysicsWorld::new(1.0 / 60.0)));
    {
        let mut world = world.lock().unwrap();
        for i in 0..4 {
            world
                .add_body(
                    RigidBody::builder(CollisionShape::sphere(0.5))
                        .position(Vec3::new(i as f32 * 0.9, 0.0, 0.0))
                        .gravity_enabled(false)
                        .build(),
                )
                .unwrap();
        }
    }

    let mut handles = vec![];
    for _ in 0..4 {
        let world_clone = Arc::clone(&world);
        let handle = thread::spawn(move || {
            let mut world = world_clone.lock().unwrap();
            world.step(1.0 / 60.0);
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let world = world.lock().unwrap();
    assert!(world.bodies().all(|(_, body)| body.position().is_finite()));
}
