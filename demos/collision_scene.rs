use impulse_physics::*;

struct ContactPrinter;

impl CollisionEventListener for ContactPrinter {
    fn contact_started(&mut self, pair: PairKey, manifold: &ContactManifold) {
        log::info!(
            "contact {:?} <-> {:?}: {} point(s), depth {:.4}",
            pair.first(),
            pair.second(),
            manifold.len(),
            manifold.max_depth()
        );
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut world = PhysicsWorld::new(1.0 / 60.0);
    world.set_listener(ContactPrinter);

    world.add_body(
        RigidBody::builder(CollisionShape::cuboid(Vec3::new(10.0, 0.5, 10.0)))
            .position(Vec3::new(0.0, -0.5, 0.0))
            .fixed()
            .build(),
    )?;

    let shapes = [
        CollisionShape::sphere(0.5),
        CollisionShape::cuboid(Vec3::splat(0.4)),
        CollisionShape::capsule(0.3, 0.8),
    ];
    let mut handles = Vec::new();
    for (i, shape) in shapes.into_iter().enumerate() {
        let body = RigidBody::builder(shape)
            .position(Vec3::new(i as f32 * 1.5 - 1.5, 2.0 + i as f32, 0.0))
            .material(Material::rubber())
            .build();
        handles.push(world.add_body(body)?);
    }

    for _ in 0..180 {
        world.step(1.0 / 60.0);
    }

    for handle in handles {
        if let Some(body) = world.body(handle) {
            println!("{:?} rests at {:?}", body.shape().shape_type(), body.position());
        }
    }
    println!("{} contact point(s) after 3 seconds", world.contact_count());
    Ok(())
}
