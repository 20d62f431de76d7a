use impulse_physics::*;

fn floor_mesh(half: f32, y: f32) -> TriangleMesh {
    let vertices = vec![
        Vec3::new(-half, y, -half),
        Vec3::new(half, y, -half),
        Vec3::new(half, y, half),
        Vec3::new(-half, y, half),
    ];
    TriangleMesh::builder(vertices, vec![[0, 2, 1], [0, 3, 2]]).build()
}

#[test]
fn weld_vertices_reduces_duplicates() {
    let vertices = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ];
    let indices = vec![[0, 2, 4]];

    let mesh = TriangleMesh::builder(vertices, indices)
        .weld_vertices(0.01)
        .build();

    // Expect duplicate vertices to be merged.
    assert_eq!(mesh.vertices.len(), 3);
    assert_eq!(mesh.triangle_count(), 1);
}

#[test]
fn mesh_shape_bounds_follow_transform() {
    let shape = CollisionShape::ConcaveMesh {
        mesh: floor_mesh(2.0, -0.5),
    };
    assert_eq!(shape.shape_type(), ShapeType::ConcaveMesh);
    assert!(shape.validate().is_ok());

    let aabb = shape.compute_aabb(&Transform::from_position(Vec3::new(10.0, 0.0, 0.0)));
    assert!(aabb.min.x <= 8.0 + 1e-5 && aabb.max.x >= 12.0 - 1e-5);
    assert!(aabb.min.y <= -0.5 && aabb.max.y >= -0.5);
}

#[test]
fn broken_mesh_is_rejected_by_world() {
    let mesh = TriangleMesh::builder(vec![Vec3::ZERO, Vec3::X], vec![[0, 1, 5]]).build();
    let mut world = PhysicsWorld::default();
    let result = world.add_body(
        RigidBody::builder(CollisionShape::ConcaveMesh { mesh })
            .fixed()
            .build(),
    );
    assert!(matches!(result, Err(PhysicsError::InvalidShape(_))));
}

#[test]
fn sphere_rests_on_triangle_mesh() {
    let mut world = PhysicsWorld::default();
    world
        .add_body(
            RigidBody::builder(CollisionShape::ConcaveMesh {
                mesh: floor_mesh(4.0, 0.0),
            })
            .fixed()
            .build(),
        )
        .unwrap();
    let ball = world
        .add_body(
            RigidBody::builder(CollisionShape::sphere(0.5))
                .position(Vec3::new(0.3, 1.0, -0.2))
                .build(),
        )
        .unwrap();

    for _ in 0..180 {
        world.step_once();
    }
    let y = world.body(ball).unwrap().position().y;
    assert!(y > 0.45 && y < 0.55, "ball at {y}");
    assert!(world
        .manifolds()
        .flat_map(|m| m.points())
        .all(|p| p.normal.y > 0.9));
}

#[test]
fn sphere_rests_on_height_field() {
    let mut world = PhysicsWorld::default();
    world
        .add_body(
            RigidBody::builder(CollisionShape::height_field(5, 5, vec![0.0; 25], Vec3::ONE))
                .fixed()
                .build(),
        )
        .unwrap();
    let ball = world
        .add_body(
            RigidBody::builder(CollisionShape::sphere(0.5))
                .position(Vec3::new(-0.3, 0.8, 0.7))
                .build(),
        )
        .unwrap();

    for _ in 0..180 {
        world.step_once();
    }
    let y = world.body(ball).unwrap().position().y;
    assert!(y > 0.45 && y < 0.55, "ball at {y}");
}
