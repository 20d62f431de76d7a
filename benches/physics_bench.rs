use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use impulse_physics::collision::narrowphase::convex_vs_convex;
use impulse_physics::*;
use std::hint::black_box;

const DT: f32 = 1.0 / 60.0;

/// Loose pile of spheres on a static floor, some of them chained together.
fn prepare_world(body_count: usize) -> PhysicsWorld {
    let mut world = PhysicsWorld::new(DT);
    world
        .add_body(
            RigidBody::builder(CollisionShape::cuboid(Vec3::new(100.0, 0.5, 100.0)))
                .position(Vec3::new(0.0, -0.5, 0.0))
                .fixed()
                .build(),
        )
        .expect("valid floor");

    let side = (body_count as f32).sqrt().ceil() as usize;
    let mut previous = None;
    for i in 0..body_count {
        let position = Vec3::new(
            (i % side) as f32 * 1.05,
            0.5 + (i / side % 3) as f32 * 1.01,
            (i / side) as f32 * 1.05,
        );
        let body = world
            .add_body(
                RigidBody::builder(CollisionShape::sphere(0.5))
                    .position(position)
                    .build(),
            )
            .expect("valid sphere");
        if i % 8 != 0 {
            if let Some(previous) = previous {
                world
                    .add_joint(
                        previous,
                        body,
                        JointDesc::distance(Vec3::ZERO, Vec3::ZERO)
                            .with_local_anchors(Vec3::ZERO, Vec3::ZERO),
                    )
                    .expect("valid joint");
            }
        }
        previous = Some(body);
    }
    world
}

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    for &count in &[128usize, 512, 2048] {
        group.bench_with_input(BenchmarkId::new("step", count), &count, |b, &count| {
            let mut world = prepare_world(count);
            b.iter(|| {
                world.step_once();
                black_box(world.metrics().velocity_iterations)
            })
        });
    }
    group.finish();
}

fn bench_broad_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("broad_phase");
    for &count in &[1000usize, 10000] {
        group.bench_with_input(BenchmarkId::new("update_pairs", count), &count, |b, &count| {
            let mut broad_phase = BroadPhase::new(0.1);
            let boxes: Vec<(BodyHandle, Vec3)> = (0..count)
                .map(|i| {
                    let center = Vec3::new((i % 100) as f32 * 0.9, 0.0, (i / 100) as f32 * 0.9);
                    (Handle::new(i as u32, 0), center)
                })
                .collect();
            for (handle, center) in &boxes {
                broad_phase.insert(*handle, Aabb::from_center_half_extents(*center, Vec3::splat(0.5)));
            }
            broad_phase.update_pairs();

            let mut t = 0.0f32;
            b.iter(|| {
                t += 0.05;
                for (handle, center) in boxes.iter().step_by(10) {
                    let offset = Vec3::new(t.sin() * 0.3, 0.0, t.cos() * 0.3);
                    broad_phase.update(
                        *handle,
                        Aabb::from_center_half_extents(*center + offset, Vec3::splat(0.5)),
                    );
                }
                black_box(broad_phase.update_pairs())
            })
        });
    }
    group.finish();
}

fn generate_grid_mesh(resolution: usize) -> (Vec<Vec3>, Vec<[u32; 3]>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for y in 0..=resolution {
        for x in 0..=resolution {
            vertices.push(Vec3::new(x as f32, 0.0, y as f32));
        }
    }
    let width = resolution + 1;
    for y in 0..resolution {
        for x in 0..resolution {
            let i = y * width + x;
            let a = i as u32;
            let b = (i + 1) as u32;
            let c = (i + width) as u32;
            let d = (i + width + 1) as u32;
            indices.push([a, b, c]);
            indices.push([b, d, c]);
        }
    }
    (vertices, indices)
}

fn bench_mesh_builder(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_builder");
    for &res in &[16usize, 32, 64] {
        group.bench_with_input(BenchmarkId::new("build", res), &res, |b, &res| {
            let (vertices, indices) = generate_grid_mesh(res);
            b.iter(|| {
                let mesh = TriangleMesh::builder(vertices.clone(), indices.clone())
                    .weld_vertices(0.001)
                    .build();
                black_box(mesh)
            })
        });
    }
    group.finish();
}

fn bench_gjk(c: &mut Criterion) {
    let mut group = c.benchmark_group("gjk_narrowphase");
    let count = 1000;

    let shape = CollisionShape::cuboid(Vec3::splat(0.5));
    let capsule = CollisionShape::capsule(0.3, 1.0);
    let transforms_a: Vec<Transform> = (0..count)
        .map(|i| Transform::from_position(Vec3::new(i as f32 * 2.0, 0.0, 0.0)))
        .collect();
    let transforms_b: Vec<Transform> = (0..count)
        .map(|i| {
            Transform::new(
                Vec3::new(i as f32 * 2.0 + 0.7, 0.1, 0.0),
                Quat::from_rotation_z(i as f32 * 0.01),
            )
        })
        .collect();

    group.bench_function("box_box_penetrating", |b| {
        b.iter(|| {
            for i in 0..count {
                black_box(convex_vs_convex(
                    &shape,
                    &transforms_a[i],
                    &shape,
                    &transforms_b[i],
                    0.02,
                ));
            }
        })
    });

    group.bench_function("box_capsule_penetrating", |b| {
        b.iter(|| {
            for i in 0..count {
                black_box(convex_vs_convex(
                    &shape,
                    &transforms_a[i],
                    &capsule,
                    &transforms_b[i],
                    0.02,
                ));
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_world_step,
    bench_broad_phase,
    bench_mesh_builder,
    bench_gjk
);
criterion_main!(benches);
