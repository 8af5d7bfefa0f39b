//! 粒子模拟性能基准测试
//!
//! 测试参考内核的两近邻搜索、连线重建与整帧计算的性能

use std::hint::black_box;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use linkfield::render::particles::kernels::{build_links, find_neighbors};
use linkfield::render::particles::params::LINK_VERTICES_PER_SLOT;
use linkfield::render::particles::{
    CpuCompute, CpuParticleStore, EmitterParams, LinkEmitter, LinkVertex, ParticleSlot,
};

/// 规则网格上的存活粒子
fn grid_slots(count: usize) -> Vec<ParticleSlot> {
    let side = (count as f32).cbrt().ceil() as usize;
    (0..count)
        .map(|i| ParticleSlot {
            position: Vec3::new(
                (i % side) as f32,
                ((i / side) % side) as f32,
                (i / (side * side)) as f32,
            ) * 0.1,
            life: 0.5,
            velocity: Vec3::ZERO,
        })
        .collect()
}

fn bench_find_neighbors(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_neighbors");

    for count in [256usize, 1024, 4096].iter() {
        let slots = grid_slots(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| black_box(find_neighbors(black_box(&slots), count / 2)));
        });
    }

    group.finish();
}

fn bench_build_links(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_links");
    group.sample_size(20);

    for count in [256usize, 1024].iter() {
        let slots = grid_slots(*count);
        let mut links = vec![LinkVertex::default(); count * LINK_VERTICES_PER_SLOT as usize];
        let emitter = LinkEmitter::new(CpuParticleStore::new(*count as u32), 8, EmitterParams::default())
            .expect("valid emitter");
        let uniforms = emitter.uniforms(1.0 / 60.0);

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                build_links(black_box(&slots), &mut links, &uniforms);
                black_box(links[0]);
            });
        });
    }

    group.finish();
}

fn bench_emitter_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("emitter_frame");
    group.sample_size(20);

    for count in [256u32, 1024].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let mut emitter =
                LinkEmitter::new(CpuParticleStore::new(count), 8, EmitterParams::default())
                    .expect("valid emitter");
            let mut compute = CpuCompute::new();
            emitter.set_spawn_enabled(true);

            b.iter(|| {
                emitter.set_spawn_position(Vec3::new(0.0, 0.0, 0.0));
                emitter.compute(&mut compute, 1.0 / 60.0);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_find_neighbors,
    bench_build_links,
    bench_emitter_frame
);
criterion_main!(benches);
