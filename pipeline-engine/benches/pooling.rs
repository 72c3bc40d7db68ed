// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Benchmarks for command buffer pooling
//!
//! Measures the impact of reusing job command buffers on allocation churn
//! and frame times.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pipeline_engine::ecs::{CommandBuffer, Component, Read};
use pipeline_engine::pipeline::{groups, InlineJobs, Pipeline};
use pipeline_engine::pool::{CommandBufferPool, PoolConfig};
use pipeline_engine::{PipelineConfig, World};
use std::sync::Arc;

#[derive(Clone, Copy, Default)]
struct Heat(f32);
impl Component for Heat {}

#[derive(Clone, Copy, Default)]
struct Glow(f32);
impl Component for Glow {}

fn setup_world(n_entities: usize) -> World {
    let mut world = World::new();
    for i in 0..n_entities {
        let entity = world.create_entity();
        world.insert(entity, Heat(i as f32));
    }
    world
}

fn job_pipeline(pool: PoolConfig, jobs: usize) -> Pipeline {
    let config = PipelineConfig::default().with_command_pool(pool);
    let mut pipeline = Pipeline::with_backend(config, Arc::new(InlineJobs));
    pipeline.define_default_groups().unwrap();
    for index in 0..jobs {
        pipeline
            .system(format!("glow_{index}"))
            .in_group(groups::UPDATE)
            .job()
            .each::<Read<Heat>, _>(|ctx, entity, heat: &Heat| {
                ctx.set(entity, Glow(heat.0 * 0.5));
            })
            .unwrap();
    }
    pipeline
}

fn bench_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_buffer_acquire");

    group.bench_function("fresh_allocation", |b| {
        b.iter(|| {
            let buffer = CommandBuffer::with_capacity(64);
            black_box(buffer);
        });
    });

    let pool = CommandBufferPool::new();
    group.bench_function("pooled", |b| {
        b.iter(|| {
            let buffer = pool.acquire();
            black_box(&*buffer);
        });
    });

    group.finish();
}

fn bench_job_batch_pool_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("job_batch_pooling");

    for n_entities in [100, 1000].iter() {
        for (label, config) in [
            ("no_reuse", PoolConfig::new(64, 0)),
            ("default", PoolConfig::default()),
            ("large_capacity", PoolConfig::new(4096, 16)),
        ] {
            let mut world = setup_world(*n_entities);
            let mut pipeline = job_pipeline(config, 4);
            group.bench_with_input(BenchmarkId::new(label, n_entities), n_entities, |b, _| {
                b.iter(|| pipeline.run_tick(black_box(&mut world), 1.0 / 60.0));
            });
        }
    }

    group.finish();
}

fn bench_pool_stats_overhead(c: &mut Criterion) {
    let mut world = setup_world(100);
    let mut pipeline = job_pipeline(PoolConfig::default(), 4);

    c.bench_function("tick_with_stats_check", |b| {
        b.iter(|| {
            pipeline.run_tick(&mut world, 1.0 / 60.0);
            black_box(pipeline.command_pool().stats());
        });
    });
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_job_batch_pool_sizes,
    bench_pool_stats_overhead,
);
criterion_main!(benches);
