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
//! Benchmarks for frame throughput
//!
//! Measures the cost of a full tick: empty groups, query systems over
//! growing worlds, event fan-out and inline versus Rayon job batches.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pipeline_engine::ecs::{Component, Read, Write};
use pipeline_engine::pipeline::{groups, InlineJobs, JobBackend, Pipeline};
use pipeline_engine::{PipelineConfig, World};
use std::sync::Arc;

#[derive(Clone, Copy, Default)]
struct Position(f64, f64);
impl Component for Position {}

#[derive(Clone, Copy, Default)]
struct Velocity(f64, f64);
impl Component for Velocity {}

#[derive(Clone, Copy, Default)]
struct Speed(f64);
impl Component for Speed {}

struct Collision(u32);

fn pipeline_with(backend: Arc<dyn JobBackend>) -> Pipeline {
    let mut pipeline = Pipeline::with_backend(PipelineConfig::default(), backend);
    pipeline.define_default_groups().unwrap();
    pipeline
}

fn setup_world(n_entities: usize) -> World {
    let mut world = World::new();
    for i in 0..n_entities {
        let entity = world.create_entity();
        world.insert(entity, Position(i as f64, 0.0));
        world.insert(entity, Velocity(1.0, 0.5));
    }
    world
}

fn bench_empty_tick(c: &mut Criterion) {
    let mut pipeline = pipeline_with(Arc::new(InlineJobs));
    let mut world = World::new();

    c.bench_function("empty_tick", |b| {
        b.iter(|| pipeline.run_tick(&mut world, black_box(1.0 / 60.0)));
    });
}

fn bench_query_integration(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_integration");

    for n_entities in [100, 1000, 10000].iter() {
        let mut world = setup_world(*n_entities);
        let mut pipeline = pipeline_with(Arc::new(InlineJobs));
        pipeline
            .system("integrate")
            .in_group(groups::FIXED_UPDATE)
            .each::<(Write<Position>, Read<Velocity>), _>(
                |ctx, _entity, (position, velocity): (&mut Position, &Velocity)| {
                    position.0 += velocity.0 * ctx.delta();
                    position.1 += velocity.1 * ctx.delta();
                },
            )
            .unwrap();

        group.bench_with_input(
            BenchmarkId::new("fixed_step", n_entities),
            n_entities,
            |b, _| {
                b.iter(|| pipeline.run_tick(&mut world, black_box(0.02)));
            },
        );
    }

    group.finish();
}

fn bench_event_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_fan_out");

    for consumers in [1, 4, 16].iter() {
        let mut world = World::new();
        let mut pipeline = pipeline_with(Arc::new(InlineJobs));
        pipeline
            .system("emit")
            .in_group(groups::EARLY)
            .writes_stream::<Collision>()
            .execute(|ctx| {
                for i in 0..64 {
                    ctx.send(Collision(i));
                }
            })
            .unwrap();
        for index in 0..*consumers {
            pipeline
                .system(format!("consume_{index}"))
                .in_group(groups::UPDATE)
                .each_event::<Collision, _>(|_ctx, collision: &Collision| {
                    black_box(collision.0);
                    true
                })
                .unwrap();
        }

        group.bench_with_input(
            BenchmarkId::new("consumers", consumers),
            consumers,
            |b, _| {
                b.iter(|| pipeline.run_tick(&mut world, 1.0 / 60.0));
            },
        );
    }

    group.finish();
}

fn add_job_systems(pipeline: &mut Pipeline, jobs: usize) {
    for index in 0..jobs {
        pipeline
            .system(format!("speed_{index}"))
            .in_group(groups::UPDATE)
            .job()
            .each::<Read<Velocity>, _>(|ctx, entity, velocity: &Velocity| {
                let speed = (velocity.0 * velocity.0 + velocity.1 * velocity.1).sqrt();
                ctx.set(entity, Speed(speed));
            })
            .unwrap();
    }
}

fn bench_job_backends(c: &mut Criterion) {
    let mut group = c.benchmark_group("job_backends");

    for n_entities in [1000, 10000].iter() {
        let mut world = setup_world(*n_entities);
        let mut pipeline = pipeline_with(Arc::new(InlineJobs));
        add_job_systems(&mut pipeline, 4);
        group.bench_with_input(BenchmarkId::new("inline", n_entities), n_entities, |b, _| {
            b.iter(|| pipeline.run_tick(&mut world, 1.0 / 60.0));
        });

        #[cfg(feature = "parallel")]
        {
            use pipeline_engine::pipeline::RayonJobs;

            let mut world = setup_world(*n_entities);
            let backend = RayonJobs::new(None).unwrap();
            let mut pipeline = pipeline_with(Arc::new(backend));
            add_job_systems(&mut pipeline, 4);
            group.bench_with_input(BenchmarkId::new("rayon", n_entities), n_entities, |b, _| {
                b.iter(|| pipeline.run_tick(&mut world, 1.0 / 60.0));
            });
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_empty_tick,
    bench_query_integration,
    bench_event_fan_out,
    bench_job_backends,
);
criterion_main!(benches);
