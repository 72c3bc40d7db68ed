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
//! Frame loop example
//!
//! Boots an engine with three modules, feeds it a scripted sequence of
//! frame times (including one long stall) and prints the pipeline report.
//!
//! Run with `RUST_LOG=pipeline_engine=debug` to see group and system
//! registration, and `PIPELINE_FIXED_RATE=0.01` to change the physics step.

use pipeline_engine::ecs::{Component, Read, Write};
use pipeline_engine::modules::{Module, ModuleContext};
use pipeline_engine::pipeline::groups;
use pipeline_engine::{Engine, ModuleError, PipelineConfig};
use std::any::Any;
use std::error::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default)]
struct Position {
    x: f64,
    y: f64,
}
impl Component for Position {}

#[derive(Debug, Clone, Copy, Default)]
struct Velocity {
    dx: f64,
    dy: f64,
}
impl Component for Velocity {}

#[derive(Debug, Clone, Copy, Default)]
struct Sprite {
    visible: bool,
}
impl Component for Sprite {}

/// Input event produced once per frame
#[derive(Debug)]
enum Input {
    Jump,
    Pause,
}

/// Frame counter shared through a resource
#[derive(Debug, Default)]
struct FrameStats {
    frames: u64,
    physics_steps: u64,
    sprites_rebuilt: u64,
}

struct InputModule;

impl Module for InputModule {
    fn name(&self) -> &str {
        "input"
    }

    fn startup(&mut self, context: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        context
            .system("poll_input")
            .in_group(groups::EARLY)
            .writes_stream::<Input>()
            .execute(|ctx| {
                if ctx.tick() % 3 == 0 {
                    ctx.send(Input::Jump);
                }
                if ctx.tick() == 4 {
                    ctx.send(Input::Pause);
                }
            })?;

        // The pause menu swallows input before gameplay sees it
        context
            .system("pause_menu")
            .in_group(groups::EARLY)
            .each_event::<Input, _>(|_ctx, input: &Input| !matches!(input, Input::Pause))?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct PhysicsModule;

impl Module for PhysicsModule {
    fn name(&self) -> &str {
        "physics"
    }

    fn dependencies(&self) -> Vec<&str> {
        vec!["input"]
    }

    fn startup(&mut self, context: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let world = context.world();
        for i in 0..8 {
            let entity = world.create_entity();
            world.insert(entity, Position { x: i as f64, y: 0.0 });
            world.insert(entity, Velocity { dx: 1.0, dy: 0.0 });
        }
        world.insert_resource(FrameStats::default());

        context
            .system("jump")
            .in_group(groups::UPDATE)
            .each_event::<Input, _>(|ctx, input: &Input| {
                if let Input::Jump = input {
                    info!(tick = ctx.tick(), "jump");
                }
                true
            })?;

        context
            .system("integrate")
            .in_group(groups::FIXED_UPDATE)
            .each::<(Write<Position>, Read<Velocity>), _>(
                |ctx, _entity, (position, velocity): (&mut Position, &Velocity)| {
                    position.x += velocity.dx * ctx.delta();
                    position.y += velocity.dy * ctx.delta();
                },
            )?;

        context
            .system("count_steps")
            .in_group(groups::FIXED_UPDATE)
            .execute(|ctx| {
                if let Some(mut stats) = ctx.resource_mut::<FrameStats>() {
                    stats.physics_steps += 1;
                }
            })?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct RenderModule;

impl Module for RenderModule {
    fn name(&self) -> &str {
        "render"
    }

    fn dependencies(&self) -> Vec<&str> {
        vec!["physics"]
    }

    fn startup(&mut self, context: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let queue = context.world().create_entity_queue("sprite_dirty");
        context.world().add_trigger::<Sprite>(queue)?;

        // Job system: read positions on a worker, defer sprite updates
        context
            .system("cull_sprites")
            .in_group(groups::PRE_RENDER)
            .job()
            .each::<Read<Position>, _>(|ctx, entity, position: &Position| {
                ctx.set(entity, Sprite { visible: position.x < 10.0 });
            })?;

        context
            .system("rebuild_sprites")
            .in_group(groups::RENDER)
            .each_entity(queue, |ctx, _entity| {
                if let Some(mut stats) = ctx.resource_mut::<FrameStats>() {
                    stats.sprites_rebuilt += 1;
                }
            })?;

        context
            .system("end_frame")
            .in_group(groups::POST_FRAME)
            .execute(|ctx| {
                if let Some(mut stats) = ctx.resource_mut::<FrameStats>() {
                    stats.frames += 1;
                }
            })?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pipeline_engine=info".parse()?))
        .init();

    println!("Pipeline Engine - Frame Loop Example");
    println!("====================================\n");

    let config = PipelineConfig::from_env();
    println!(
        "Fixed step: {:.4}s, backlog ceiling: {:.1}s\n",
        config.fixed_update_rate, config.max_fixed_backlog
    );

    let mut engine = Engine::new(config)?;
    engine.add_module(RenderModule)?;
    engine.add_module(PhysicsModule)?;
    engine.add_module(InputModule)?;
    engine.startup()?;
    println!("Load order: {:?}\n", engine.modules().load_order());

    // A steady 60 Hz, one hitch, then a 30 second stall that the fixed
    // group refuses to catch up on.
    let frame_times = [1.0 / 60.0, 1.0 / 60.0, 0.1, 1.0 / 60.0, 30.0, 1.0 / 60.0];
    for delta in frame_times {
        engine.tick(delta);
        if let Some(stats) = engine.world().resource::<FrameStats>() {
            println!(
                "frame {:>2}  delta {:>8.4}s  physics steps so far {:>3}",
                stats.frames, delta, stats.physics_steps
            );
        }
    }

    println!("\n{}", engine.pipeline().report());

    engine.shutdown()?;
    println!("Shut down; {} systems left", engine.pipeline().system_count());
    Ok(())
}
