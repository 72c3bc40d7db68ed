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
//! # Pipeline Engine
//!
//! An ECS frame pipeline: ordered groups of systems that run over a world
//! of entities, components, event streams and entity queues.
//!
//! ## Features
//!
//! - **Ordered groups**: ten standard groups from PreFrame to PostFrame,
//!   plus any a module defines
//! - **Fixed timestep**: FixedUpdate runs in whole steps with a backlog
//!   ceiling
//! - **Deferred mutation**: structural changes apply at each group barrier
//! - **Streams and entity queues**: multi-consumer events with veto, and
//!   "mark dirty, update later" queues fed by triggers
//! - **Parallelization**: job systems run on an injected backend, Rayon by
//!   default
//! - **Modules**: dependency-ordered startup and shutdown with ownership of
//!   registered systems
//!
//! ## Example
//!
//! ```rust
//! use pipeline_engine::ecs::{Component, World, Write};
//! use pipeline_engine::pipeline::{groups, Pipeline};
//!
//! struct Position(f64);
//! impl Component for Position {}
//!
//! let mut world = World::new();
//! let entity = world.create_entity();
//! world.insert(entity, Position(0.0));
//!
//! let mut pipeline = Pipeline::with_default_groups(Default::default()).unwrap();
//! pipeline
//!     .system("drift")
//!     .in_group(groups::FIXED_UPDATE)
//!     .each::<Write<Position>, _>(|ctx, _entity, position: &mut Position| {
//!         position.0 += ctx.delta();
//!     })
//!     .unwrap();
//!
//! pipeline.run_tick(&mut world, 0.05);
//! let x = world.with_component(entity, |position: &Position| position.0);
//! assert!((x.unwrap() - 0.04).abs() < 1e-12);
//! ```

#![warn(missing_docs)]

/// Entity Component System the pipeline runs over
pub mod ecs;

/// Pipeline groups, systems and scheduling
pub mod pipeline;

/// Module lifecycle and registry
pub mod modules;

/// Engine facade tying world, pipeline and modules together
pub mod engine;

/// Pipeline configuration
pub mod config;

/// Error types
pub mod error;

/// Command buffer pooling for job systems
pub mod pool;

pub use config::PipelineConfig;
pub use ecs::{Entity, World};
pub use engine::Engine;
pub use error::{ModuleError, PipelineError};
pub use pipeline::{Pipeline, SystemContext};
