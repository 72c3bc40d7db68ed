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
//! Entity Component System (ECS) core the pipeline runs over
//!
//! This module provides:
//! - Generational entity handles
//! - Dense, per-type component columns behind `RwLock`s
//! - Multi-consumer event streams and entity queues
//! - Typed queries and deferred command buffers

mod commands;
mod component;
mod entity;
mod entity_queue;
mod query;
mod stream;
mod world;

pub use commands::{ApplyStats, CommandBuffer, CommandKind};
pub use component::{Column, Component, ComponentInfo};
pub use entity::{Entity, EntityId};
pub use entity_queue::EntityQueueId;
pub use query::{Access, Fetch, Query, Read, Write};
pub use stream::Stream;
pub use world::World;

pub(crate) use query::duplicate_component;
