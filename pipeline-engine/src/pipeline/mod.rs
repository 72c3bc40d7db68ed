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
//! Frame pipeline
//!
//! This module provides:
//! - Named, sequenced groups, optionally on a fixed timestep
//! - A fluent builder for the four system shapes
//! - Per-group deferred command application
//! - Injected job backends for worker-thread execution
//! - Name lookup and introspection snapshots

mod builder;
mod group;
mod info;
mod jobs;
mod scheduler;
mod system;

pub use builder::SystemBuilder;
pub use group::{groups, GroupHandle, GroupHook, GroupStats, GroupTiming};
pub use info::{GroupInfo, PipelineReport, SystemInfo};
#[cfg(feature = "parallel")]
pub use jobs::RayonJobs;
pub use jobs::{default_backend, InlineJobs, Job, JobBackend};
pub use scheduler::Pipeline;
pub use system::{SystemContext, SystemId, SystemShape, SystemStats, TickInfo};
