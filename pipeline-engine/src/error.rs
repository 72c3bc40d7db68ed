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
//! Error types
//!
//! Pipeline topology is fixed after boot, so every configuration mistake is
//! reported at registration time. Panics raised inside system callbacks are
//! not errors in this sense: they propagate out of the tick unchanged.

use crate::ecs::{ComponentInfo, EntityQueueId};

/// Configuration errors raised while defining groups and registering systems
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Two groups were given the same sequence number
    #[error("group '{name}' reuses sequence number {sequence} already taken by '{existing}'")]
    DuplicateSequence {
        /// Group being defined
        name: String,
        /// Conflicting sequence number
        sequence: u32,
        /// Group that already owns the sequence number
        existing: String,
    },

    /// A group with this name already exists
    #[error("group '{0}' is already defined")]
    DuplicateGroupName(String),

    /// Fixed-step rate is not a positive, finite number of seconds
    #[error("group '{name}' has invalid fixed rate {rate}; must be positive and finite")]
    InvalidRate {
        /// Group being defined
        name: String,
        /// Offending rate in seconds
        rate: f64,
    },

    /// A fixed step longer than the backlog ceiling: the backlog would be
    /// discarded before a single step fits, so the group would never run
    #[error("group '{name}' has fixed rate {rate}s above the backlog ceiling of {max_backlog}s and would never run")]
    RateExceedsBacklog {
        /// Group being defined
        name: String,
        /// Seconds per step
        rate: f64,
        /// Configured backlog ceiling in seconds
        max_backlog: f64,
    },

    /// No group with this name exists
    #[error("unknown pipeline group '{0}'")]
    UnknownGroup(String),

    /// A system was finalized without being placed in a group
    #[error("system '{0}' has no group and would never run")]
    DanglingSystem(String),

    /// A live system already uses this name
    #[error("system '{0}' is already registered")]
    DuplicateSystem(String),

    /// No system with this name or handle exists
    #[error("unknown system '{0}'")]
    UnknownSystem(String),

    /// The entity queue does not exist in the world
    #[error("{0} does not exist")]
    UnknownEntityQueue(EntityQueueId),

    /// Entity queues are drained by exactly one system
    #[error("{queue} is already drained by system '{subscriber}'")]
    QueueAlreadySubscribed {
        /// Queue being subscribed to
        queue: EntityQueueId,
        /// System that already drains it
        subscriber: String,
    },

    /// A job-eligible query system asked for exclusive component access
    #[error("job-eligible system '{system}' writes {component} in its query; defer the write instead")]
    JobQueryWrites {
        /// Offending system
        system: String,
        /// Component fetched with `Write`
        component: ComponentInfo,
    },

    /// The same component appears twice in one query
    #[error("system '{system}' fetches {component} more than once")]
    DuplicateQueryComponent {
        /// Offending system
        system: String,
        /// Repeated component
        component: ComponentInfo,
    },
}

/// Errors raised while booting and shutting down modules
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// A module with this name is already registered
    #[error("module '{0}' is already registered")]
    AlreadyRegistered(String),

    /// The module was built against an incompatible module API
    #[error("module '{name}' targets API {module_api}, incompatible with engine API {engine_api}")]
    IncompatibleApi {
        /// Module name
        name: String,
        /// API version the module declares
        module_api: String,
        /// API version of this engine
        engine_api: String,
    },

    /// A declared dependency is not registered
    #[error("module '{module}' depends on '{dependency}' which is not registered")]
    MissingDependency {
        /// Dependent module
        module: String,
        /// Missing dependency
        dependency: String,
    },

    /// Module dependencies form a cycle
    #[error("circular dependency detected among modules: {0:?}")]
    CircularDependency(Vec<String>),

    /// Registration or startup was attempted in the wrong lifecycle state
    #[error("module registry is {0}")]
    Lifecycle(&'static str),

    /// A module's startup or shutdown hook failed
    #[error("module '{module}' failed: {reason}")]
    Failed {
        /// Failing module
        module: String,
        /// Reason given by the module
        reason: String,
    },

    /// A pipeline configuration error raised while a module registered systems
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
