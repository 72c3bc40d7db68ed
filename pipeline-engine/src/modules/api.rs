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
//! Module API
//!
//! A module is the unit that contributes groups, systems, queues and
//! resources to an engine. Everything it registers through its
//! [`ModuleContext`] during `startup` is owned by it and deregistered
//! automatically after its `shutdown`.
//!
//! # Contracts
//!
//! Modules must:
//! - Use a name that is unique across all registered modules
//! - Declare every module whose groups or systems they rely on
//! - Not create circular dependencies with other modules

use crate::ecs::World;
use crate::error::{ModuleError, PipelineError};
use crate::pipeline::{GroupHandle, GroupTiming, Pipeline, SystemBuilder};
use std::any::Any;

/// Version of the module API
///
/// Format: MAJOR.MINOR.PATCH following semantic versioning.
pub const MODULE_API_VERSION: &str = "0.2.0";

/// Scoped access to the engine while a module starts up or shuts down
pub struct ModuleContext<'a> {
    module: &'a str,
    pipeline: &'a mut Pipeline,
    world: &'a mut World,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(module: &'a str, pipeline: &'a mut Pipeline, world: &'a mut World) -> Self {
        ModuleContext {
            module,
            pipeline,
            world,
        }
    }

    /// Name of the module being started or shut down
    pub fn module_name(&self) -> &str {
        self.module
    }

    /// The pipeline
    pub fn pipeline(&mut self) -> &mut Pipeline {
        &mut *self.pipeline
    }

    /// The world
    pub fn world(&mut self) -> &mut World {
        &mut *self.world
    }

    /// Start registering a system owned by this module
    pub fn system(&mut self, name: impl Into<String>) -> SystemBuilder<'_> {
        self.pipeline.system(name)
    }

    /// Define a group owned by this module
    pub fn define_group(
        &mut self,
        name: &str,
        sequence: u32,
        timing: GroupTiming,
    ) -> Result<GroupHandle, PipelineError> {
        self.pipeline.define_group(name, sequence, timing)
    }

    /// Look up a group by name
    pub fn group(&self, name: &str) -> Result<GroupHandle, PipelineError> {
        self.pipeline.require_group(name)
    }
}

/// Lifecycle hooks for modules
pub trait Module: Send {
    /// Get the name of this module
    ///
    /// Must be unique across all registered modules.
    fn name(&self) -> &str;

    /// Get the version of this module
    fn version(&self) -> &str {
        "0.1.0"
    }

    /// Get the module API version this module was built against
    ///
    /// Used for compatibility checking.
    fn api_version(&self) -> &str {
        MODULE_API_VERSION
    }

    /// Names of modules that must start before this one
    fn dependencies(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Register groups, systems and resources
    fn startup(&mut self, context: &mut ModuleContext<'_>) -> Result<(), ModuleError>;

    /// Release anything not owned by the pipeline
    ///
    /// Systems and groups registered during startup are removed after
    /// this returns.
    fn shutdown(&mut self, _context: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Allow downcasting to concrete module types
    fn as_any(&self) -> &dyn Any;
}
