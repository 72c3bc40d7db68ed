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
//! Engine facade
//!
//! Ties a [`World`], a [`Pipeline`] holding the standard groups and a
//! [`ModuleRegistry`] together. The host loop polls its own events,
//! measures the frame's delta time and calls [`Engine::tick`].

use crate::config::PipelineConfig;
use crate::ecs::World;
use crate::error::{ModuleError, PipelineError};
use crate::modules::{Module, ModuleRegistry};
use crate::pipeline::{default_backend, JobBackend, Pipeline};
use std::sync::Arc;
use tracing::info;

/// World, pipeline and modules of one running engine
pub struct Engine {
    world: World,
    pipeline: Pipeline,
    modules: ModuleRegistry,
}

impl Engine {
    /// Create an engine with the standard groups and the default job
    /// backend
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let backend = default_backend(config.job_threads);
        Self::with_backend(config, backend)
    }

    /// Create an engine with the standard groups and an injected job
    /// backend
    pub fn with_backend(
        config: PipelineConfig,
        backend: Arc<dyn JobBackend>,
    ) -> Result<Self, PipelineError> {
        let mut pipeline = Pipeline::with_backend(config, backend);
        pipeline.define_default_groups()?;
        Ok(Engine {
            world: World::new(),
            pipeline,
            modules: ModuleRegistry::new(),
        })
    }

    /// Register a module to be started by [`Engine::startup`]
    pub fn add_module(&mut self, module: impl Module + 'static) -> Result<(), ModuleError> {
        self.modules.register(Box::new(module))
    }

    /// Start every registered module in dependency order
    pub fn startup(&mut self) -> Result<(), ModuleError> {
        self.modules.startup_all(&mut self.pipeline, &mut self.world)?;
        info!(
            modules = self.modules.module_count(),
            systems = self.pipeline.system_count(),
            backend = self.pipeline.backend().name(),
            "engine started"
        );
        Ok(())
    }

    /// Run one frame covering `delta` seconds
    pub fn tick(&mut self, delta: f64) {
        self.pipeline.run_tick(&mut self.world, delta);
    }

    /// Shut every module down in reverse order
    pub fn shutdown(&mut self) -> Result<(), ModuleError> {
        let result = self.modules.shutdown_all(&mut self.pipeline, &mut self.world);
        info!(ticks = self.pipeline.tick(), "engine shut down");
        result
    }

    /// The world
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The world, mutably
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The pipeline
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The pipeline, mutably
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// The module registry
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::ModuleContext;
    use crate::pipeline::{groups, InlineJobs};
    use std::any::Any;

    struct Counter {
        ticks: u64,
    }

    struct CountingModule;

    impl Module for CountingModule {
        fn name(&self) -> &str {
            "counting"
        }

        fn startup(&mut self, context: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
            context.world().insert_resource(Counter { ticks: 0 });
            context
                .system("count_ticks")
                .in_group(groups::POST_FRAME)
                .execute(|ctx| {
                    if let Some(mut counter) = ctx.resource_mut::<Counter>() {
                        counter.ticks += 1;
                    }
                })?;
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_engine_lifecycle() {
        let mut engine =
            Engine::with_backend(PipelineConfig::default(), Arc::new(InlineJobs)).unwrap();
        assert_eq!(engine.pipeline().groups().len(), 10);

        engine.add_module(CountingModule).unwrap();
        engine.startup().unwrap();
        for _ in 0..3 {
            engine.tick(1.0 / 60.0);
        }
        assert_eq!(engine.world().resource::<Counter>().unwrap().ticks, 3);

        engine.shutdown().unwrap();
        assert!(engine.pipeline().lookup_system("count_ticks").is_none());
        engine.tick(1.0 / 60.0);
        assert_eq!(engine.world().resource::<Counter>().unwrap().ticks, 3);
    }

    #[test]
    fn test_engine_with_default_backend() {
        let mut engine = Engine::new(PipelineConfig::default().with_job_threads(2)).unwrap();
        engine.startup().unwrap();
        engine.tick(0.1);
        assert_eq!(engine.pipeline().tick(), 1);
    }
}
