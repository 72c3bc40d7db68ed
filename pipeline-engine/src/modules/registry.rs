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
//! Module registry
//!
//! This module provides the registry for managing modules, including:
//! - Static registration via direct API calls
//! - Dependency resolution and circular dependency detection
//! - Version compatibility checking
//! - Ownership of the systems and groups each module registers

use crate::ecs::World;
use crate::error::ModuleError;
use crate::modules::api::{Module, ModuleContext, MODULE_API_VERSION};
use crate::pipeline::Pipeline;
use semver::Version;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

/// Registry that boots modules in dependency order
pub struct ModuleRegistry {
    /// Registered modules indexed by name
    modules: BTreeMap<String, Box<dyn Module>>,
    /// Startup order (topologically sorted by dependencies)
    load_order: Vec<String>,
    /// Whether the modules have been started
    started: bool,
}

impl ModuleRegistry {
    /// Create a new module registry
    pub fn new() -> Self {
        ModuleRegistry {
            modules: BTreeMap::new(),
            load_order: Vec::new(),
            started: false,
        }
    }

    /// Register a module
    ///
    /// # Errors
    ///
    /// - A module with the same name is already registered
    /// - The module API version is incompatible
    /// - The registry has already been started
    pub fn register(&mut self, module: Box<dyn Module>) -> Result<(), ModuleError> {
        if self.started {
            return Err(ModuleError::Lifecycle("already started"));
        }

        let name = module.name().to_string();
        if self.modules.contains_key(&name) {
            return Err(ModuleError::AlreadyRegistered(name));
        }

        let module_api = module.api_version();
        if !is_version_compatible(module_api, MODULE_API_VERSION) {
            return Err(ModuleError::IncompatibleApi {
                name,
                module_api: module_api.to_string(),
                engine_api: MODULE_API_VERSION.to_string(),
            });
        }

        debug!(module = %name, version = module.version(), "registered module");
        self.modules.insert(name, module);
        Ok(())
    }

    /// Start every module in dependency order
    ///
    /// Groups and systems a module registers are attributed to it. If a
    /// module fails, whatever it registered is removed and the modules
    /// already started are shut down again in reverse order before the
    /// error is returned.
    pub fn startup_all(&mut self, pipeline: &mut Pipeline, world: &mut World) -> Result<(), ModuleError> {
        if self.started {
            return Err(ModuleError::Lifecycle("already started"));
        }

        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, module) in &self.modules {
            let deps: Vec<String> = module.dependencies().iter().map(|s| s.to_string()).collect();
            for dep in &deps {
                if !self.modules.contains_key(dep) {
                    return Err(ModuleError::MissingDependency {
                        module: name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            dependencies.insert(name.clone(), deps);
        }
        self.load_order = topological_sort(&dependencies)?;

        let order = self.load_order.clone();
        for (index, name) in order.iter().enumerate() {
            let Some(module) = self.modules.get_mut(name) else {
                continue;
            };
            pipeline.set_owner(Some(name.clone()));
            let result = module.startup(&mut ModuleContext::new(name, pipeline, world));
            pipeline.set_owner(None);

            if let Err(err) = result {
                pipeline.remove_owned(name);
                for started in order[..index].iter().rev() {
                    self.stop_module(started, pipeline, world).ok();
                }
                return Err(failure(name, err));
            }
            info!(module = %name, "module started");
        }

        self.started = true;
        Ok(())
    }

    /// Shut every module down in reverse startup order
    ///
    /// Each module's systems and groups are removed after its `shutdown`
    /// hook ran, even when the hook fails. The first failure is returned
    /// once every module has been shut down.
    pub fn shutdown_all(&mut self, pipeline: &mut Pipeline, world: &mut World) -> Result<(), ModuleError> {
        if !self.started {
            return Ok(());
        }

        let mut first_error = None;
        for name in self.load_order.clone().iter().rev() {
            if let Err(err) = self.stop_module(name, pipeline, world) {
                first_error.get_or_insert(err);
            }
        }

        self.started = false;
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn stop_module(&mut self, name: &str, pipeline: &mut Pipeline, world: &mut World) -> Result<(), ModuleError> {
        let result = match self.modules.get_mut(name) {
            Some(module) => module.shutdown(&mut ModuleContext::new(name, pipeline, world)),
            None => Ok(()),
        };
        let (systems, groups) = pipeline.remove_owned(name);
        info!(module = name, systems, groups, "module shut down");
        result.map_err(|err| failure(name, err))
    }

    /// Get a module by name
    pub fn get(&self, name: &str) -> Option<&dyn Module> {
        self.modules.get(name).map(|m| m.as_ref())
    }

    /// Get a module by name and concrete type
    pub fn get_as<M: Module + 'static>(&self, name: &str) -> Option<&M> {
        self.get(name)?.as_any().downcast_ref::<M>()
    }

    /// Get the number of registered modules
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Check if the modules are running
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Names of the modules in the order they were started
    pub fn load_order(&self) -> &[String] {
        &self.load_order
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Attribute a lifecycle error to `module`, unless it already is
fn failure(module: &str, err: ModuleError) -> ModuleError {
    match err {
        ModuleError::Failed { .. } => err,
        other => ModuleError::Failed {
            module: module.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Check if a module API version is compatible with the engine
///
/// Uses semantic versioning rules:
/// - Major version must match
/// - For major version 0.x.y, minor versions must match (breaking changes)
/// - For major version >= 1, minor version can be less than or equal
/// - Patch version is ignored
fn is_version_compatible(module_version: &str, engine_version: &str) -> bool {
    let (Ok(module_ver), Ok(engine_ver)) =
        (Version::parse(module_version), Version::parse(engine_version))
    else {
        return false;
    };

    if module_ver.major != engine_ver.major {
        return false;
    }
    if module_ver.major != 0 {
        module_ver.minor <= engine_ver.minor
    } else {
        module_ver.minor == engine_ver.minor
    }
}

/// Perform topological sort on dependency graph
///
/// Modules with no ordering constraint between them start in name order.
fn topological_sort(dependencies: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>, ModuleError> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for name in dependencies.keys() {
        in_degree.entry(name.as_str()).or_insert(0);
    }
    for (dependent, deps) in dependencies {
        for dep in deps {
            dependents.entry(dep.as_str()).or_default().push(dependent.as_str());
            *in_degree.entry(dependent.as_str()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut sorted = Vec::new();
    while let Some(node) = queue.pop_front() {
        sorted.push(node.to_string());
        if let Some(neighbors) = dependents.get(node) {
            for neighbor in neighbors {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*neighbor);
                    }
                }
            }
        }
    }

    if sorted.len() != dependencies.len() {
        let cycle = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        return Err(ModuleError::CircularDependency(cycle));
    }

    Ok(sorted)
}
