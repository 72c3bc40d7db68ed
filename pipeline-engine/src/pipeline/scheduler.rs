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
//! Pipeline scheduler
//!
//! Groups execute strictly one after another in ascending sequence order,
//! providing a deterministic frame. Within a group, systems run in
//! registration order; consecutive job systems are handed to the job
//! backend together and joined before the next non-job system. Deferred
//! commands recorded during a group are applied once, after its last
//! system.

use crate::config::PipelineConfig;
use crate::ecs::{EntityQueueId, World};
use crate::error::PipelineError;
use crate::pipeline::builder::SystemBuilder;
use crate::pipeline::group::{groups, FixedAdvance, Group, GroupHandle, GroupTiming, RunEnv};
use crate::pipeline::info::{GroupInfo, PipelineReport, SystemInfo};
use crate::pipeline::jobs::{InlineJobs, JobBackend};
use crate::pipeline::system::{StreamSetup, System, SystemId, SystemShape, TickInfo};
use crate::pool::CommandBufferPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ordered set of pipeline groups and the systems registered in them
///
/// # Examples
///
/// ```
/// use pipeline_engine::ecs::World;
/// use pipeline_engine::pipeline::{groups, Pipeline};
///
/// let mut world = World::new();
/// let mut pipeline = Pipeline::with_default_groups(Default::default()).unwrap();
/// pipeline
///     .system("hello")
///     .in_group(groups::UPDATE)
///     .execute(|ctx| assert!(ctx.delta() > 0.0))
///     .unwrap();
///
/// pipeline.run_tick(&mut world, 1.0 / 60.0);
/// assert_eq!(pipeline.tick(), 1);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    backend: Arc<dyn JobBackend>,
    pool: CommandBufferPool,
    groups: Vec<Option<Group>>,
    order: Vec<GroupHandle>,
    group_names: HashMap<String, GroupHandle>,
    system_names: HashMap<String, SystemId>,
    system_groups: HashMap<SystemId, GroupHandle>,
    queue_subscribers: HashMap<EntityQueueId, SystemId>,
    pending_streams: Vec<StreamSetup>,
    next_system: u64,
    tick: u64,
    owner: Option<String>,
}

impl Pipeline {
    /// Create an empty pipeline with default configuration and inline jobs
    pub fn new() -> Self {
        Self::with_backend(PipelineConfig::default(), Arc::new(InlineJobs))
    }

    /// Create an empty pipeline with `config` and inline jobs
    pub fn with_config(config: PipelineConfig) -> Self {
        Self::with_backend(config, Arc::new(InlineJobs))
    }

    /// Create an empty pipeline with an injected job backend
    pub fn with_backend(config: PipelineConfig, backend: Arc<dyn JobBackend>) -> Self {
        Pipeline {
            pool: CommandBufferPool::with_config(config.command_pool.clone()),
            config,
            backend,
            groups: Vec::new(),
            order: Vec::new(),
            group_names: HashMap::new(),
            system_names: HashMap::new(),
            system_groups: HashMap::new(),
            queue_subscribers: HashMap::new(),
            pending_streams: Vec::new(),
            next_system: 0,
            tick: 0,
            owner: None,
        }
    }

    /// Create a pipeline holding the ten standard groups
    pub fn with_default_groups(config: PipelineConfig) -> Result<Self, PipelineError> {
        let mut pipeline = Self::with_config(config);
        pipeline.define_default_groups()?;
        Ok(pipeline)
    }

    /// Define the ten standard groups, sequence 1 to 10
    ///
    /// FixedUpdate runs at the configured fixed rate.
    pub fn define_default_groups(&mut self) -> Result<(), PipelineError> {
        for (name, sequence, timing) in groups::standard(self.config.fixed_update_rate) {
            self.define_group(name, sequence, timing)?;
        }
        Ok(())
    }

    /// Replace the job backend
    pub fn set_backend(&mut self, backend: Arc<dyn JobBackend>) {
        self.backend = backend;
    }

    /// The job backend in use
    pub fn backend(&self) -> &dyn JobBackend {
        self.backend.as_ref()
    }

    /// Configuration the pipeline was built with
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Pool of command buffers used by job systems
    pub fn command_pool(&self) -> &CommandBufferPool {
        &self.pool
    }

    /// Number of completed ticks
    pub fn tick(&self) -> u64 {
        self.tick
    }

    // --- groups ---------------------------------------------------------

    /// Define a group
    ///
    /// # Errors
    ///
    /// Fails if the name or the sequence number is taken, if a fixed rate
    /// is not a positive, finite number of seconds, or if it is longer than
    /// the configured backlog ceiling.
    pub fn define_group(
        &mut self,
        name: &str,
        sequence: u32,
        timing: GroupTiming,
    ) -> Result<GroupHandle, PipelineError> {
        if self.group_names.contains_key(name) {
            return Err(PipelineError::DuplicateGroupName(name.to_string()));
        }
        if let Some(existing) = self.live_groups().find(|g| g.sequence == sequence) {
            return Err(PipelineError::DuplicateSequence {
                name: name.to_string(),
                sequence,
                existing: existing.name.clone(),
            });
        }
        if let GroupTiming::Fixed { rate } = timing {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(PipelineError::InvalidRate {
                    name: name.to_string(),
                    rate,
                });
            }
            if rate > self.config.max_fixed_backlog {
                return Err(PipelineError::RateExceedsBacklog {
                    name: name.to_string(),
                    rate,
                    max_backlog: self.config.max_fixed_backlog,
                });
            }
        }

        let handle = GroupHandle(self.groups.len());
        self.groups.push(Some(Group::new(
            name.to_string(),
            sequence,
            timing,
            self.owner.clone(),
        )));
        self.group_names.insert(name.to_string(), handle);

        let groups = &self.groups;
        let position = self
            .order
            .partition_point(|h| sequence_of(groups, *h) < sequence);
        self.order.insert(position, handle);

        info!(group = name, sequence, ?timing, "defined pipeline group");
        Ok(handle)
    }

    /// Remove a group together with all of its systems
    ///
    /// Returns the number of systems dropped.
    pub fn remove_group(&mut self, handle: GroupHandle) -> Result<usize, PipelineError> {
        let group = self
            .groups
            .get_mut(handle.0)
            .and_then(Option::take)
            .ok_or_else(|| PipelineError::UnknownGroup(handle.to_string()))?;
        self.order.retain(|h| *h != handle);
        self.group_names.remove(&group.name);
        for system in &group.systems {
            self.forget_system(system);
        }
        info!(group = %group.name, systems = group.systems.len(), "removed pipeline group");
        Ok(group.systems.len())
    }

    /// Look up a group by name
    pub fn group(&self, name: &str) -> Option<GroupHandle> {
        self.group_names.get(name).copied()
    }

    /// Look up a group by name, failing with [`PipelineError::UnknownGroup`]
    pub fn require_group(&self, name: &str) -> Result<GroupHandle, PipelineError> {
        self.group(name)
            .ok_or_else(|| PipelineError::UnknownGroup(name.to_string()))
    }

    /// Describe a group
    pub fn group_info(&self, handle: GroupHandle) -> Option<GroupInfo> {
        self.get_group(handle).map(|g| GroupInfo::new(handle, g))
    }

    /// Every group in sequence order
    pub fn groups(&self) -> Vec<GroupInfo> {
        self.order
            .iter()
            .filter_map(|h| self.group_info(*h))
            .collect()
    }

    /// Install a hook called before a group's systems run
    pub fn on_group_begin(
        &mut self,
        handle: GroupHandle,
        hook: impl FnMut(&str, &TickInfo) + Send + 'static,
    ) -> Result<(), PipelineError> {
        self.get_group_mut(handle)?.on_begin = Some(Box::new(hook));
        Ok(())
    }

    /// Install a hook called after a group's commands were applied
    pub fn on_group_end(
        &mut self,
        handle: GroupHandle,
        hook: impl FnMut(&str, &TickInfo) + Send + 'static,
    ) -> Result<(), PipelineError> {
        self.get_group_mut(handle)?.on_end = Some(Box::new(hook));
        Ok(())
    }

    // --- systems --------------------------------------------------------

    /// Start registering a system called `name`
    pub fn system(&mut self, name: impl Into<String>) -> SystemBuilder<'_> {
        SystemBuilder::new(self, name.into())
    }

    /// Look up a system by name
    pub fn lookup_system(&self, name: &str) -> Option<SystemId> {
        self.system_names.get(name).copied()
    }

    /// Describe a system
    pub fn system_info(&self, id: SystemId) -> Option<SystemInfo> {
        let handle = self.system_groups.get(&id)?;
        let group = self.get_group(*handle)?;
        let system = group.systems.iter().find(|s| s.id == id)?;
        Some(SystemInfo::new(system, group))
    }

    /// Every system in execution order
    pub fn systems(&self) -> Vec<SystemInfo> {
        self.order
            .iter()
            .filter_map(|h| self.get_group(*h))
            .flat_map(|g| g.systems.iter().map(move |s| SystemInfo::new(s, g)))
            .collect()
    }

    /// Number of registered systems
    pub fn system_count(&self) -> usize {
        self.system_names.len()
    }

    /// Remove a system
    ///
    /// A system registered later under the same name runs at the end of
    /// its group.
    pub fn remove_system(&mut self, id: SystemId) -> Result<(), PipelineError> {
        let handle = self
            .system_groups
            .get(&id)
            .copied()
            .ok_or_else(|| PipelineError::UnknownSystem(id.to_string()))?;
        let group = self.get_group_mut(handle)?;
        let position = group
            .position(id)
            .ok_or_else(|| PipelineError::UnknownSystem(id.to_string()))?;
        let system = group.systems.remove(position);
        self.forget_system(&system);
        debug!(system = %system.name, "removed system");
        Ok(())
    }

    /// Switch a system on or off
    pub fn set_enabled(&mut self, id: SystemId, enabled: bool) -> Result<(), PipelineError> {
        let system = self
            .find_system_mut(id)
            .ok_or_else(|| PipelineError::UnknownSystem(id.to_string()))?;
        system.enabled = enabled;
        Ok(())
    }

    /// Name of the system draining `queue`
    pub fn queue_subscriber(&self, queue: EntityQueueId) -> Option<&str> {
        let id = self.queue_subscribers.get(&queue)?;
        let handle = self.system_groups.get(id)?;
        let group = self.get_group(*handle)?;
        group
            .systems
            .iter()
            .find(|s| s.id == *id)
            .map(|s| s.name.as_str())
    }

    /// Snapshot of every group and system, for diagnostics
    pub fn report(&self) -> PipelineReport {
        PipelineReport {
            tick: self.tick,
            backend: self.backend.name().to_string(),
            groups: self.groups(),
            systems: self.systems(),
        }
    }

    // --- execution ------------------------------------------------------

    /// Run one frame: every group in sequence order, then stream
    /// maintenance
    ///
    /// Variable groups run once with `delta`. Fixed groups add `delta` to
    /// their accumulator and run once per whole step, each run seeing the
    /// step rate as its delta. A fixed group whose backlog exceeds the
    /// configured ceiling discards it and does not run this tick.
    ///
    /// Panics raised by systems propagate to the caller.
    pub fn run_tick(&mut self, world: &mut World, delta: f64) {
        self.register_pending_streams(world);
        let max_backlog = self.config.max_fixed_backlog;
        let Pipeline {
            groups,
            order,
            backend,
            pool,
            tick,
            ..
        } = self;

        for handle in order.iter() {
            let Some(group) = groups.get_mut(handle.0).and_then(Option::as_mut) else {
                continue;
            };
            let mut env = RunEnv {
                backend: &**backend,
                pool: &*pool,
                info: TickInfo {
                    tick: *tick,
                    delta,
                    fixed_step: None,
                },
            };

            let Some(mut step) = group.fixed else {
                group.run(world, &env);
                continue;
            };
            match step.advance(delta, max_backlog) {
                FixedAdvance::Steps(steps) => {
                    env.info.delta = step.rate();
                    for index in 0..steps {
                        env.info.fixed_step = Some(index);
                        group.run(world, &env);
                    }
                }
                FixedAdvance::Dropped { backlog } => {
                    warn!(
                        group = %group.name,
                        backlog,
                        max_backlog,
                        "fixed-step backlog exceeded ceiling; dropping accumulated time"
                    );
                }
            }
            group.fixed = Some(step);
        }

        world.end_tick();
        self.tick += 1;
    }

    /// Run a single group once with `delta`, outside the frame loop
    ///
    /// Fixed groups run exactly one step and their accumulator is left
    /// untouched.
    pub fn run_group(
        &mut self,
        world: &mut World,
        handle: GroupHandle,
        delta: f64,
    ) -> Result<(), PipelineError> {
        self.register_pending_streams(world);
        let Pipeline {
            groups,
            backend,
            pool,
            tick,
            ..
        } = self;
        let group = groups
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| PipelineError::UnknownGroup(handle.to_string()))?;
        let env = RunEnv {
            backend: &**backend,
            pool: &*pool,
            info: TickInfo {
                tick: *tick,
                delta: group.fixed.map_or(delta, |step| step.rate()),
                fixed_step: group.fixed.map(|_| 0),
            },
        };
        group.run(world, &env);
        Ok(())
    }

    // --- crate internals ------------------------------------------------

    pub(crate) fn next_system_id(&mut self) -> SystemId {
        let id = SystemId(self.next_system);
        self.next_system += 1;
        id
    }

    pub(crate) fn current_owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Attribute groups and systems defined from now on to `owner`
    pub(crate) fn set_owner(&mut self, owner: Option<String>) {
        self.owner = owner;
    }

    pub(crate) fn insert_system(
        &mut self,
        handle: GroupHandle,
        system: System,
        streams: Vec<StreamSetup>,
    ) -> Result<SystemId, PipelineError> {
        let id = system.id;
        let name = system.name.clone();
        let queue = match system.kind.shape() {
            SystemShape::EntityQueue(queue) => Some(queue),
            _ => None,
        };
        let group = self.get_group_mut(handle)?;
        debug!(
            system = %name,
            group = %group.name,
            shape = %system.kind.shape(),
            job = system.job,
            "registered system"
        );
        group.systems.push(system);

        self.system_names.insert(name, id);
        self.system_groups.insert(id, handle);
        if let Some(queue) = queue {
            self.queue_subscribers.insert(queue, id);
        }
        self.pending_streams.extend(streams);
        Ok(id)
    }

    /// Remove every system and group attributed to `owner`
    pub(crate) fn remove_owned(&mut self, owner: &str) -> (usize, usize) {
        let owned: Vec<SystemId> = self
            .live_groups()
            .flat_map(|g| g.systems.iter())
            .filter(|s| s.owner.as_deref() == Some(owner))
            .map(|s| s.id)
            .collect();
        let mut systems = 0;
        for id in owned {
            if self.remove_system(id).is_ok() {
                systems += 1;
            }
        }

        let owned_groups: Vec<GroupHandle> = self
            .order
            .iter()
            .copied()
            .filter(|h| {
                self.get_group(*h)
                    .is_some_and(|g| g.owner.as_deref() == Some(owner))
            })
            .collect();
        let mut groups = 0;
        for handle in owned_groups {
            if let Ok(dropped) = self.remove_group(handle) {
                systems += dropped;
                groups += 1;
            }
        }
        (systems, groups)
    }

    fn register_pending_streams(&mut self, world: &mut World) {
        world.set_max_event_age(self.config.max_event_age);
        for register in self.pending_streams.drain(..) {
            register(world);
        }
    }

    fn forget_system(&mut self, system: &System) {
        self.system_names.remove(&system.name);
        self.system_groups.remove(&system.id);
        self.queue_subscribers.retain(|_, id| *id != system.id);
    }

    fn live_groups(&self) -> impl Iterator<Item = &Group> + '_ {
        self.groups.iter().flatten()
    }

    fn get_group(&self, handle: GroupHandle) -> Option<&Group> {
        self.groups.get(handle.0).and_then(Option::as_ref)
    }

    fn get_group_mut(&mut self, handle: GroupHandle) -> Result<&mut Group, PipelineError> {
        self.groups
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| PipelineError::UnknownGroup(handle.to_string()))
    }

    fn find_system_mut(&mut self, id: SystemId) -> Option<&mut System> {
        let handle = *self.system_groups.get(&id)?;
        self.groups
            .get_mut(handle.0)?
            .as_mut()?
            .systems
            .iter_mut()
            .find(|s| s.id == id)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn sequence_of(groups: &[Option<Group>], handle: GroupHandle) -> u32 {
    groups
        .get(handle.0)
        .and_then(Option::as_ref)
        .map_or(u32::MAX, |g| g.sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SystemContext;
    use std::sync::{Arc, Mutex};

    type Recorded = Box<dyn FnMut(&mut SystemContext<'_>) + Send>;
    type Log = Arc<Mutex<Vec<String>>>;

    fn boxed(f: impl FnMut(&mut SystemContext<'_>) + Send + 'static) -> Recorded {
        Box::new(f)
    }

    fn record(log: &Log, label: &str) -> Recorded {
        let log = Arc::clone(log);
        let label = label.to_string();
        boxed(move |_| log.lock().unwrap().push(label.clone()))
    }

    #[test]
    fn test_duplicate_sequence_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.define_group("A", 1, GroupTiming::Variable).unwrap();
        let err = pipeline
            .define_group("B", 1, GroupTiming::Variable)
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateSequence { sequence: 1, .. }));
        assert!(err.to_string().contains("'A'"));
    }

    #[test]
    fn test_duplicate_group_name_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.define_group("A", 1, GroupTiming::Variable).unwrap();
        assert!(matches!(
            pipeline.define_group("A", 2, GroupTiming::Variable),
            Err(PipelineError::DuplicateGroupName(_))
        ));
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let mut pipeline = Pipeline::new();
        for rate in [0.0, -0.5, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                pipeline.define_group("Fixed", 1, GroupTiming::fixed(rate)),
                Err(PipelineError::InvalidRate { .. })
            ));
        }
    }

    #[test]
    fn test_groups_sorted_by_sequence() {
        let mut pipeline = Pipeline::new();
        pipeline.define_group("Late", 20, GroupTiming::Variable).unwrap();
        pipeline.define_group("Early", 5, GroupTiming::Variable).unwrap();
        pipeline.define_group("Middle", 10, GroupTiming::Variable).unwrap();
        let names: Vec<_> = pipeline.groups().into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["Early", "Middle", "Late"]);
    }

    #[test]
    fn test_systems_run_in_registration_order() {
        let log = Log::default();
        let mut world = World::new();
        let mut pipeline = Pipeline::new();
        pipeline.define_group("Update", 1, GroupTiming::Variable).unwrap();
        for label in ["first", "second", "third"] {
            pipeline
                .system(label)
                .in_group("Update")
                .execute(record(&log, label))
                .unwrap();
        }
        pipeline.run_tick(&mut world, 0.016);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_readded_system_runs_last() {
        let log = Log::default();
        let mut world = World::new();
        let mut pipeline = Pipeline::new();
        pipeline.define_group("Update", 1, GroupTiming::Variable).unwrap();
        let a = pipeline.system("a").in_group("Update").execute(record(&log, "a")).unwrap();
        pipeline.system("b").in_group("Update").execute(record(&log, "b")).unwrap();

        pipeline.remove_system(a).unwrap();
        assert!(pipeline.lookup_system("a").is_none());
        pipeline.system("a").in_group("Update").execute(record(&log, "a")).unwrap();

        pipeline.run_tick(&mut world, 0.016);
        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn test_disabled_system_does_not_run() {
        let log = Log::default();
        let mut world = World::new();
        let mut pipeline = Pipeline::new();
        pipeline.define_group("Update", 1, GroupTiming::Variable).unwrap();
        let id = pipeline
            .system("quiet")
            .in_group("Update")
            .disabled()
            .execute(record(&log, "quiet"))
            .unwrap();
        pipeline.run_tick(&mut world, 0.016);
        assert!(log.lock().unwrap().is_empty());

        pipeline.set_enabled(id, true).unwrap();
        pipeline.run_tick(&mut world, 0.016);
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(pipeline.system_info(id).unwrap().stats.runs, 1);
    }

    #[test]
    fn test_remove_group_drops_its_systems() {
        let log = Log::default();
        let mut pipeline = Pipeline::new();
        let handle = pipeline.define_group("Update", 1, GroupTiming::Variable).unwrap();
        pipeline.system("a").in_group("Update").execute(record(&log, "a")).unwrap();
        assert_eq!(pipeline.remove_group(handle).unwrap(), 1);
        assert!(pipeline.group("Update").is_none());
        assert!(pipeline.lookup_system("a").is_none());
        assert!(pipeline.remove_group(handle).is_err());

        // The sequence number is free again.
        pipeline.define_group("Other", 1, GroupTiming::Variable).unwrap();
    }

    #[test]
    fn test_unknown_system_operations() {
        let mut pipeline = Pipeline::new();
        assert!(matches!(
            pipeline.remove_system(SystemId(99)),
            Err(PipelineError::UnknownSystem(_))
        ));
        assert!(pipeline.set_enabled(SystemId(99), false).is_err());
        assert!(pipeline.require_group("Missing").is_err());
    }

    #[test]
    fn test_hooks_bracket_group_run() {
        let log = Log::default();
        let mut world = World::new();
        let mut pipeline = Pipeline::new();
        let handle = pipeline.define_group("Update", 1, GroupTiming::Variable).unwrap();
        pipeline.system("body").in_group("Update").execute(record(&log, "body")).unwrap();

        let begin_log = Arc::clone(&log);
        pipeline
            .on_group_begin(handle, move |name, _| begin_log.lock().unwrap().push(format!("begin {}", name)))
            .unwrap();
        let end_log = Arc::clone(&log);
        pipeline
            .on_group_end(handle, move |name, _| end_log.lock().unwrap().push(format!("end {}", name)))
            .unwrap();

        pipeline.run_tick(&mut world, 0.016);
        assert_eq!(*log.lock().unwrap(), vec!["begin Update", "body", "end Update"]);
    }

    #[test]
    fn test_run_group_directly() {
        let log = Log::default();
        let mut world = World::new();
        let mut pipeline = Pipeline::new();
        let handle = pipeline.define_group("Fixed", 1, GroupTiming::fixed(0.5)).unwrap();
        pipeline
            .system("step")
            .in_group_handle(handle)
            .execute(record(&log, "step"))
            .unwrap();
        pipeline.run_group(&mut world, handle, 0.016).unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(pipeline.group_info(handle).unwrap().accumulator, 0.0);
    }
}
