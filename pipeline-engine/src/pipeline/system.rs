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
//! Registered systems and the context they run with
//!
//! A system is one of four execution shapes:
//! - `Execute`: called once per group run
//! - `Stream`: called once per unseen event of a stream, may veto it
//! - `Query`: called once per entity matching a component query
//! - `EntityQueue`: called once per entity drained from its queue

use crate::ecs::{CommandBuffer, Component, ComponentInfo, Entity, EntityQueueId, World};
use std::fmt;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Opaque handle to a registered system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemId(pub(crate) u64);

impl SystemId {
    /// Raw handle value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "System({})", self.0)
    }
}

/// Timing of the current group run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInfo {
    /// Number of completed ticks before this one
    pub tick: u64,
    /// Seconds covered by this run; the step rate in fixed groups
    pub delta: f64,
    /// Index of the step within this tick, for fixed groups
    pub fixed_step: Option<u32>,
}

/// Runtime statistics of a system
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemStats {
    /// Callback invocations (events, entities or plain runs)
    pub count: u64,
    /// Times the system's group ran it
    pub runs: u64,
    /// Total time spent inside the system
    pub execution_time: Duration,
}

impl SystemStats {
    fn record(&mut self, count: u64, elapsed: Duration) {
        self.count += count;
        self.runs += 1;
        self.execution_time += elapsed;
    }
}

/// Execution shape of a system, as shown in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemShape {
    /// Runs once per group run
    Execute,
    /// Consumes a stream of events
    Stream(ComponentInfo),
    /// Iterates a component query
    Query,
    /// Drains an entity queue
    EntityQueue(EntityQueueId),
}

impl fmt::Display for SystemShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemShape::Execute => f.write_str("execute"),
            SystemShape::Stream(event) => write!(f, "stream<{}>", event),
            SystemShape::Query => f.write_str("query"),
            SystemShape::EntityQueue(queue) => write!(f, "queue[{}]", queue.index()),
        }
    }
}

pub(crate) type ExecuteFn = Box<dyn FnMut(&mut SystemContext<'_>) + Send>;
pub(crate) type RunFn = Box<dyn FnMut(&mut SystemContext<'_>) -> u64 + Send>;
pub(crate) type QueryFn = Box<dyn for<'w> FnMut(&'w World, &mut SystemContext<'w>) -> u64 + Send>;
/// Stream registration a system needs before its first run
pub(crate) type StreamSetup = Box<dyn FnOnce(&mut World) + Send>;

pub(crate) enum SystemKind {
    Execute(ExecuteFn),
    Stream { event: ComponentInfo, run: RunFn },
    Query(QueryFn),
    EntityQueue { queue: EntityQueueId, run: RunFn },
}

impl SystemKind {
    pub(crate) fn shape(&self) -> SystemShape {
        match self {
            SystemKind::Execute(_) => SystemShape::Execute,
            SystemKind::Stream { event, .. } => SystemShape::Stream(*event),
            SystemKind::Query(_) => SystemShape::Query,
            SystemKind::EntityQueue { queue, .. } => SystemShape::EntityQueue(*queue),
        }
    }
}

pub(crate) struct System {
    pub(crate) id: SystemId,
    pub(crate) name: String,
    pub(crate) reads: Vec<ComponentInfo>,
    pub(crate) writes: Vec<ComponentInfo>,
    pub(crate) stream_writes: Vec<ComponentInfo>,
    pub(crate) job: bool,
    pub(crate) enabled: bool,
    pub(crate) owner: Option<String>,
    pub(crate) stats: SystemStats,
    pub(crate) kind: SystemKind,
}

impl System {
    /// Run on the calling thread with exclusive world access
    ///
    /// Query systems still see the world through a shared reference, since
    /// their column locks are held while the callback runs.
    pub(crate) fn run_exclusive(
        &mut self,
        world: &mut World,
        commands: &mut CommandBuffer,
        info: TickInfo,
    ) {
        let start = Instant::now();
        let count = match &mut self.kind {
            SystemKind::Execute(f) => {
                f(&mut SystemContext::exclusive(world, commands, info, &self.name));
                1
            }
            SystemKind::Stream { run, .. } | SystemKind::EntityQueue { run, .. } => {
                run(&mut SystemContext::exclusive(world, commands, info, &self.name))
            }
            SystemKind::Query(run) => {
                let world: &World = world;
                run(world, &mut SystemContext::shared(world, commands, info, &self.name))
            }
        };
        self.stats.record(count, start.elapsed());
    }

    /// Run with shared world access, possibly on a worker thread
    pub(crate) fn run_shared(&mut self, world: &World, commands: &mut CommandBuffer, info: TickInfo) {
        let start = Instant::now();
        let count = match &mut self.kind {
            SystemKind::Execute(f) => {
                f(&mut SystemContext::shared(world, commands, info, &self.name));
                1
            }
            SystemKind::Stream { run, .. } | SystemKind::EntityQueue { run, .. } => {
                run(&mut SystemContext::shared(world, commands, info, &self.name))
            }
            SystemKind::Query(run) => {
                run(world, &mut SystemContext::shared(world, commands, info, &self.name))
            }
        };
        self.stats.record(count, start.elapsed());
    }
}

enum WorldAccess<'w> {
    Exclusive(&'w mut World),
    Shared(&'w World),
}

/// What a system callback gets to work with
///
/// Structural changes made through the deferred helpers (`spawn`,
/// `destroy`, `add`, `set`, `remove`) become visible once the current
/// group finishes. Systems that run on the calling thread may also get
/// direct mutable access through [`SystemContext::world_mut`].
///
/// Job systems lock columns through [`World::read`] and [`World::write`]
/// while other jobs of the batch do the same. Lock several columns in one
/// consistent order across those systems; see [`World::write`].
pub struct SystemContext<'w> {
    world: WorldAccess<'w>,
    commands: &'w mut CommandBuffer,
    info: TickInfo,
    system: &'w str,
}

impl<'w> SystemContext<'w> {
    pub(crate) fn exclusive(
        world: &'w mut World,
        commands: &'w mut CommandBuffer,
        info: TickInfo,
        system: &'w str,
    ) -> Self {
        SystemContext {
            world: WorldAccess::Exclusive(world),
            commands,
            info,
            system,
        }
    }

    pub(crate) fn shared(
        world: &'w World,
        commands: &'w mut CommandBuffer,
        info: TickInfo,
        system: &'w str,
    ) -> Self {
        SystemContext {
            world: WorldAccess::Shared(world),
            commands,
            info,
            system,
        }
    }

    /// Shared access to the world
    pub fn world(&self) -> &World {
        match &self.world {
            WorldAccess::Exclusive(world) => &**world,
            WorldAccess::Shared(world) => &**world,
        }
    }

    /// Direct mutable access to the world
    ///
    /// `None` for job systems and query callbacks, which only ever hold a
    /// shared reference.
    pub fn world_mut(&mut self) -> Option<&mut World> {
        match &mut self.world {
            WorldAccess::Exclusive(world) => Some(&mut **world),
            WorldAccess::Shared(_) => None,
        }
    }

    /// Whether [`SystemContext::world_mut`] is available
    pub fn is_exclusive(&self) -> bool {
        matches!(self.world, WorldAccess::Exclusive(_))
    }

    /// The command buffer drained at the end of the current group
    pub fn commands(&mut self) -> &mut CommandBuffer {
        &mut *self.commands
    }

    /// Timing of the current run
    pub fn info(&self) -> TickInfo {
        self.info
    }

    /// Seconds covered by the current run
    pub fn delta(&self) -> f64 {
        self.info.delta
    }

    /// Number of completed ticks
    pub fn tick(&self) -> u64 {
        self.info.tick
    }

    /// Name of the running system
    pub fn system_name(&self) -> &str {
        self.system
    }

    /// Reserve an entity now and bring it to life at the group barrier
    pub fn spawn(&mut self) -> Entity {
        let entity = self.world().reserve_entity();
        self.commands.spawn(entity);
        entity
    }

    /// Destroy `entity` at the group barrier
    pub fn destroy(&mut self, entity: Entity) {
        self.commands.destroy(entity);
    }

    /// Add a default `T` to `entity` at the group barrier
    pub fn add<T: Component + Default>(&mut self, entity: Entity) {
        self.commands.add::<T>(entity);
    }

    /// Set `entity`'s `T` at the group barrier
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) {
        self.commands.set(entity, value);
    }

    /// Remove `entity`'s `T` at the group barrier
    pub fn remove<T: Component>(&mut self, entity: Entity) {
        self.commands.remove::<T>(entity);
    }

    /// Push an event to its stream
    ///
    /// With exclusive access the stream is created on first use; otherwise
    /// the event is dropped when the stream was never registered and
    /// `false` is returned.
    pub fn send<E: Send + Sync + 'static>(&mut self, event: E) -> bool {
        match &mut self.world {
            WorldAccess::Exclusive(world) => {
                world.push_event(event);
                true
            }
            WorldAccess::Shared(world) => world.send_event(event),
        }
    }

    /// Post `entity` to an entity queue
    pub fn post(&self, queue: EntityQueueId, entity: Entity) -> bool {
        self.world().post(queue, entity)
    }

    /// Read a resource
    pub fn resource<R: Send + Sync + 'static>(&self) -> Option<RwLockReadGuard<'_, R>> {
        self.world().resource::<R>()
    }

    /// Write a resource
    pub fn resource_mut<R: Send + Sync + 'static>(&self) -> Option<RwLockWriteGuard<'_, R>> {
        self.world().resource_mut::<R>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    fn info() -> TickInfo {
        TickInfo {
            tick: 7,
            delta: 0.016,
            fixed_step: None,
        }
    }

    fn execute_system(f: impl FnMut(&mut SystemContext<'_>) + Send + 'static, job: bool) -> System {
        System {
            id: SystemId(1),
            name: "test".to_string(),
            reads: Vec::new(),
            writes: Vec::new(),
            stream_writes: Vec::new(),
            job,
            enabled: true,
            owner: None,
            stats: SystemStats::default(),
            kind: SystemKind::Execute(Box::new(f)),
        }
    }

    #[test]
    fn test_exclusive_context_allows_world_mut() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let mut system = execute_system(
            |ctx| {
                assert!(ctx.is_exclusive());
                assert_eq!(ctx.tick(), 7);
                assert_eq!(ctx.system_name(), "test");
                let world = ctx.world_mut().unwrap();
                world.create_entity();
            },
            false,
        );
        system.run_exclusive(&mut world, &mut commands, info());
        assert_eq!(world.entity_count(), 1);
        assert_eq!(system.stats.count, 1);
        assert_eq!(system.stats.runs, 1);
    }

    #[test]
    fn test_shared_context_defers_spawn() {
        let world = World::new();
        let mut commands = CommandBuffer::new();
        let mut system = execute_system(
            |ctx| {
                assert!(ctx.world_mut().is_none());
                let entity = ctx.spawn();
                ctx.add::<Health>(entity);
            },
            true,
        );
        system.run_shared(&world, &mut commands, info());
        assert_eq!(world.entity_count(), 0);
        assert_eq!(commands.len(), 2);

        let mut world = world;
        let stats = commands.apply(&mut world);
        assert_eq!(stats.applied, 2);
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_send_registers_stream_with_exclusive_access() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let mut ctx = SystemContext::exclusive(&mut world, &mut commands, info(), "sender");
        assert!(ctx.send(42u32));
        assert_eq!(world.stream::<u32>().map(|s| s.len()), Some(1));

        let mut commands = CommandBuffer::new();
        let mut ctx = SystemContext::shared(&world, &mut commands, info(), "sender");
        assert!(!ctx.send("unregistered"));
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(SystemShape::Execute.to_string(), "execute");
        assert_eq!(SystemShape::Stream(ComponentInfo::of::<Health>()).to_string(), "stream<Health>");
    }
}
