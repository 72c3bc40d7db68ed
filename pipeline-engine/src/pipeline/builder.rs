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
//! Fluent system registration
//!
//! ```
//! use pipeline_engine::ecs::{Component, Read};
//! use pipeline_engine::pipeline::{groups, Pipeline};
//!
//! struct Speed(f32);
//! impl Component for Speed {}
//!
//! let mut pipeline = Pipeline::with_default_groups(Default::default()).unwrap();
//! pipeline
//!     .system("report_speed")
//!     .in_group(groups::UPDATE)
//!     .each::<Read<Speed>, _>(|_ctx, _entity, speed: &Speed| {
//!         assert!(speed.0 >= 0.0);
//!     })
//!     .unwrap();
//! ```

use crate::ecs::{
    duplicate_component, Access, Component, ComponentInfo, Entity, EntityQueueId, Query, World,
};
use crate::error::PipelineError;
use crate::pipeline::group::GroupHandle;
use crate::pipeline::scheduler::Pipeline;
use crate::pipeline::system::{
    QueryFn, RunFn, StreamSetup, System, SystemContext, SystemId, SystemKind, SystemStats,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

enum GroupRef {
    Name(String),
    Handle(GroupHandle),
}

/// Builder returned by [`Pipeline::system`]
///
/// Nothing is registered until one of the finalizers ([`execute`],
/// [`each_event`], [`each`] or [`each_entity`]) is called.
///
/// [`execute`]: SystemBuilder::execute
/// [`each_event`]: SystemBuilder::each_event
/// [`each`]: SystemBuilder::each
/// [`each_entity`]: SystemBuilder::each_entity
#[must_use = "a system is only registered once a finalizer such as `execute` or `each` is called"]
pub struct SystemBuilder<'p> {
    pipeline: &'p mut Pipeline,
    name: String,
    group: Option<GroupRef>,
    reads: Vec<ComponentInfo>,
    writes: Vec<ComponentInfo>,
    stream_writes: Vec<ComponentInfo>,
    streams: Vec<StreamSetup>,
    job: bool,
    enabled: bool,
}

impl<'p> SystemBuilder<'p> {
    pub(crate) fn new(pipeline: &'p mut Pipeline, name: String) -> Self {
        SystemBuilder {
            pipeline,
            name,
            group: None,
            reads: Vec::new(),
            writes: Vec::new(),
            stream_writes: Vec::new(),
            streams: Vec::new(),
            job: false,
            enabled: true,
        }
    }

    /// Run in the group called `name`
    pub fn in_group(mut self, name: &str) -> Self {
        self.group = Some(GroupRef::Name(name.to_string()));
        self
    }

    /// Run in the group behind `handle`
    pub fn in_group_handle(mut self, handle: GroupHandle) -> Self {
        self.group = Some(GroupRef::Handle(handle));
        self
    }

    /// Declare shared access to `T`
    pub fn reads<T: Component>(mut self) -> Self {
        push_unique(&mut self.reads, ComponentInfo::of::<T>());
        self
    }

    /// Declare exclusive access to `T`
    pub fn writes<T: Component>(mut self) -> Self {
        push_unique(&mut self.writes, ComponentInfo::of::<T>());
        self
    }

    /// Declare that the system pushes events of type `E`
    ///
    /// The stream is created in the world before the next tick.
    pub fn writes_stream<E: Send + Sync + 'static>(mut self) -> Self {
        push_unique(&mut self.stream_writes, ComponentInfo::of::<E>());
        self.streams.push(Box::new(World::register_stream::<E>));
        self
    }

    /// Allow the system to run on a worker thread with shared world access
    pub fn job(mut self) -> Self {
        self.job = true;
        self
    }

    /// Register the system switched off
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Finalize as a system called once per group run
    pub fn execute<F>(self, f: F) -> Result<SystemId, PipelineError>
    where
        F: FnMut(&mut SystemContext<'_>) + Send + 'static,
    {
        let group = self.preflight()?;
        self.finish(group, SystemKind::Execute(Box::new(f)))
    }

    /// Finalize as a consumer of the `E` stream
    ///
    /// `f` is called once for every event this system has not seen yet and
    /// that no earlier consumer vetoed. Returning `false` vetoes the event:
    /// consumers that run afterwards skip it.
    ///
    /// The consumer subscribes to the stream, so events it has not read yet
    /// are kept until its group runs, up to the configured maximum event
    /// age. Two job consumers of the same stream never share a job batch.
    pub fn each_event<E, F>(mut self, mut f: F) -> Result<SystemId, PipelineError>
    where
        E: Send + Sync + 'static,
        F: FnMut(&mut SystemContext<'_>, &E) -> bool + Send + 'static,
    {
        let group = self.preflight()?;
        let cursor = Arc::new(AtomicU64::new(0));
        let subscription = Arc::clone(&cursor);
        self.streams
            .push(Box::new(move |world: &mut World| world.subscribe_stream::<E>(&subscription)));

        let run = run_fn(move |ctx| {
            let events = match ctx.world().stream::<E>() {
                Some(stream) => stream.read_from(cursor.load(Ordering::Relaxed)),
                None => return 0,
            };
            let mut count = 0;
            for (seq, event) in events {
                cursor.store(seq + 1, Ordering::Relaxed);
                let vetoed = ctx
                    .world()
                    .stream::<E>()
                    .map_or(true, |stream| stream.is_consumed(seq));
                if vetoed {
                    continue;
                }
                count += 1;
                if !f(ctx, &*event) {
                    if let Some(stream) = ctx.world().stream::<E>() {
                        stream.consume(seq);
                    }
                }
            }
            count
        });
        let event = ComponentInfo::of::<E>();
        self.finish(group, SystemKind::Stream { event, run })
    }

    /// Finalize as a query system
    ///
    /// `f` is called once per entity that has every component of `Q`. The
    /// fetched components are declared as reads and writes automatically.
    /// Job systems may only read; defer writes through the context instead.
    ///
    /// Column locks are held while `f` runs, so the callback must not go
    /// back to the world for a component type its own query writes.
    pub fn each<Q, F>(mut self, mut f: F) -> Result<SystemId, PipelineError>
    where
        Q: Query,
        F: FnMut(&mut SystemContext<'_>, Entity, Q::Item<'_>) + Send + 'static,
    {
        let group = self.preflight()?;
        let access = Q::access();
        if let Some(component) = duplicate_component(&access) {
            return Err(PipelineError::DuplicateQueryComponent {
                system: self.name,
                component,
            });
        }
        if self.job {
            if let Some((component, _)) = access.iter().find(|(_, a)| *a == Access::Write) {
                return Err(PipelineError::JobQueryWrites {
                    system: self.name,
                    component: *component,
                });
            }
        }
        for (component, mode) in access {
            match mode {
                Access::Read => push_unique(&mut self.reads, component),
                Access::Write => push_unique(&mut self.writes, component),
            }
        }

        let run = query_fn(move |world, ctx| {
            let Some(mut guards) = Q::acquire(world) else {
                return 0;
            };
            let mut count = 0;
            for entity in Q::candidates(&guards) {
                if let Some(item) = Q::fetch(&mut guards, entity) {
                    f(ctx, entity, item);
                    count += 1;
                }
            }
            count
        });
        self.finish(group, SystemKind::Query(run))
    }

    /// Finalize as the consumer of an entity queue
    ///
    /// Each run drains the whole queue. Entities destroyed since they were
    /// posted are skipped, and an entity posted several times is handled
    /// once.
    pub fn each_entity<F>(self, queue: EntityQueueId, mut f: F) -> Result<SystemId, PipelineError>
    where
        F: FnMut(&mut SystemContext<'_>, Entity) + Send + 'static,
    {
        let group = self.preflight()?;
        if let Some(subscriber) = self.pipeline.queue_subscriber(queue) {
            return Err(PipelineError::QueueAlreadySubscribed {
                queue,
                subscriber: subscriber.to_string(),
            });
        }

        let run = run_fn(move |ctx| {
            let mut seen = HashSet::new();
            let mut count = 0;
            for entity in ctx.world().drain_queue(queue) {
                if !seen.insert(entity) || !ctx.world().is_entity_alive(entity) {
                    continue;
                }
                f(ctx, entity);
                count += 1;
            }
            count
        });
        self.finish(group, SystemKind::EntityQueue { queue, run })
    }

    fn preflight(&self) -> Result<GroupHandle, PipelineError> {
        let group = match &self.group {
            None => return Err(PipelineError::DanglingSystem(self.name.clone())),
            Some(GroupRef::Name(name)) => self
                .pipeline
                .group(name)
                .ok_or_else(|| PipelineError::UnknownGroup(name.clone()))?,
            Some(GroupRef::Handle(handle)) => {
                if self.pipeline.group_info(*handle).is_none() {
                    return Err(PipelineError::UnknownGroup(handle.to_string()));
                }
                *handle
            }
        };
        if self.pipeline.lookup_system(&self.name).is_some() {
            return Err(PipelineError::DuplicateSystem(self.name.clone()));
        }
        Ok(group)
    }

    fn finish(self, group: GroupHandle, kind: SystemKind) -> Result<SystemId, PipelineError> {
        let SystemBuilder {
            pipeline,
            name,
            reads,
            writes,
            stream_writes,
            streams,
            job,
            enabled,
            ..
        } = self;
        let system = System {
            id: pipeline.next_system_id(),
            name,
            reads,
            writes,
            stream_writes,
            job,
            enabled,
            owner: pipeline.current_owner().map(str::to_string),
            stats: SystemStats::default(),
            kind,
        };
        pipeline.insert_system(group, system, streams)
    }
}

fn push_unique(list: &mut Vec<ComponentInfo>, info: ComponentInfo) {
    if !list.contains(&info) {
        list.push(info);
    }
}

fn run_fn<F>(f: F) -> RunFn
where
    F: FnMut(&mut SystemContext<'_>) -> u64 + Send + 'static,
{
    Box::new(f)
}

fn query_fn<F>(f: F) -> QueryFn
where
    F: for<'w> FnMut(&'w World, &mut SystemContext<'w>) -> u64 + Send + 'static,
{
    Box::new(f)
}

#[cfg(test)]
mod tests {
    use crate::ecs::{Read, Write};
    use crate::error::PipelineError;
    use crate::pipeline::{GroupTiming, Pipeline};

    struct Position(f32);
    impl crate::ecs::Component for Position {}

    fn pipeline() -> Pipeline {
        let mut pipeline = Pipeline::new();
        pipeline
            .define_group("Update", 1, GroupTiming::Variable)
            .unwrap();
        pipeline
    }

    #[test]
    fn test_missing_group_is_dangling() {
        let mut pipeline = pipeline();
        let result = pipeline.system("orphan").execute(|_| {});
        assert!(matches!(result, Err(PipelineError::DanglingSystem(name)) if name == "orphan"));
        assert!(pipeline.lookup_system("orphan").is_none());
    }

    #[test]
    fn test_unknown_group_name() {
        let mut pipeline = pipeline();
        let result = pipeline.system("lost").in_group("Nowhere").execute(|_| {});
        assert!(matches!(result, Err(PipelineError::UnknownGroup(name)) if name == "Nowhere"));
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut pipeline = pipeline();
        pipeline.system("a").in_group("Update").execute(|_| {}).unwrap();
        let result = pipeline.system("a").in_group("Update").execute(|_| {});
        assert!(matches!(result, Err(PipelineError::DuplicateSystem(_))));
        assert_eq!(pipeline.systems().len(), 1);
    }

    #[test]
    fn test_job_query_must_be_read_only() {
        let mut pipeline = pipeline();
        let result = pipeline
            .system("mover")
            .in_group("Update")
            .job()
            .each::<Write<Position>, _>(|_, _, position: &mut Position| position.0 += 1.0);
        assert!(matches!(result, Err(PipelineError::JobQueryWrites { .. })));

        let ok = pipeline
            .system("reader")
            .in_group("Update")
            .job()
            .each::<Read<Position>, _>(|_, _, _position: &Position| {});
        assert!(ok.is_ok());
    }

    #[test]
    fn test_duplicate_query_component() {
        let mut pipeline = pipeline();
        let result = pipeline
            .system("alias")
            .in_group("Update")
            .each::<(Read<Position>, Write<Position>), _>(|_, _, _| {});
        assert!(matches!(
            result,
            Err(PipelineError::DuplicateQueryComponent { .. })
        ));
    }

    #[test]
    fn test_query_access_is_declared() {
        let mut pipeline = pipeline();
        let id = pipeline
            .system("mover")
            .in_group("Update")
            .reads::<Position>()
            .each::<Write<Position>, _>(|_, _, position: &mut Position| position.0 += 1.0)
            .unwrap();
        let info = pipeline.system_info(id).unwrap();
        assert_eq!(info.writes, vec![crate::ecs::ComponentInfo::of::<Position>()]);
        assert_eq!(info.reads.len(), 1);
    }
}
