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
//! World management
//!
//! The World is the central container for all ECS data the pipeline
//! operates on: entities, component columns, resources, event streams,
//! entity queues and the triggers that feed them.
//!
//! Methods taking `&self` are safe to call from systems running on job
//! threads. Structural changes (creating entities, inserting or removing
//! components) need `&mut self`; systems that only hold a shared world
//! record them in a [`crate::ecs::CommandBuffer`] instead.
//!
//! Column locks are not re-entrant. A system iterating a query must not
//! lock the same columns again through the world while the row is borrowed.

use crate::ecs::component::{column_mut, ErasedColumn};
use crate::ecs::entity::EntityAllocator;
use crate::ecs::entity_queue::EntityQueue;
use crate::config::DEFAULT_MAX_EVENT_AGE;
use crate::ecs::stream::{Cursor, ErasedStream, RETENTION_TICKS};
use crate::ecs::{Column, Component, Entity, EntityQueueId, Stream};
use crate::error::PipelineError;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// The main ECS world container
pub struct World {
    entities: EntityAllocator,
    columns: HashMap<TypeId, Box<dyn ErasedColumn>>,
    resources: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    streams: HashMap<TypeId, Box<dyn ErasedStream>>,
    queues: Vec<EntityQueue>,
    triggers: HashMap<TypeId, Vec<EntityQueueId>>,
    epoch: u64,
    max_event_age: u64,
}

impl World {
    /// Create a new empty world
    pub fn new() -> Self {
        World {
            entities: EntityAllocator::new(),
            columns: HashMap::new(),
            resources: HashMap::new(),
            streams: HashMap::new(),
            queues: Vec::new(),
            triggers: HashMap::new(),
            epoch: 0,
            max_event_age: DEFAULT_MAX_EVENT_AGE,
        }
    }

    // --- entities -------------------------------------------------------

    /// Create a new entity
    pub fn create_entity(&mut self) -> Entity {
        self.entities.allocate()
    }

    /// Reserve an entity handle without creating the entity. The handle can
    /// be passed to [`crate::ecs::CommandBuffer::spawn`].
    pub fn reserve_entity(&self) -> Entity {
        self.entities.reserve()
    }

    /// Bring a reserved entity to life. Returns false if the handle is
    /// stale or already alive.
    pub fn spawn_reserved(&mut self, entity: Entity) -> bool {
        self.entities.materialize(entity)
    }

    /// Destroy an entity and drop all of its components
    ///
    /// Returns false if the entity was not alive.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if !self.entities.free(entity) {
            return false;
        }
        for column in self.columns.values_mut() {
            column.remove_entity(entity);
        }
        true
    }

    /// Check if an entity is alive
    pub fn is_entity_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Get the number of alive entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Iterate over all alive entities, in index order
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter()
    }

    /// Destroy every entity and discard pending stream events and queued
    /// entities. Resources, stream registrations, queues and triggers stay.
    pub fn clear(&mut self) {
        self.entities.clear();
        for column in self.columns.values_mut() {
            column.clear();
        }
        for stream in self.streams.values_mut() {
            stream.clear();
        }
        for queue in &self.queues {
            queue.clear();
        }
    }

    // --- components -----------------------------------------------------

    /// Insert or overwrite the `T` of `entity` and fire the triggers
    /// registered for `T`.
    ///
    /// Returns false, leaving the world untouched, if the entity is not
    /// alive.
    pub fn insert<T: Component>(&mut self, entity: Entity, component: T) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }
        let column = self
            .columns
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(RwLock::new(Column::<T>::new())));
        if let Some(lock) = column.as_any_mut().downcast_mut::<RwLock<Column<T>>>() {
            column_mut(lock).insert(entity, component);
        }
        self.fire_triggers(TypeId::of::<T>(), entity);
        true
    }

    /// Remove the `T` of `entity`
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<T> {
        let lock = self.column_lock_mut::<T>()?;
        column_mut(lock).remove(entity)
    }

    /// Mutable access to a component without locking
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let lock = self.column_lock_mut::<T>()?;
        column_mut(lock).get_mut(entity)
    }

    /// Check if `entity` has a `T`
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.read::<T>().is_some_and(|column| column.contains(entity))
    }

    /// Clone the `T` of `entity`
    pub fn get_cloned<T: Component + Clone>(&self, entity: Entity) -> Option<T> {
        self.with_component(entity, T::clone)
    }

    /// Run `f` on the `T` of `entity` while its column is read-locked
    pub fn with_component<T: Component, R>(
        &self,
        entity: Entity,
        f: impl FnOnce(&T) -> R,
    ) -> Option<R> {
        let column = self.read::<T>()?;
        column.get(entity).map(f)
    }

    /// Number of entities that have a `T`
    pub fn component_count<T: Component>(&self) -> usize {
        self.read::<T>().map_or(0, |column| column.len())
    }

    /// Read-lock the `T` column. `None` if no `T` was ever inserted.
    pub fn read<T: Component>(&self) -> Option<RwLockReadGuard<'_, Column<T>>> {
        let lock = self.column_lock::<T>()?;
        Some(lock.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Write-lock the `T` column. `None` if no `T` was ever inserted.
    ///
    /// Values can be changed in place through the guard; inserting and
    /// removing still needs `&mut World`.
    ///
    /// Job systems in one batch share the world across threads. A job that
    /// holds more than one column guard must take them in the same order as
    /// the others in its batch, or two jobs can deadlock waiting on each
    /// other's columns. Queries lock in declaration order.
    pub fn write<T: Component>(&self) -> Option<RwLockWriteGuard<'_, Column<T>>> {
        let lock = self.column_lock::<T>()?;
        Some(lock.write().unwrap_or_else(PoisonError::into_inner))
    }

    fn column_lock<T: Component>(&self) -> Option<&RwLock<Column<T>>> {
        self.columns
            .get(&TypeId::of::<T>())?
            .as_any()
            .downcast_ref::<RwLock<Column<T>>>()
    }

    fn column_lock_mut<T: Component>(&mut self) -> Option<&mut RwLock<Column<T>>> {
        self.columns
            .get_mut(&TypeId::of::<T>())?
            .as_any_mut()
            .downcast_mut::<RwLock<Column<T>>>()
    }

    // --- resources ------------------------------------------------------

    /// Insert or replace a singleton resource
    pub fn insert_resource<R: Send + Sync + 'static>(&mut self, resource: R) {
        self.resources
            .insert(TypeId::of::<R>(), Box::new(RwLock::new(resource)));
    }

    /// Remove a singleton resource
    pub fn remove_resource<R: Send + Sync + 'static>(&mut self) -> Option<R> {
        let boxed = self.resources.remove(&TypeId::of::<R>())?;
        let lock = *boxed.downcast::<RwLock<R>>().ok()?;
        Some(lock.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    /// Check if a resource of type `R` exists
    pub fn has_resource<R: Send + Sync + 'static>(&self) -> bool {
        self.resources.contains_key(&TypeId::of::<R>())
    }

    /// Read-lock a resource. `None` if it does not exist.
    pub fn resource<R: Send + Sync + 'static>(&self) -> Option<RwLockReadGuard<'_, R>> {
        let lock = self.resource_lock::<R>()?;
        Some(lock.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Write-lock a resource. `None` if it does not exist.
    pub fn resource_mut<R: Send + Sync + 'static>(&self) -> Option<RwLockWriteGuard<'_, R>> {
        let lock = self.resource_lock::<R>()?;
        Some(lock.write().unwrap_or_else(PoisonError::into_inner))
    }

    fn resource_lock<R: Send + Sync + 'static>(&self) -> Option<&RwLock<R>> {
        self.resources
            .get(&TypeId::of::<R>())?
            .downcast_ref::<RwLock<R>>()
    }

    // --- streams --------------------------------------------------------

    /// Create the stream for events of type `E` if it does not exist yet
    pub fn register_stream<E: Send + Sync + 'static>(&mut self) {
        self.streams
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Stream::<E>::new()));
    }

    /// Push an event, creating the stream on first use
    pub fn push_event<E: Send + Sync + 'static>(&mut self, event: E) {
        self.register_stream::<E>();
        self.send_event(event);
    }

    /// Push an event from a shared world reference
    ///
    /// Returns false and drops the event if the stream was never
    /// registered.
    pub fn send_event<E: Send + Sync + 'static>(&self, event: E) -> bool {
        match self.stream::<E>() {
            Some(stream) => {
                stream.push(event, self.epoch);
                true
            }
            None => {
                trace!(
                    event = std::any::type_name::<E>(),
                    "dropped event for unregistered stream"
                );
                false
            }
        }
    }

    /// The stream for events of type `E`
    pub fn stream<E: Send + Sync + 'static>(&self) -> Option<&Stream<E>> {
        self.streams
            .get(&TypeId::of::<E>())?
            .as_any()
            .downcast_ref::<Stream<E>>()
    }

    /// Number of completed ticks, used to age stream events
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Create the `E` stream if needed and hold its events until `cursor`
    /// has moved past them
    pub(crate) fn subscribe_stream<E: Send + Sync + 'static>(&mut self, cursor: &Cursor) {
        self.register_stream::<E>();
        if let Some(stream) = self.stream::<E>() {
            stream.subscribe(cursor);
        }
    }

    /// Ticks after which an event is discarded even if a subscribed consumer
    /// has not read it
    pub fn max_event_age(&self) -> u64 {
        self.max_event_age
    }

    /// Set the maximum event age in ticks. Values below the two-tick
    /// minimum retention are raised to it.
    pub fn set_max_event_age(&mut self, ticks: u64) {
        self.max_event_age = ticks.max(RETENTION_TICKS);
    }

    /// Close the current tick: age out expired stream events and advance
    /// the epoch. Called by the pipeline at the end of every tick.
    pub fn end_tick(&mut self) -> usize {
        self.epoch += 1;
        let epoch = self.epoch;
        let max_age = self.max_event_age;
        self.streams
            .values()
            .map(|stream| stream.maintain(epoch, max_age))
            .sum()
    }

    // --- entity queues --------------------------------------------------

    /// Create a named entity queue
    pub fn create_entity_queue(&mut self, name: impl Into<String>) -> EntityQueueId {
        let id = EntityQueueId(self.queues.len());
        self.queues.push(EntityQueue::new(name));
        id
    }

    /// Post `entity` to a queue. Returns false if the queue does not exist.
    pub fn post(&self, queue: EntityQueueId, entity: Entity) -> bool {
        match self.queues.get(queue.0) {
            Some(q) => {
                q.push(entity);
                true
            }
            None => false,
        }
    }

    /// Post several entities to a queue, preserving their order
    pub fn post_all(&self, queue: EntityQueueId, entities: impl IntoIterator<Item = Entity>) -> bool {
        match self.queues.get(queue.0) {
            Some(q) => {
                q.extend(entities);
                true
            }
            None => false,
        }
    }

    /// Number of entities waiting in a queue
    pub fn queue_len(&self, queue: EntityQueueId) -> usize {
        self.queues.get(queue.0).map_or(0, EntityQueue::len)
    }

    /// Name a queue was created with
    pub fn queue_name(&self, queue: EntityQueueId) -> Option<&str> {
        self.queues.get(queue.0).map(EntityQueue::name)
    }

    /// Whether `queue` was created in this world
    pub fn has_entity_queue(&self, queue: EntityQueueId) -> bool {
        queue.0 < self.queues.len()
    }

    pub(crate) fn drain_queue(&self, queue: EntityQueueId) -> Vec<Entity> {
        self.queues
            .get(queue.0)
            .map(|q| q.drain().into_iter().collect())
            .unwrap_or_default()
    }

    /// Post an entity to `queue` every time a `T` is inserted or
    /// overwritten on it
    pub fn add_trigger<T: Component>(&mut self, queue: EntityQueueId) -> Result<(), PipelineError> {
        if !self.has_entity_queue(queue) {
            return Err(PipelineError::UnknownEntityQueue(queue));
        }
        let queues = self.triggers.entry(TypeId::of::<T>()).or_default();
        if !queues.contains(&queue) {
            queues.push(queue);
        }
        Ok(())
    }

    fn fire_triggers(&self, type_id: TypeId, entity: Entity) {
        if let Some(queues) = self.triggers.get(&type_id) {
            for queue in queues {
                self.post(*queue, entity);
            }
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
