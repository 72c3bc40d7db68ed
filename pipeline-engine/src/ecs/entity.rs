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
//! Entity handles and allocation
//!
//! Entities are generational handles. A destroyed entity's index may be
//! recycled, but the generation is bumped so stale handles held by systems
//! or queued in deferred commands never alias the new occupant.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an entity slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    /// Create a new EntityId from a raw u64 value
    pub fn new(id: u64) -> Self {
        EntityId(id)
    }

    /// Get the raw u64 value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Entity handle with generational index support for safe references
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity {
    id: EntityId,
    generation: u32,
}

impl Entity {
    /// Create a new entity with the given ID and generation
    pub fn new(id: u64, generation: u32) -> Self {
        Entity {
            id: EntityId::new(id),
            generation,
        }
    }

    /// Get the entity ID
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Get the generation number
    pub fn generation(&self) -> u32 {
        self.generation
    }

    fn index(&self) -> usize {
        self.id.0 as usize
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}, gen: {})", self.id.0, self.generation)
    }
}

/// Allocates entity handles and tracks which ones are alive.
///
/// Fresh indices can be reserved through a shared reference, which is what
/// lets a system running on a job thread hand out the entity of a deferred
/// spawn before the spawn is applied. Recycled indices are only handed out
/// through `&mut self`.
#[derive(Debug, Default)]
pub(crate) struct EntityAllocator {
    next_index: AtomicU64,
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: Vec<u64>,
    live_count: usize,
}

impl EntityAllocator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserve a never-used index. The entity is not alive until
    /// [`EntityAllocator::materialize`] is called for it.
    pub(crate) fn reserve(&self) -> Entity {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        Entity::new(index, 0)
    }

    /// Allocate and immediately mark an entity as alive, recycling a freed
    /// index when one is available.
    pub(crate) fn allocate(&mut self) -> Entity {
        let entity = match self.free.pop() {
            Some(index) => Entity::new(index, self.generations[index as usize]),
            None => self.reserve(),
        };
        self.materialize(entity);
        entity
    }

    /// Mark a reserved entity alive. Returns false if the handle is stale
    /// or already alive.
    pub(crate) fn materialize(&mut self, entity: Entity) -> bool {
        let index = entity.index();
        if index >= self.alive.len() {
            self.alive.resize(index + 1, false);
            self.generations.resize(index + 1, 0);
        }
        if self.alive[index] || self.generations[index] != entity.generation {
            return false;
        }
        self.alive[index] = true;
        self.live_count += 1;
        true
    }

    pub(crate) fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let index = entity.index();
        self.alive[index] = false;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.free.push(index as u64);
        self.live_count -= 1;
        true
    }

    pub(crate) fn is_alive(&self, entity: Entity) -> bool {
        let index = entity.index();
        index < self.alive.len()
            && self.alive[index]
            && self.generations[index] == entity.generation
    }

    pub(crate) fn len(&self) -> usize {
        self.live_count
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(index, _)| Entity::new(index as u64, self.generations[index]))
    }

    pub(crate) fn clear(&mut self) {
        for index in 0..self.alive.len() {
            if self.alive[index] {
                self.alive[index] = false;
                self.generations[index] = self.generations[index].wrapping_add(1);
                self.free.push(index as u64);
            }
        }
        self.live_count = 0;
    }
}
