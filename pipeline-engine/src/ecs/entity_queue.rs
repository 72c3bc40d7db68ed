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
//! Entity queues
//!
//! FIFO queues of entities, used for "mark dirty now, update later" work.
//! Entities are posted explicitly or by component triggers and drained by
//! the single system subscribed to the queue.

use crate::ecs::Entity;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Handle to an entity queue created with [`crate::World::create_entity_queue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityQueueId(pub(crate) usize);

impl EntityQueueId {
    /// Raw index of the queue
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EntityQueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityQueue({})", self.0)
    }
}

pub(crate) struct EntityQueue {
    name: String,
    pending: Mutex<VecDeque<Entity>>,
}

impl EntityQueue {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        EntityQueue {
            name: name.into(),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Entity>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn push(&self, entity: Entity) {
        self.lock().push_back(entity);
    }

    pub(crate) fn extend(&self, entities: impl IntoIterator<Item = Entity>) {
        self.lock().extend(entities);
    }

    /// Take everything queued so far. Entities posted while the drained
    /// batch is being processed land in the next batch.
    pub(crate) fn drain(&self) -> VecDeque<Entity> {
        std::mem::take(&mut *self.lock())
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_drain() {
        let queue = EntityQueue::new("transforms");
        queue.push(Entity::new(3, 0));
        queue.push(Entity::new(1, 0));
        queue.extend([Entity::new(2, 0)]);

        let drained: Vec<u64> = queue.drain().iter().map(|e| e.id().raw()).collect();
        assert_eq!(drained, vec![3, 1, 2]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let queue = EntityQueue::new("dirty");
        let e = Entity::new(1, 0);
        queue.push(e);
        queue.push(e);
        assert_eq!(queue.drain().len(), 2);
    }
}
