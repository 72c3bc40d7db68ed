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
//! Deferred structural mutation
//!
//! Systems record spawns, despawns and component changes into a
//! [`CommandBuffer`] instead of touching the world directly. The pipeline
//! applies a group's buffer in FIFO order once every system of the group has
//! finished, so no system observes a half-applied mutation and commands
//! recorded on job threads are applied on the owning thread.
//!
//! Commands that target an entity which is no longer alive are dropped.

use crate::ecs::{Component, ComponentInfo, Entity, World};
use std::any::Any;
use tracing::trace;

/// Kind of a recorded command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Bring a reserved entity to life
    Spawn,
    /// Destroy an entity and all of its components
    Destroy,
    /// Add a default-valued component if the entity does not have it
    Add,
    /// Insert or overwrite a component value
    Set,
    /// Remove a component
    Remove,
}

type Payload = Box<dyn Any + Send>;

enum Command {
    Spawn(Entity),
    Destroy(Entity),
    Add {
        entity: Entity,
        component: ComponentInfo,
        apply: fn(&mut World, Entity) -> bool,
    },
    Set {
        entity: Entity,
        component: ComponentInfo,
        value: Payload,
        apply: fn(&mut World, Entity, Payload) -> bool,
    },
    Remove {
        entity: Entity,
        component: ComponentInfo,
        apply: fn(&mut World, Entity) -> bool,
    },
}

impl Command {
    fn kind(&self) -> CommandKind {
        match self {
            Command::Spawn(_) => CommandKind::Spawn,
            Command::Destroy(_) => CommandKind::Destroy,
            Command::Add { .. } => CommandKind::Add,
            Command::Set { .. } => CommandKind::Set,
            Command::Remove { .. } => CommandKind::Remove,
        }
    }

    fn entity(&self) -> Entity {
        match self {
            Command::Spawn(entity) | Command::Destroy(entity) => *entity,
            Command::Add { entity, .. }
            | Command::Set { entity, .. }
            | Command::Remove { entity, .. } => *entity,
        }
    }

    fn apply(self, world: &mut World) -> bool {
        match self {
            Command::Spawn(entity) => world.spawn_reserved(entity),
            Command::Destroy(entity) => world.destroy_entity(entity),
            Command::Add { entity, apply, .. } | Command::Remove { entity, apply, .. } => {
                apply(world, entity)
            }
            Command::Set {
                entity,
                value,
                apply,
                ..
            } => apply(world, entity, value),
        }
    }
}

fn add_default<T: Component + Default>(world: &mut World, entity: Entity) -> bool {
    if !world.is_entity_alive(entity) || world.get_mut::<T>(entity).is_some() {
        return false;
    }
    world.insert(entity, T::default())
}

fn set_value<T: Component>(world: &mut World, entity: Entity, value: Payload) -> bool {
    match value.downcast::<T>() {
        Ok(value) => world.insert(entity, *value),
        Err(_) => false,
    }
}

fn remove_component<T: Component>(world: &mut World, entity: Entity) -> bool {
    world.remove::<T>(entity).is_some()
}

/// Outcome of applying a command buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Commands that changed the world
    pub applied: usize,
    /// Commands dropped because their target was gone or already in the
    /// requested state
    pub skipped: usize,
}

/// FIFO buffer of deferred world mutations
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` commands
    pub fn with_capacity(capacity: usize) -> Self {
        CommandBuffer {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Bring `entity` to life. The handle must come from
    /// [`World::reserve_entity`].
    pub fn spawn(&mut self, entity: Entity) {
        self.commands.push(Command::Spawn(entity));
    }

    /// Destroy `entity`
    pub fn destroy(&mut self, entity: Entity) {
        self.commands.push(Command::Destroy(entity));
    }

    /// Add a default `T` to `entity` unless it already has one
    pub fn add<T: Component + Default>(&mut self, entity: Entity) {
        self.commands.push(Command::Add {
            entity,
            component: ComponentInfo::of::<T>(),
            apply: add_default::<T>,
        });
    }

    /// Insert or overwrite the `T` of `entity`
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) {
        self.commands.push(Command::Set {
            entity,
            component: ComponentInfo::of::<T>(),
            value: Box::new(value),
            apply: set_value::<T>,
        });
    }

    /// Remove the `T` of `entity`
    pub fn remove<T: Component>(&mut self, entity: Entity) {
        self.commands.push(Command::Remove {
            entity,
            component: ComponentInfo::of::<T>(),
            apply: remove_component::<T>,
        });
    }

    /// Number of recorded commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Kinds of the recorded commands, in recording order
    pub fn kinds(&self) -> impl Iterator<Item = CommandKind> + '_ {
        self.commands.iter().map(Command::kind)
    }

    /// Move every command of `other` to the end of this buffer
    pub fn append(&mut self, other: &mut CommandBuffer) {
        self.commands.append(&mut other.commands);
    }

    /// Discard all recorded commands without applying them
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Apply and remove every recorded command, in recording order
    pub fn apply(&mut self, world: &mut World) -> ApplyStats {
        let mut stats = ApplyStats::default();
        for command in self.commands.drain(..) {
            let kind = command.kind();
            let entity = command.entity();
            let component = match &command {
                Command::Add { component, .. }
                | Command::Set { component, .. }
                | Command::Remove { component, .. } => Some(*component),
                _ => None,
            };
            if command.apply(world) {
                stats.applied += 1;
            } else {
                stats.skipped += 1;
                trace!(?kind, %entity, component = component.map(|c| c.short_name()), "dropped deferred command");
            }
        }
        stats
    }
}
