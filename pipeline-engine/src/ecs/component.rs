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
//! Component storage
//!
//! Components are plain data attached to entities. Each component type lives
//! in its own dense [`Column`], and the world keeps every column behind a
//! per-type `RwLock` so systems running on job threads can read columns
//! while the main thread is blocked at the group barrier.

use crate::ecs::Entity;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Trait that all components must implement
///
/// Components should be plain data structures without behavior.
pub trait Component: 'static + Send + Sync {}

/// Type identity of a component, event or resource type, kept with its name
/// for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentInfo {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentInfo {
    /// Describe the type `T`
    pub fn of<T: 'static>() -> Self {
        ComponentInfo {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The `TypeId` of the described type
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path, as shown in diagnostics
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl fmt::Display for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Dense storage for a single component type
///
/// Components are packed contiguously with a sparse entity-to-slot map.
/// Removal swaps the last slot into the hole, so iteration order is not
/// stable across removals.
pub struct Column<T: Component> {
    entity_to_index: HashMap<Entity, usize>,
    index_to_entity: Vec<Entity>,
    components: Vec<T>,
}

impl<T: Component> Column<T> {
    /// Create a new empty column
    pub fn new() -> Self {
        Column {
            entity_to_index: HashMap::new(),
            index_to_entity: Vec::new(),
            components: Vec::new(),
        }
    }

    /// Get the number of components stored
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Check if the column is empty
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Check if an entity has this component
    pub fn contains(&self, entity: Entity) -> bool {
        self.entity_to_index.contains_key(&entity)
    }

    /// Get a reference to the component of `entity`
    pub fn get(&self, entity: Entity) -> Option<&T> {
        let index = self.entity_to_index.get(&entity)?;
        Some(&self.components[*index])
    }

    /// Get a mutable reference to the component of `entity`
    ///
    /// Writing through this reference updates the value in place; it does
    /// not fire component triggers.
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        let index = self.entity_to_index.get(&entity)?;
        Some(&mut self.components[*index])
    }

    /// Entities that have this component, in storage order
    pub fn entities(&self) -> &[Entity] {
        &self.index_to_entity
    }

    /// Iterate over `(entity, component)` pairs in storage order
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        self.index_to_entity.iter().copied().zip(self.components.iter())
    }

    /// Iterate mutably over `(entity, component)` pairs in storage order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> + '_ {
        self.index_to_entity
            .iter()
            .copied()
            .zip(self.components.iter_mut())
    }

    /// Insert or overwrite. Returns true if the entity did not have the
    /// component before.
    pub(crate) fn insert(&mut self, entity: Entity, component: T) -> bool {
        if let Some(&index) = self.entity_to_index.get(&entity) {
            self.components[index] = component;
            false
        } else {
            let new_index = self.components.len();
            self.components.push(component);
            self.entity_to_index.insert(entity, new_index);
            self.index_to_entity.push(entity);

            debug_assert_eq!(self.entity_to_index.len(), self.index_to_entity.len());
            debug_assert_eq!(self.entity_to_index.len(), self.components.len());
            true
        }
    }

    pub(crate) fn remove(&mut self, entity: Entity) -> Option<T> {
        let index = self.entity_to_index.remove(&entity)?;
        let last_index = self.components.len() - 1;
        if index != last_index {
            let swapped_entity = self.index_to_entity[last_index];
            self.entity_to_index.insert(swapped_entity, index);
        }
        self.index_to_entity.swap_remove(index);
        let component = self.components.swap_remove(index);

        debug_assert_eq!(self.entity_to_index.len(), self.index_to_entity.len());
        debug_assert_eq!(self.entity_to_index.len(), self.components.len());
        Some(component)
    }
}

impl<T: Component> Default for Column<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Object-safe view of a locked column, used by the world to manage columns
/// without knowing their component type.
pub(crate) trait ErasedColumn: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn remove_entity(&mut self, entity: Entity);
    fn len(&mut self) -> usize;
    fn clear(&mut self);
}

impl<T: Component> ErasedColumn for RwLock<Column<T>> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove_entity(&mut self, entity: Entity) {
        column_mut(self).remove(entity);
    }

    fn len(&mut self) -> usize {
        column_mut(self).len()
    }

    fn clear(&mut self) {
        let column = column_mut(self);
        column.entity_to_index.clear();
        column.index_to_entity.clear();
        column.components.clear();
    }
}

/// Exclusive access to a column without locking. A poisoned lock only means
/// a system panicked mid-write; the panic already aborted that tick.
pub(crate) fn column_mut<T: Component>(lock: &mut RwLock<Column<T>>) -> &mut Column<T> {
    lock.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner())
}
