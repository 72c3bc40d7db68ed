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
//! Typed component queries
//!
//! A query names the component columns a system iterates, each wrapped in
//! [`Read`] or [`Write`]. Running a query locks every named column for the
//! duration of the iteration and yields one row per entity that has all of
//! them.
//!
//! ```
//! use pipeline_engine::ecs::{Component, Read, Write, World, Query};
//!
//! struct Position(f32);
//! struct Velocity(f32);
//! impl Component for Position {}
//! impl Component for Velocity {}
//!
//! let mut world = World::new();
//! let e = world.create_entity();
//! world.insert(e, Position(0.0));
//! world.insert(e, Velocity(2.0));
//!
//! let mut guards = <(Write<Position>, Read<Velocity>)>::acquire(&world).unwrap();
//! for entity in <(Write<Position>, Read<Velocity>)>::candidates(&guards) {
//!     if let Some((pos, vel)) = <(Write<Position>, Read<Velocity>)>::fetch(&mut guards, entity) {
//!         pos.0 += vel.0;
//!     }
//! }
//! ```

use crate::ecs::{Column, Component, ComponentInfo, Entity, World};
use std::marker::PhantomData;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

/// How a query or a system touches a component type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Shared access
    Read,
    /// Exclusive access
    Write,
}

/// Shared access to the `T` column
pub struct Read<T>(PhantomData<fn() -> T>);

/// Exclusive access to the `T` column
pub struct Write<T>(PhantomData<fn() -> T>);

/// A single element of a query
pub trait Fetch: 'static {
    /// Lock held on the column while the query runs
    type Guard<'w>;
    /// What the system callback receives for one row
    type Item<'g>;

    /// The component type and access mode
    fn access() -> (ComponentInfo, Access);

    /// Lock the column. `None` if the world has no column for the type,
    /// which means the query has no matches.
    fn acquire(world: &World) -> Option<Self::Guard<'_>>;

    /// Entities present in the column
    fn entities<'a>(guard: &'a Self::Guard<'_>) -> &'a [Entity];

    /// Fetch the item of `entity`
    fn fetch<'g>(guard: &'g mut Self::Guard<'_>, entity: Entity) -> Option<Self::Item<'g>>;
}

impl<T: Component> Fetch for Read<T> {
    type Guard<'w> = RwLockReadGuard<'w, Column<T>>;
    type Item<'g> = &'g T;

    fn access() -> (ComponentInfo, Access) {
        (ComponentInfo::of::<T>(), Access::Read)
    }

    fn acquire(world: &World) -> Option<Self::Guard<'_>> {
        world.read::<T>()
    }

    fn entities<'a>(guard: &'a Self::Guard<'_>) -> &'a [Entity] {
        guard.entities()
    }

    fn fetch<'g>(guard: &'g mut Self::Guard<'_>, entity: Entity) -> Option<Self::Item<'g>> {
        guard.get(entity)
    }
}

impl<T: Component> Fetch for Write<T> {
    type Guard<'w> = RwLockWriteGuard<'w, Column<T>>;
    type Item<'g> = &'g mut T;

    fn access() -> (ComponentInfo, Access) {
        (ComponentInfo::of::<T>(), Access::Write)
    }

    fn acquire(world: &World) -> Option<Self::Guard<'_>> {
        world.write::<T>()
    }

    fn entities<'a>(guard: &'a Self::Guard<'_>) -> &'a [Entity] {
        guard.entities()
    }

    fn fetch<'g>(guard: &'g mut Self::Guard<'_>, entity: Entity) -> Option<Self::Item<'g>> {
        guard.get_mut(entity)
    }
}

/// A set of fetches iterated together
///
/// Implemented for single [`Read`]/[`Write`] fetches and for tuples of up
/// to six of them.
pub trait Query: 'static {
    /// Locks held while the query runs
    type Guards<'w>;
    /// What the system callback receives for one row
    type Item<'g>;

    /// Component types touched by the query, in declaration order
    fn access() -> Vec<(ComponentInfo, Access)>;

    /// Lock every column, in declaration order. `None` if any column is
    /// missing.
    fn acquire(world: &World) -> Option<Self::Guards<'_>>;

    /// Entities that may match, taken from the smallest column
    fn candidates(guards: &Self::Guards<'_>) -> Vec<Entity>;

    /// Fetch the row of `entity`, or `None` if it lacks any component
    fn fetch<'g>(guards: &'g mut Self::Guards<'_>, entity: Entity) -> Option<Self::Item<'g>>;
}

impl<T: Component> Query for Read<T> {
    type Guards<'w> = <Read<T> as Fetch>::Guard<'w>;
    type Item<'g> = &'g T;

    fn access() -> Vec<(ComponentInfo, Access)> {
        vec![<Read<T> as Fetch>::access()]
    }

    fn acquire(world: &World) -> Option<Self::Guards<'_>> {
        <Read<T> as Fetch>::acquire(world)
    }

    fn candidates(guards: &Self::Guards<'_>) -> Vec<Entity> {
        guards.entities().to_vec()
    }

    fn fetch<'g>(guards: &'g mut Self::Guards<'_>, entity: Entity) -> Option<Self::Item<'g>> {
        guards.get(entity)
    }
}

impl<T: Component> Query for Write<T> {
    type Guards<'w> = <Write<T> as Fetch>::Guard<'w>;
    type Item<'g> = &'g mut T;

    fn access() -> Vec<(ComponentInfo, Access)> {
        vec![<Write<T> as Fetch>::access()]
    }

    fn acquire(world: &World) -> Option<Self::Guards<'_>> {
        <Write<T> as Fetch>::acquire(world)
    }

    fn candidates(guards: &Self::Guards<'_>) -> Vec<Entity> {
        guards.entities().to_vec()
    }

    fn fetch<'g>(guards: &'g mut Self::Guards<'_>, entity: Entity) -> Option<Self::Item<'g>> {
        guards.get_mut(entity)
    }
}

macro_rules! impl_query_tuple {
    ($(($name:ident, $guard:ident)),+) => {
        impl<$($name: Fetch),+> Query for ($($name,)+) {
            type Guards<'w> = ($($name::Guard<'w>,)+);
            type Item<'g> = ($($name::Item<'g>,)+);

            fn access() -> Vec<(ComponentInfo, Access)> {
                vec![$($name::access()),+]
            }

            // Columns are locked in declaration order.
            fn acquire(world: &World) -> Option<Self::Guards<'_>> {
                Some(($($name::acquire(world)?,)+))
            }

            fn candidates(guards: &Self::Guards<'_>) -> Vec<Entity> {
                let ($($guard,)+) = guards;
                let mut smallest: Option<&[Entity]> = None;
                $(
                    let entities = $name::entities($guard);
                    if smallest.map_or(true, |s| entities.len() < s.len()) {
                        smallest = Some(entities);
                    }
                )+
                smallest.map(<[Entity]>::to_vec).unwrap_or_default()
            }

            fn fetch<'g>(guards: &'g mut Self::Guards<'_>, entity: Entity) -> Option<Self::Item<'g>> {
                let ($($guard,)+) = guards;
                Some(($($name::fetch($guard, entity)?,)+))
            }
        }
    };
}

impl_query_tuple!((A, a));
impl_query_tuple!((A, a), (B, b));
impl_query_tuple!((A, a), (B, b), (C, c));
impl_query_tuple!((A, a), (B, b), (C, c), (D, d));
impl_query_tuple!((A, a), (B, b), (C, c), (D, d), (E, e));
impl_query_tuple!((A, a), (B, b), (C, c), (D, d), (E, e), (F, f));

/// Returns the first component type that appears twice in `access`.
pub(crate) fn duplicate_component(access: &[(ComponentInfo, Access)]) -> Option<ComponentInfo> {
    access.iter().enumerate().find_map(|(i, (info, _))| {
        access[..i]
            .iter()
            .any(|(earlier, _)| earlier == info)
            .then_some(*info)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position(i32);
    #[derive(Debug, PartialEq)]
    struct Velocity(i32);
    struct Tag;

    impl Component for Position {}
    impl Component for Velocity {}
    impl Component for Tag {}

    type Movement = (Write<Position>, Read<Velocity>);

    #[test]
    fn test_query_matches_only_complete_rows() {
        let mut world = World::new();
        let moving = world.create_entity();
        let parked = world.create_entity();
        world.insert(moving, Position(0));
        world.insert(moving, Velocity(3));
        world.insert(parked, Position(10));

        let mut guards = Movement::acquire(&world).unwrap();
        let mut visited = Vec::new();
        for entity in Movement::candidates(&guards) {
            if let Some((pos, vel)) = Movement::fetch(&mut guards, entity) {
                pos.0 += vel.0;
                visited.push(entity);
            }
        }
        drop(guards);

        assert_eq!(visited, vec![moving]);
        assert_eq!(world.with_component(moving, |p: &Position| p.0), Some(3));
        assert_eq!(world.with_component(parked, |p: &Position| p.0), Some(10));
    }

    #[test]
    fn test_missing_column_means_no_matches() {
        let mut world = World::new();
        let e = world.create_entity();
        world.insert(e, Position(1));
        assert!(<(Read<Position>, Read<Tag>)>::acquire(&world).is_none());
    }

    #[test]
    fn test_candidates_come_from_smallest_column() {
        let mut world = World::new();
        for i in 0..10 {
            let e = world.create_entity();
            world.insert(e, Position(i));
            if i == 4 {
                world.insert(e, Velocity(0));
            }
        }
        let guards = <(Read<Position>, Read<Velocity>)>::acquire(&world).unwrap();
        assert_eq!(<(Read<Position>, Read<Velocity>)>::candidates(&guards).len(), 1);
    }

    #[test]
    fn test_access_declaration_order() {
        let access = Movement::access();
        assert_eq!(access[0], (ComponentInfo::of::<Position>(), Access::Write));
        assert_eq!(access[1], (ComponentInfo::of::<Velocity>(), Access::Read));
        assert!(duplicate_component(&access).is_none());
    }

    #[test]
    fn test_duplicate_component_detection() {
        let access = <(Read<Position>, Write<Position>)>::access();
        assert_eq!(duplicate_component(&access), Some(ComponentInfo::of::<Position>()));
    }
}
