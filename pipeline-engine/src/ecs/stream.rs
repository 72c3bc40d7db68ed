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
//! Typed event streams
//!
//! A stream is an append-only, multi-consumer log. Every event gets a
//! monotonically increasing sequence number; consumers keep their own
//! cursor, so several systems in different groups can read the same events
//! without interfering. A consumer may mark an event as consumed, which hides
//! it from every consumer that reads it afterwards.
//!
//! Events survive at least two tick boundaries, so an event pushed late in
//! a tick is still visible to consumers in earlier groups on the following
//! tick. Past that, an event is kept until every subscribed consumer has
//! read past it, which lets consumers in groups that skip ticks (fixed
//! groups at small frame deltas) catch up. A consumer that never runs
//! cannot hold events forever: nothing outlives the world's maximum event
//! age.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::debug;

/// Tick boundaries every event survives, read or not
pub(crate) const RETENTION_TICKS: u64 = 2;

/// Read position of one consumer: the sequence number of the next event it
/// has not seen yet.
pub(crate) type Cursor = Arc<AtomicU64>;

struct Slot<T> {
    seq: u64,
    pushed_at: u64,
    consumed: bool,
    event: Arc<T>,
}

struct StreamLog<T> {
    slots: VecDeque<Slot<T>>,
    next_seq: u64,
    consumers: Vec<Weak<AtomicU64>>,
}

/// Append-only event log for events of type `T`
pub struct Stream<T> {
    log: Mutex<StreamLog<T>>,
}

impl<T: Send + Sync + 'static> Stream<T> {
    /// Create an empty stream
    pub fn new() -> Self {
        Stream {
            log: Mutex::new(StreamLog {
                slots: VecDeque::new(),
                next_seq: 0,
                consumers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamLog<T>> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event, stamped with the epoch (completed tick count) it
    /// was pushed in. Returns its sequence number.
    pub(crate) fn push(&self, event: T, epoch: u64) -> u64 {
        let mut log = self.lock();
        let seq = log.next_seq;
        log.next_seq += 1;
        log.slots.push_back(Slot {
            seq,
            pushed_at: epoch,
            consumed: false,
            event: Arc::new(event),
        });
        seq
    }

    /// Snapshot of every unconsumed event with a sequence number at or after
    /// `cursor`, in push order.
    pub fn read_from(&self, cursor: u64) -> Vec<(u64, Arc<T>)> {
        self.lock()
            .slots
            .iter()
            .filter(|slot| slot.seq >= cursor && !slot.consumed)
            .map(|slot| (slot.seq, Arc::clone(&slot.event)))
            .collect()
    }

    /// Whether an earlier consumer has consumed the event. Events that were
    /// already discarded count as consumed.
    pub fn is_consumed(&self, seq: u64) -> bool {
        self.lock()
            .slots
            .iter()
            .find(|slot| slot.seq == seq)
            .map_or(true, |slot| slot.consumed)
    }

    /// Stop delivery of an event to consumers that have not read it yet.
    pub fn consume(&self, seq: u64) {
        if let Some(slot) = self.lock().slots.iter_mut().find(|slot| slot.seq == seq) {
            slot.consumed = true;
        }
    }

    /// Hold events back from expiry until `cursor` has moved past them
    ///
    /// The subscription ends when the last clone of `cursor` is dropped.
    pub(crate) fn subscribe(&self, cursor: &Cursor) {
        self.lock().consumers.push(Arc::downgrade(cursor));
    }

    /// Number of live subscribed consumers
    pub fn consumer_count(&self) -> usize {
        self.lock()
            .consumers
            .iter()
            .filter(|c| c.strong_count() > 0)
            .count()
    }

    /// Sequence number the next pushed event will receive
    pub fn next_sequence(&self) -> u64 {
        self.lock().next_seq
    }

    /// Number of retained events, consumed ones included
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    /// Check whether no events are retained
    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    fn discard_expired(&self, epoch: u64, max_age: u64) -> usize {
        let mut guard = self.lock();
        let log = &mut *guard;
        log.consumers.retain(|c| c.strong_count() > 0);
        let cursors: Vec<u64> = log
            .consumers
            .iter()
            .filter_map(Weak::upgrade)
            .map(|c| c.load(Ordering::Relaxed))
            .collect();
        let slowest = cursors.iter().copied().min();

        let before = log.slots.len();
        let mut forced = 0;
        while let Some(slot) = log.slots.front() {
            let age = epoch.saturating_sub(slot.pushed_at);
            let read_by_all = slot.consumed || slowest.map_or(true, |cursor| cursor > slot.seq);
            if age >= max_age {
                if !read_by_all {
                    forced += 1;
                }
            } else if age < RETENTION_TICKS || !read_by_all {
                break;
            }
            log.slots.pop_front();
        }
        if forced > 0 {
            debug!(
                event = std::any::type_name::<T>(),
                dropped = forced,
                max_age,
                "discarded events no consumer read in time"
            );
        }
        before - log.slots.len()
    }
}

impl<T: Send + Sync + 'static> Default for Stream<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased stream handle kept by the world.
pub(crate) trait ErasedStream: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    /// Drop events whose retention window ended. Returns how many were dropped.
    fn maintain(&self, epoch: u64, max_age: u64) -> usize;
    fn clear(&mut self);
}

impl<T: Send + Sync + 'static> ErasedStream for Stream<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn maintain(&self, epoch: u64, max_age: u64) -> usize {
        self.discard_expired(epoch, max_age)
    }

    fn clear(&mut self) {
        self.lock().slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Key(char);

    #[test]
    fn test_push_preserves_order() {
        let stream = Stream::new();
        stream.push(Key('a'), 0);
        stream.push(Key('b'), 0);
        stream.push(Key('a'), 0);

        let events: Vec<char> = stream.read_from(0).iter().map(|(_, k)| k.0).collect();
        assert_eq!(events, vec!['a', 'b', 'a']);
    }

    #[test]
    fn test_independent_cursors() {
        let stream = Stream::new();
        let first = stream.push(Key('a'), 0);
        stream.push(Key('b'), 0);

        assert_eq!(stream.read_from(0).len(), 2);
        assert_eq!(stream.read_from(first + 1).len(), 1);
        assert_eq!(stream.read_from(stream.next_sequence()).len(), 0);
    }

    #[test]
    fn test_consumed_events_are_hidden() {
        let stream = Stream::new();
        let a = stream.push(Key('a'), 0);
        stream.push(Key('b'), 0);

        stream.consume(a);
        assert!(stream.is_consumed(a));
        let events: Vec<char> = stream.read_from(0).iter().map(|(_, k)| k.0).collect();
        assert_eq!(events, vec!['b']);
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn test_retention_window() {
        let stream = Stream::new();
        stream.push(Key('a'), 3);

        // End of the tick it was pushed in.
        assert_eq!(stream.maintain(4, 64), 0);
        assert_eq!(stream.len(), 1);

        // End of the following tick.
        assert_eq!(stream.maintain(5, 64), 1);
        assert!(stream.is_empty());
    }

    #[test]
    fn test_discarded_events_count_as_consumed() {
        let stream = Stream::new();
        let seq = stream.push(Key('a'), 0);
        stream.maintain(RETENTION_TICKS, 64);
        assert!(stream.is_consumed(seq));
    }

    #[test]
    fn test_unread_events_wait_for_subscribed_consumer() {
        let stream = Stream::new();
        let cursor: Cursor = Arc::new(AtomicU64::new(0));
        stream.subscribe(&cursor);
        stream.push(Key('a'), 0);
        stream.push(Key('b'), 0);

        assert_eq!(stream.maintain(5, 64), 0);
        assert_eq!(stream.len(), 2);

        // Read 'a' only
        cursor.store(1, Ordering::Relaxed);
        assert_eq!(stream.maintain(6, 64), 1);
        assert_eq!(stream.read_from(0)[0].1 .0, 'b');
    }

    #[test]
    fn test_vetoed_events_do_not_wait() {
        let stream = Stream::new();
        let cursor: Cursor = Arc::new(AtomicU64::new(0));
        stream.subscribe(&cursor);
        let seq = stream.push(Key('a'), 0);
        stream.consume(seq);

        assert_eq!(stream.maintain(RETENTION_TICKS, 64), 1);
    }

    #[test]
    fn test_max_age_overrides_slow_consumer() {
        let stream = Stream::new();
        let cursor: Cursor = Arc::new(AtomicU64::new(0));
        stream.subscribe(&cursor);
        stream.push(Key('a'), 0);

        assert_eq!(stream.maintain(9, 10), 0);
        assert_eq!(stream.maintain(10, 10), 1);
    }

    #[test]
    fn test_dropped_consumer_releases_events() {
        let stream = Stream::new();
        let cursor: Cursor = Arc::new(AtomicU64::new(0));
        stream.subscribe(&cursor);
        stream.push(Key('a'), 0);
        assert_eq!(stream.consumer_count(), 1);
        assert_eq!(stream.maintain(3, 64), 0);

        drop(cursor);
        assert_eq!(stream.consumer_count(), 0);
        assert_eq!(stream.maintain(4, 64), 1);
    }
}
