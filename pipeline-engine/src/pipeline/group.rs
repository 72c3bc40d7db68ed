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
//! Pipeline groups
//!
//! A group is one ordered stage of the frame. It owns its systems in
//! execution order and the command buffer that is drained at its barrier.
//! Fixed groups additionally carry a time accumulator and run zero or more
//! whole steps per tick.

use crate::ecs::{CommandBuffer, World};
use crate::pipeline::jobs::{Job, JobBackend};
use crate::pipeline::system::{System, SystemId, SystemKind, TickInfo};
use crate::pool::CommandBufferPool;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{trace, trace_span};

/// Opaque handle to a pipeline group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupHandle(pub(crate) usize);

impl GroupHandle {
    /// Raw slot index of the group
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for GroupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Group({})", self.0)
    }
}

/// How often a group runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroupTiming {
    /// Once per tick with the frame's delta time
    Variable,
    /// Once per whole `rate` seconds of accumulated time
    Fixed {
        /// Seconds per step
        rate: f64,
    },
}

impl GroupTiming {
    /// Fixed timing with `rate` seconds per step
    pub fn fixed(rate: f64) -> Self {
        GroupTiming::Fixed { rate }
    }

    /// Whether the group runs on a fixed step
    pub fn is_fixed(&self) -> bool {
        matches!(self, GroupTiming::Fixed { .. })
    }

    /// Seconds per step for fixed groups
    pub fn rate(&self) -> Option<f64> {
        match self {
            GroupTiming::Variable => None,
            GroupTiming::Fixed { rate } => Some(*rate),
        }
    }
}

/// Names of the standard groups, in execution order
///
/// Modules refer to groups by these names, so they are a stable contract.
pub mod groups {
    use super::GroupTiming;

    /// Frame setup, before anything else
    pub const PRE_FRAME: &str = "PreFrame";
    /// Input and early gameplay work
    pub const EARLY: &str = "Early";
    /// Fixed-step simulation
    pub const FIXED_UPDATE: &str = "FixedUpdate";
    /// Main per-frame gameplay update
    pub const UPDATE: &str = "Update";
    /// User interface update
    pub const UPDATE_UI: &str = "UpdateUi";
    /// Work that depends on the results of Update
    pub const POST_UPDATE: &str = "PostUpdate";
    /// Render preparation
    pub const PRE_RENDER: &str = "PreRender";
    /// Rendering
    pub const RENDER: &str = "Render";
    /// Work after rendering
    pub const POST_RENDER: &str = "PostRender";
    /// Frame teardown
    pub const POST_FRAME: &str = "PostFrame";

    /// Every standard group in sequence order
    pub const ALL: [&str; 10] = [
        PRE_FRAME,
        EARLY,
        FIXED_UPDATE,
        UPDATE,
        UPDATE_UI,
        POST_UPDATE,
        PRE_RENDER,
        RENDER,
        POST_RENDER,
        POST_FRAME,
    ];

    /// Sequence number and timing of each standard group
    pub(crate) fn standard(fixed_rate: f64) -> impl Iterator<Item = (&'static str, u32, GroupTiming)> {
        ALL.into_iter().zip(1u32..).map(move |(name, sequence)| {
            let timing = if name == FIXED_UPDATE {
                GroupTiming::fixed(fixed_rate)
            } else {
                GroupTiming::Variable
            };
            (name, sequence, timing)
        })
    }
}

/// Callback invoked when a group starts or finishes a run
pub type GroupHook = Box<dyn FnMut(&str, &TickInfo) + Send>;

/// Outcome of feeding a frame's delta into a fixed group
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum FixedAdvance {
    /// Run this many whole steps
    Steps(u32),
    /// The backlog exceeded the ceiling and was discarded
    Dropped {
        /// Accumulated seconds that were thrown away
        backlog: f64,
    },
}

/// Time accumulator of a fixed group
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FixedStep {
    rate: f64,
    accumulator: f64,
}

impl FixedStep {
    pub(crate) fn new(rate: f64) -> Self {
        FixedStep {
            rate,
            accumulator: 0.0,
        }
    }

    pub(crate) fn rate(&self) -> f64 {
        self.rate
    }

    pub(crate) fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Add `delta` seconds and consume as many whole steps as fit
    ///
    /// A backlog above `max_backlog` is reset to zero and no step runs,
    /// which keeps a long stall from turning into thousands of catch-up
    /// steps.
    pub(crate) fn advance(&mut self, delta: f64, max_backlog: f64) -> FixedAdvance {
        self.accumulator += delta.max(0.0);
        if self.accumulator > max_backlog {
            let backlog = self.accumulator;
            self.accumulator = 0.0;
            return FixedAdvance::Dropped { backlog };
        }

        let mut steps = 0;
        while self.accumulator >= self.rate {
            self.accumulator -= self.rate;
            steps += 1;
        }
        FixedAdvance::Steps(steps)
    }
}

/// Aggregate run statistics of a group
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupStats {
    /// Times the group ran (each fixed step counts)
    pub runs: u64,
    /// Commands applied at the group barrier
    pub commands_applied: u64,
    /// Commands dropped because their entity was gone
    pub commands_skipped: u64,
    /// Total time spent running the group
    pub execution_time: Duration,
}

/// Shared state a group needs while it runs
pub(crate) struct RunEnv<'a> {
    pub(crate) backend: &'a dyn JobBackend,
    pub(crate) pool: &'a CommandBufferPool,
    pub(crate) info: TickInfo,
}

pub(crate) struct Group {
    pub(crate) name: String,
    pub(crate) sequence: u32,
    pub(crate) timing: GroupTiming,
    pub(crate) fixed: Option<FixedStep>,
    pub(crate) systems: Vec<System>,
    pub(crate) commands: CommandBuffer,
    pub(crate) owner: Option<String>,
    pub(crate) stats: GroupStats,
    pub(crate) on_begin: Option<GroupHook>,
    pub(crate) on_end: Option<GroupHook>,
}

impl Group {
    pub(crate) fn new(
        name: String,
        sequence: u32,
        timing: GroupTiming,
        owner: Option<String>,
    ) -> Self {
        Group {
            name,
            sequence,
            fixed: timing.rate().map(FixedStep::new),
            timing,
            systems: Vec::new(),
            commands: CommandBuffer::new(),
            owner,
            stats: GroupStats::default(),
            on_begin: None,
            on_end: None,
        }
    }

    pub(crate) fn position(&self, id: SystemId) -> Option<usize> {
        self.systems.iter().position(|s| s.id == id)
    }

    /// Run every enabled system once, then drain the group's commands
    ///
    /// Consecutive job systems are handed to the job backend as one batch,
    /// which returns only once all of them finished. A batch ends early at a
    /// second consumer of the same stream, so a veto is always seen by the
    /// consumers registered after it.
    pub(crate) fn run(&mut self, world: &mut World, env: &RunEnv<'_>) {
        let _span = trace_span!("group", name = %self.name, tick = env.info.tick).entered();
        let start = Instant::now();

        if let Some(hook) = self.on_begin.as_mut() {
            hook(&self.name, &env.info);
        }

        let mut index = 0;
        while index < self.systems.len() {
            if !self.systems[index].job {
                let system = &mut self.systems[index];
                if system.enabled {
                    system.run_exclusive(world, &mut self.commands, env.info);
                }
                index += 1;
                continue;
            }

            let end = batch_end(&self.systems, index);
            run_batch(
                &mut self.systems[index..end],
                world,
                &mut self.commands,
                env,
            );
            index = end;
        }

        let applied = self.commands.apply(world);
        self.stats.runs += 1;
        self.stats.commands_applied += applied.applied as u64;
        self.stats.commands_skipped += applied.skipped as u64;

        if let Some(hook) = self.on_end.as_mut() {
            hook(&self.name, &env.info);
        }
        self.stats.execution_time += start.elapsed();
    }
}

/// End (exclusive) of the job batch starting at `start`
fn batch_end(systems: &[System], start: usize) -> usize {
    let mut streams = Vec::new();
    for (index, system) in systems.iter().enumerate().skip(start) {
        if !system.job {
            return index;
        }
        if let SystemKind::Stream { event, .. } = &system.kind {
            if !system.enabled {
                continue;
            }
            if streams.contains(event) {
                return index;
            }
            streams.push(*event);
        }
    }
    systems.len()
}

fn run_batch(
    systems: &mut [System],
    world: &World,
    commands: &mut CommandBuffer,
    env: &RunEnv<'_>,
) {
    let enabled: Vec<&mut System> = systems.iter_mut().filter(|s| s.enabled).collect();
    if enabled.is_empty() {
        return;
    }
    trace!(systems = enabled.len(), backend = env.backend.name(), "dispatching job batch");

    let mut buffers: Vec<_> = enabled.iter().map(|_| env.pool.acquire()).collect();
    let info = env.info;
    let jobs: Vec<Job<'_>> = enabled
        .into_iter()
        .zip(buffers.iter_mut())
        .map(|(system, buffer)| {
            Box::new(move || system.run_shared(world, buffer, info)) as Job<'_>
        })
        .collect();
    env.backend.run_all(jobs);

    // Merge in registration order so the barrier applies commands as if
    // the batch had run sequentially.
    for buffer in buffers.iter_mut() {
        commands.append(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::ComponentInfo;
    use crate::pipeline::system::{SystemContext, SystemStats};

    fn system(id: u64, job: bool, kind: SystemKind) -> System {
        System {
            id: SystemId(id),
            name: format!("system_{id}"),
            reads: Vec::new(),
            writes: Vec::new(),
            stream_writes: Vec::new(),
            job,
            enabled: true,
            owner: None,
            stats: SystemStats::default(),
            kind,
        }
    }

    fn consumer<E: 'static>(id: u64) -> System {
        let kind = SystemKind::Stream {
            event: ComponentInfo::of::<E>(),
            run: Box::new(|_: &mut SystemContext<'_>| 0),
        };
        system(id, true, kind)
    }

    fn job(id: u64) -> System {
        system(id, true, SystemKind::Execute(Box::new(|_: &mut SystemContext<'_>| {})))
    }

    #[test]
    fn test_batch_stops_at_non_job_system() {
        let systems = vec![
            job(0),
            job(1),
            system(2, false, SystemKind::Execute(Box::new(|_: &mut SystemContext<'_>| {}))),
            job(3),
        ];
        assert_eq!(batch_end(&systems, 0), 2);
        assert_eq!(batch_end(&systems, 3), 4);
    }

    #[test]
    fn test_batch_splits_at_repeated_stream_consumer() {
        let systems = vec![consumer::<u8>(0), consumer::<u16>(1), job(2), consumer::<u8>(3)];
        assert_eq!(batch_end(&systems, 0), 3);
        assert_eq!(batch_end(&systems, 3), 4);
    }

    #[test]
    fn test_disabled_consumer_does_not_split_batch() {
        let mut systems = vec![consumer::<u8>(0), consumer::<u8>(1)];
        systems[0].enabled = false;
        assert_eq!(batch_end(&systems, 0), 2);
    }

    #[test]
    fn test_fixed_step_accumulates_until_rate() {
        let mut step = FixedStep::new(0.02);
        let mut runs = 0;
        for _ in 0..5 {
            if let FixedAdvance::Steps(n) = step.advance(0.005, 10.0) {
                runs += n;
            }
        }
        assert_eq!(runs, 1);
        assert!((step.accumulator() - 0.005).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_step_runs_multiple_steps() {
        let mut step = FixedStep::new(0.02);
        assert_eq!(step.advance(0.065, 10.0), FixedAdvance::Steps(3));
        assert!((step.accumulator() - 0.005).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_step_drops_runaway_backlog() {
        let mut step = FixedStep::new(0.02);
        match step.advance(1000.0, 10.0) {
            FixedAdvance::Dropped { backlog } => assert_eq!(backlog, 1000.0),
            other => panic!("expected dropped backlog, got {:?}", other),
        }
        assert_eq!(step.accumulator(), 0.0);
        assert_eq!(step.advance(0.02, 10.0), FixedAdvance::Steps(1));
    }

    #[test]
    fn test_negative_delta_is_ignored() {
        let mut step = FixedStep::new(0.02);
        assert_eq!(step.advance(-1.0, 10.0), FixedAdvance::Steps(0));
        assert_eq!(step.accumulator(), 0.0);
    }

    #[test]
    fn test_standard_groups_are_sequenced() {
        let standard: Vec<_> = groups::standard(0.02).collect();
        assert_eq!(standard.len(), 10);
        assert_eq!(standard[0], (groups::PRE_FRAME, 1, GroupTiming::Variable));
        assert_eq!(standard[2], (groups::FIXED_UPDATE, 3, GroupTiming::fixed(0.02)));
        assert_eq!(standard[9], (groups::POST_FRAME, 10, GroupTiming::Variable));
    }

    #[test]
    fn test_timing_accessors() {
        assert!(!GroupTiming::Variable.is_fixed());
        assert_eq!(GroupTiming::Variable.rate(), None);
        assert!(GroupTiming::fixed(0.5).is_fixed());
        assert_eq!(GroupTiming::fixed(0.5).rate(), Some(0.5));
    }
}
