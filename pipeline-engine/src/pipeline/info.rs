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
//! Introspection snapshots for diagnostic tooling

use crate::ecs::ComponentInfo;
use crate::pipeline::group::{Group, GroupHandle, GroupStats, GroupTiming};
use crate::pipeline::system::{System, SystemId, SystemShape, SystemStats};
use std::fmt;

/// Snapshot of a group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupInfo {
    /// Handle of the group
    pub handle: GroupHandle,
    /// Unique name
    pub name: String,
    /// Position in the frame
    pub sequence: u32,
    /// Variable or fixed timing
    pub timing: GroupTiming,
    /// Seconds accumulated towards the next fixed step
    pub accumulator: f64,
    /// Number of registered systems
    pub systems: usize,
    /// Module that defined the group
    pub owner: Option<String>,
    /// Run statistics
    pub stats: GroupStats,
}

impl GroupInfo {
    pub(crate) fn new(handle: GroupHandle, group: &Group) -> Self {
        GroupInfo {
            handle,
            name: group.name.clone(),
            sequence: group.sequence,
            timing: group.timing,
            accumulator: group.fixed.map_or(0.0, |step| step.accumulator()),
            systems: group.systems.len(),
            owner: group.owner.clone(),
            stats: group.stats,
        }
    }
}

/// Snapshot of a system
#[derive(Debug, Clone, PartialEq)]
pub struct SystemInfo {
    /// Handle of the system
    pub id: SystemId,
    /// Unique name
    pub name: String,
    /// Name of the group the system runs in
    pub group: String,
    /// Execution shape
    pub shape: SystemShape,
    /// Component types declared as read
    pub reads: Vec<ComponentInfo>,
    /// Component types declared as written
    pub writes: Vec<ComponentInfo>,
    /// Event types the system declared it pushes
    pub stream_writes: Vec<ComponentInfo>,
    /// Whether the system may run on a worker thread
    pub job: bool,
    /// Whether the system currently runs
    pub enabled: bool,
    /// Module that registered the system
    pub owner: Option<String>,
    /// Runtime statistics
    pub stats: SystemStats,
}

impl SystemInfo {
    pub(crate) fn new(system: &System, group: &Group) -> Self {
        SystemInfo {
            id: system.id,
            name: system.name.clone(),
            group: group.name.clone(),
            shape: system.kind.shape(),
            reads: system.reads.clone(),
            writes: system.writes.clone(),
            stream_writes: system.stream_writes.clone(),
            job: system.job,
            enabled: system.enabled,
            owner: system.owner.clone(),
            stats: system.stats,
        }
    }
}

/// Full pipeline snapshot, rendered as a table by its `Display` impl
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Completed ticks
    pub tick: u64,
    /// Name of the job backend
    pub backend: String,
    /// Groups in sequence order
    pub groups: Vec<GroupInfo>,
    /// Systems in execution order
    pub systems: Vec<SystemInfo>,
}

fn join(list: &[ComponentInfo]) -> String {
    if list.is_empty() {
        return "-".to_string();
    }
    list.iter()
        .map(|c| c.short_name())
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pipeline after {} ticks ({} jobs)", self.tick, self.backend)?;
        for group in &self.groups {
            let timing = match group.timing {
                GroupTiming::Variable => "variable".to_string(),
                GroupTiming::Fixed { rate } => format!("fixed {:.4}s", rate),
            };
            writeln!(
                f,
                "[{:>2}] {:<14} {:<14} runs={:<6} time={:?}",
                group.sequence, group.name, timing, group.stats.runs, group.stats.execution_time
            )?;
            for system in self.systems.iter().filter(|s| s.group == group.name) {
                writeln!(
                    f,
                    "     {} {:<28} {:<16} r={} w={} count={} runs={} time={:?}{}",
                    if system.enabled { ' ' } else { '-' },
                    system.name,
                    system.shape.to_string(),
                    join(&system.reads),
                    join(&system.writes),
                    system.stats.count,
                    system.stats.runs,
                    system.stats.execution_time,
                    if system.job { " job" } else { "" },
                )?;
            }
        }
        Ok(())
    }
}
