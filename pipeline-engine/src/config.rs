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
//! Pipeline configuration
//!
//! # Environment Configuration
//!
//! [`PipelineConfig::from_env`] starts from the defaults and applies any of:
//! ```bash
//! export PIPELINE_FIXED_RATE=0.0166667   # seconds per FixedUpdate step
//! export PIPELINE_MAX_BACKLOG=5.0        # fixed-step backlog ceiling, seconds
//! export PIPELINE_JOB_THREADS=4          # worker threads for job systems
//! export PIPELINE_MAX_EVENT_AGE=300      # ticks an unread event may wait
//! ```
//! Values that do not parse, or are not positive, are ignored with a warning.
//! So is a rate/backlog pair whose step is longer than the backlog ceiling,
//! since such a fixed group could never run.

use crate::pool::PoolConfig;
use tracing::warn;

/// Environment variable overriding [`PipelineConfig::fixed_update_rate`]
pub const ENV_FIXED_RATE: &str = "PIPELINE_FIXED_RATE";
/// Environment variable overriding [`PipelineConfig::max_fixed_backlog`]
pub const ENV_MAX_BACKLOG: &str = "PIPELINE_MAX_BACKLOG";
/// Environment variable overriding [`PipelineConfig::job_threads`]
pub const ENV_JOB_THREADS: &str = "PIPELINE_JOB_THREADS";
/// Environment variable overriding [`PipelineConfig::max_event_age`]
pub const ENV_MAX_EVENT_AGE: &str = "PIPELINE_MAX_EVENT_AGE";

/// Default fixed-step rate: 50 steps per second
pub const DEFAULT_FIXED_RATE: f64 = 1.0 / 50.0;
/// Default backlog ceiling for fixed groups, in seconds
pub const DEFAULT_MAX_BACKLOG: f64 = 10.0;
/// Default number of ticks an event waits for a slow consumer
pub const DEFAULT_MAX_EVENT_AGE: u64 = 300;

/// Configuration for a [`crate::pipeline::Pipeline`]
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Seconds per step of the standard FixedUpdate group
    pub fixed_update_rate: f64,
    /// Accumulated time above which a fixed group drops its backlog instead
    /// of catching up
    pub max_fixed_backlog: f64,
    /// Worker threads for job-eligible systems; `None` lets the job backend
    /// decide
    pub job_threads: Option<usize>,
    /// Ticks after which a stream event is discarded even if a subscribed
    /// consumer has not read it yet
    pub max_event_age: u64,
    /// Pool of command buffers handed to job-executed systems
    pub command_pool: PoolConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            fixed_update_rate: DEFAULT_FIXED_RATE,
            max_fixed_backlog: DEFAULT_MAX_BACKLOG,
            job_threads: None,
            max_event_age: DEFAULT_MAX_EVENT_AGE,
            command_pool: PoolConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by the `PIPELINE_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by variable name
    ///
    /// A rate and backlog ceiling that would leave FixedUpdate unable to
    /// complete a step are both ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let rate = parse_positive::<f64>(ENV_FIXED_RATE, lookup(ENV_FIXED_RATE))
            .unwrap_or(self.fixed_update_rate);
        let backlog = parse_positive::<f64>(ENV_MAX_BACKLOG, lookup(ENV_MAX_BACKLOG))
            .unwrap_or(self.max_fixed_backlog);
        if rate > backlog {
            warn!(
                rate,
                max_backlog = backlog,
                "ignoring fixed rate and backlog overrides; a step longer than the ceiling never runs"
            );
        } else {
            self.fixed_update_rate = rate;
            self.max_fixed_backlog = backlog;
        }
        if let Some(threads) = parse_positive::<usize>(ENV_JOB_THREADS, lookup(ENV_JOB_THREADS)) {
            self.job_threads = Some(threads);
        }
        if let Some(age) = parse_positive::<u64>(ENV_MAX_EVENT_AGE, lookup(ENV_MAX_EVENT_AGE)) {
            self.max_event_age = age;
        }
        self
    }

    /// Set the FixedUpdate step length in seconds
    pub fn with_fixed_rate(mut self, seconds: f64) -> Self {
        assert!(
            seconds.is_finite() && seconds > 0.0,
            "Fixed rate must be positive and finite"
        );
        self.fixed_update_rate = seconds;
        self
    }

    /// Set the fixed-step backlog ceiling in seconds
    pub fn with_max_backlog(mut self, seconds: f64) -> Self {
        assert!(
            seconds.is_finite() && seconds > 0.0,
            "Backlog ceiling must be positive and finite"
        );
        self.max_fixed_backlog = seconds;
        self
    }

    /// Set how many ticks an event may wait for a consumer that has not
    /// read it
    pub fn with_max_event_age(mut self, ticks: u64) -> Self {
        self.max_event_age = ticks;
        self
    }

    /// Set the number of worker threads for job systems
    pub fn with_job_threads(mut self, threads: usize) -> Self {
        self.job_threads = Some(threads.max(1));
        self
    }

    /// Set the command buffer pool configuration
    pub fn with_command_pool(mut self, pool: PoolConfig) -> Self {
        self.command_pool = pool;
        self
    }
}

trait Positive: std::str::FromStr + Copy {
    fn is_positive(self) -> bool;
}

impl Positive for f64 {
    fn is_positive(self) -> bool {
        self.is_finite() && self > 0.0
    }
}

impl Positive for usize {
    fn is_positive(self) -> bool {
        self > 0
    }
}

impl Positive for u64 {
    fn is_positive(self) -> bool {
        self > 0
    }
}

fn parse_positive<T: Positive>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(value) if value.is_positive() => Some(value),
        _ => {
            warn!(key, value = %raw, "ignoring invalid pipeline configuration override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.fixed_update_rate, 0.02);
        assert_eq!(config.max_fixed_backlog, 10.0);
        assert!(config.job_threads.is_none());
    }

    #[test]
    fn test_overrides_apply() {
        let config = PipelineConfig::default().with_overrides(lookup(&[
            (ENV_FIXED_RATE, "0.01"),
            (ENV_MAX_BACKLOG, " 2.5 "),
            (ENV_JOB_THREADS, "3"),
            (ENV_MAX_EVENT_AGE, "40"),
        ]));
        assert_eq!(config.fixed_update_rate, 0.01);
        assert_eq!(config.max_fixed_backlog, 2.5);
        assert_eq!(config.job_threads, Some(3));
        assert_eq!(config.max_event_age, 40);
    }

    #[test]
    fn test_rate_above_backlog_override_is_ignored() {
        let config = PipelineConfig::default().with_overrides(lookup(&[(ENV_FIXED_RATE, "20")]));
        assert_eq!(config.fixed_update_rate, DEFAULT_FIXED_RATE);
        assert_eq!(config.max_fixed_backlog, DEFAULT_MAX_BACKLOG);

        let config = PipelineConfig::default().with_overrides(lookup(&[
            (ENV_FIXED_RATE, "0.5"),
            (ENV_MAX_BACKLOG, "0.1"),
        ]));
        assert_eq!(config.fixed_update_rate, DEFAULT_FIXED_RATE);
        assert_eq!(config.max_fixed_backlog, DEFAULT_MAX_BACKLOG);

        let config = PipelineConfig::default().with_overrides(lookup(&[
            (ENV_FIXED_RATE, "20"),
            (ENV_MAX_BACKLOG, "60"),
        ]));
        assert_eq!(config.fixed_update_rate, 20.0);
        assert_eq!(config.max_fixed_backlog, 60.0);
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let config = PipelineConfig::default().with_overrides(lookup(&[
            (ENV_FIXED_RATE, "-1"),
            (ENV_MAX_BACKLOG, "lots"),
            (ENV_JOB_THREADS, "0"),
        ]));
        assert_eq!(config.fixed_update_rate, DEFAULT_FIXED_RATE);
        assert_eq!(config.max_fixed_backlog, DEFAULT_MAX_BACKLOG);
        assert!(config.job_threads.is_none());
        assert_eq!(config.max_event_age, DEFAULT_MAX_EVENT_AGE);
    }

    #[test]
    fn test_builder_methods() {
        let config = PipelineConfig::default()
            .with_fixed_rate(0.25)
            .with_max_backlog(1.0)
            .with_job_threads(0);
        assert_eq!(config.fixed_update_rate, 0.25);
        assert_eq!(config.max_fixed_backlog, 1.0);
        assert_eq!(config.job_threads, Some(1));
    }

    #[test]
    #[should_panic(expected = "Fixed rate must be positive and finite")]
    fn test_zero_fixed_rate_panics() {
        PipelineConfig::default().with_fixed_rate(0.0);
    }
}
