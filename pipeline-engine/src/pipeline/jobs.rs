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
//! Job backends for job-eligible systems
//!
//! The pipeline hands each batch of consecutive job systems to a
//! [`JobBackend`] and expects every job to have finished when `run_all`
//! returns. That return is the group barrier.

use std::sync::Arc;

/// One unit of work borrowed from the running group
pub type Job<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Executes batches of jobs
pub trait JobBackend: Send + Sync {
    /// Backend name for diagnostics
    fn name(&self) -> &str;

    /// Number of threads jobs may run on
    fn thread_count(&self) -> usize {
        1
    }

    /// Run every job and block until all of them are done
    ///
    /// A panic in any job must propagate to the caller once the batch has
    /// settled.
    fn run_all<'a>(&self, jobs: Vec<Job<'a>>);
}

/// Runs jobs one after another on the calling thread
///
/// Deterministic; the backend of choice for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineJobs;

impl JobBackend for InlineJobs {
    fn name(&self) -> &str {
        "inline"
    }

    fn run_all<'a>(&self, jobs: Vec<Job<'a>>) {
        for job in jobs {
            job();
        }
    }
}

/// Runs jobs on a dedicated Rayon thread pool
#[cfg(feature = "parallel")]
pub struct RayonJobs {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl RayonJobs {
    /// Build a pool with `threads` workers, or Rayon's default when `None`
    pub fn new(threads: Option<usize>) -> Result<Self, rayon::ThreadPoolBuildError> {
        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|index| format!("pipeline-job-{}", index));
        if let Some(threads) = threads {
            builder = builder.num_threads(threads);
        }
        Ok(RayonJobs {
            pool: builder.build()?,
        })
    }
}

#[cfg(feature = "parallel")]
impl JobBackend for RayonJobs {
    fn name(&self) -> &str {
        "rayon"
    }

    fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn run_all<'a>(&self, jobs: Vec<Job<'a>>) {
        if jobs.len() == 1 {
            // Not worth a hop to the pool.
            for job in jobs {
                job();
            }
            return;
        }
        self.pool.scope(|scope| {
            for job in jobs {
                scope.spawn(move |_| job());
            }
        });
    }
}

/// The backend used when none is injected
///
/// Rayon with `threads` workers when the `parallel` feature is enabled,
/// falling back to [`InlineJobs`] if the pool cannot be built.
pub fn default_backend(threads: Option<usize>) -> Arc<dyn JobBackend> {
    #[cfg(feature = "parallel")]
    {
        match RayonJobs::new(threads) {
            Ok(backend) => return Arc::new(backend),
            Err(err) => {
                tracing::warn!(error = %err, "failed to build job thread pool, running jobs inline");
            }
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = threads;
    Arc::new(InlineJobs)
}
