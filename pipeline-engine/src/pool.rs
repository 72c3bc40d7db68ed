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
//! Command buffer pooling
//!
//! Job-executed systems record deferred commands into scratch buffers of
//! their own, which are merged into the group buffer at the barrier. The
//! pool recycles those scratch buffers across ticks so a steady-state frame
//! allocates nothing for them.

use crate::ecs::CommandBuffer;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Configuration for buffer pool behavior
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Initial command capacity of each newly allocated buffer
    pub initial_capacity: usize,
    /// Maximum number of idle buffers to keep in the pool
    pub max_pool_size: usize,
    /// Whether to log when the pool has to allocate
    pub log_resize_events: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            initial_capacity: 64,
            max_pool_size: 8,
            log_resize_events: false,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with custom settings
    pub fn new(initial_capacity: usize, max_pool_size: usize) -> Self {
        PoolConfig {
            initial_capacity,
            max_pool_size,
            log_resize_events: false,
        }
    }

    /// Enable logging for allocation events
    pub fn with_logging(mut self) -> Self {
        self.log_resize_events = true;
        self
    }
}

/// Statistics for monitoring pool performance
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of times a buffer was successfully borrowed from the pool
    pub hits: usize,
    /// Number of times a new buffer had to be allocated
    pub misses: usize,
    /// Current number of buffers in the pool
    pub pool_size: usize,
    /// Peak number of idle buffers ever held
    pub peak_size: usize,
}

impl PoolStats {
    /// Calculate the hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct PoolState {
    idle: Vec<CommandBuffer>,
    stats: PoolStats,
}

/// A thread-safe pool of [`CommandBuffer`]s
///
/// Cloning the pool yields another handle to the same buffers.
#[derive(Clone)]
pub struct CommandBufferPool {
    state: Arc<Mutex<PoolState>>,
    config: PoolConfig,
}

impl CommandBufferPool {
    /// Create a pool with default configuration
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool with custom configuration
    pub fn with_config(config: PoolConfig) -> Self {
        CommandBufferPool {
            state: Arc::new(Mutex::new(PoolState {
                idle: Vec::new(),
                stats: PoolStats::default(),
            })),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take an empty buffer out of the pool, allocating if none is idle
    ///
    /// The buffer goes back to the pool when the guard is dropped; any
    /// commands still in it are discarded.
    pub fn acquire(&self) -> PooledBuffer {
        let mut state = self.lock();
        let buffer = match state.idle.pop() {
            Some(buffer) => {
                state.stats.hits += 1;
                buffer
            }
            None => {
                state.stats.misses += 1;
                if self.config.log_resize_events {
                    debug!(
                        hit_rate = state.stats.hit_rate(),
                        "command buffer pool allocating new buffer"
                    );
                }
                CommandBuffer::with_capacity(self.config.initial_capacity)
            }
        };
        state.stats.pool_size = state.idle.len();
        drop(state);

        PooledBuffer {
            buffer: Some(buffer),
            state: Arc::clone(&self.state),
            max_pool_size: self.config.max_pool_size,
        }
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        self.lock().stats.clone()
    }

    /// Drop every idle buffer
    pub fn clear(&self) {
        let mut state = self.lock();
        state.idle.clear();
        state.stats.pool_size = 0;
    }

    /// Get the current number of idle buffers
    pub fn len(&self) -> usize {
        self.lock().idle.len()
    }

    /// Check if the pool holds no idle buffers
    pub fn is_empty(&self) -> bool {
        self.lock().idle.is_empty()
    }
}

impl Default for CommandBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a pooled [`CommandBuffer`]
pub struct PooledBuffer {
    buffer: Option<CommandBuffer>,
    state: Arc<Mutex<PoolState>>,
    max_pool_size: usize,
}

impl std::ops::Deref for PooledBuffer {
    type Target = CommandBuffer;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the buffer out.
        self.buffer.as_ref().expect("pooled buffer present until drop")
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer.as_mut().expect("pooled buffer present until drop")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            buffer.clear();
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.idle.len() < self.max_pool_size {
                state.idle.push(buffer);
                state.stats.pool_size = state.idle.len();
                if state.stats.pool_size > state.stats.peak_size {
                    state.stats.peak_size = state.stats.pool_size;
                }
            }
            // If pool is full, buffer is dropped (deallocated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Entity;

    #[derive(Default)]
    struct Marker;
    impl crate::ecs::Component for Marker {}

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.initial_capacity, 64);
        assert_eq!(config.max_pool_size, 8);
        assert!(!config.log_resize_events);
    }

    #[test]
    fn test_acquire_and_return() {
        let pool = CommandBufferPool::new();
        {
            let mut buffer = pool.acquire();
            buffer.add::<Marker>(Entity::new(1, 0));
            assert_eq!(buffer.len(), 1);
        }
        assert_eq!(pool.len(), 1);

        let stats = pool.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_reused_buffer_is_empty() {
        let pool = CommandBufferPool::new();
        {
            let mut buffer = pool.acquire();
            buffer.destroy(Entity::new(1, 0));
        }
        {
            let buffer = pool.acquire();
            assert!(buffer.is_empty());
        }

        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[test]
    fn test_pool_max_size() {
        let pool = CommandBufferPool::with_config(PoolConfig::new(4, 2));
        {
            let _g1 = pool.acquire();
            let _g2 = pool.acquire();
            let _g3 = pool.acquire();
        }
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.stats().peak_size, 2);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let pool = CommandBufferPool::new();
        let pool_clone = pool.clone();

        let handle = thread::spawn(move || {
            let mut buffer = pool_clone.acquire();
            buffer.destroy(Entity::new(1, 0));
        });

        let mut buffer = pool.acquire();
        buffer.destroy(Entity::new(2, 0));

        handle.join().unwrap();
        assert_eq!(pool.stats().misses, 2);
    }

    #[test]
    fn test_clear() {
        let pool = CommandBufferPool::new();
        {
            let _g1 = pool.acquire();
            let _g2 = pool.acquire();
        }
        assert_eq!(pool.len(), 2);

        pool.clear();
        assert!(pool.is_empty());
    }
}
