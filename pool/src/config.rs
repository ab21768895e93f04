//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Worker pool configuration

use crate::{PoolError, Result};
use std::time::Duration;

/// Worker pool configuration
///
/// Use the builder methods to customize a configuration and call
/// [`PoolConfig::validate`] (done automatically by [`WorkerPool::new`]) before use.
///
/// # Example
///
/// ```
/// use kioken_pool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::default()
///     .with_capacity(16)
///     .with_min_capacity(4)
///     .with_idle_timeout(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
///
/// [`WorkerPool::new`]: crate::WorkerPool::new
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers started with the pool
    pub capacity: usize,

    /// Floor that neither idle reclamation nor a resize may go below
    ///
    /// Must be at least 1 so the pool can always make progress on queued work.
    pub min_capacity: usize,

    /// How long a worker may sit without a task before it offers itself for reclamation
    pub idle_timeout: Duration,

    /// Maximum number of tasks waiting in the hand-off queue
    pub queue_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            min_capacity: 1,
            idle_timeout: Duration::from_secs(60),
            queue_depth: 1024,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given initial capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Set the initial number of workers
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the minimum number of workers
    pub fn with_min_capacity(mut self, min_capacity: usize) -> Self {
        self.min_capacity = min_capacity;
        self
    }

    /// Set the idle reclamation threshold
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the hand-off queue depth
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.min_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "min_capacity must be greater than 0".to_string(),
            ));
        }

        if self.capacity < self.min_capacity {
            return Err(PoolError::InvalidConfig(format!(
                "capacity ({}) must not be below min_capacity ({})",
                self.capacity, self.min_capacity
            )));
        }

        if self.idle_timeout.is_zero() {
            return Err(PoolError::InvalidConfig(
                "idle_timeout must be greater than 0".to_string(),
            ));
        }

        if self.queue_depth == 0 {
            return Err(PoolError::InvalidConfig(
                "queue_depth must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.capacity, 64);
        assert_eq!(config.min_capacity, 1);
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = PoolConfig::new(8)
            .with_min_capacity(2)
            .with_idle_timeout(Duration::from_secs(5))
            .with_queue_depth(16);

        assert_eq!(config.capacity, 8);
        assert_eq!(config.min_capacity, 2);
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.queue_depth, 16);
    }

    #[test]
    fn test_validation() {
        let mut config = PoolConfig::new(4);
        assert!(config.validate().is_ok());

        // A zero floor would let reclamation starve the pool
        config.min_capacity = 0;
        assert!(config.validate().is_err());

        config.min_capacity = 5;
        assert!(config.validate().is_err());

        config.min_capacity = 1;
        config.idle_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config.idle_timeout = Duration::from_secs(1);
        config.queue_depth = 0;
        assert!(config.validate().is_err());
    }
}
