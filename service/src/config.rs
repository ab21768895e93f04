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

//! Server configuration

use crate::{Result, ServiceError};
use kioken_pool::PoolConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration
///
/// This structure contains all admission control knobs for the TCP server.
/// Use the builder pattern methods to customize the configuration.
///
/// # Example
///
/// ```
/// use kioken_service::ServerConfig;
/// use kioken_pool::PoolConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::new("127.0.0.1:1234".parse().unwrap())
///     .with_acceptors(8)
///     .with_pool(PoolConfig::new(256).with_min_capacity(16))
///     .with_admission_timeout(Duration::from_millis(50));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    /// Number of parallel accept loops
    pub acceptors: usize,

    /// Worker pool sizing (initial capacity, floor, idle reclamation threshold)
    pub pool: PoolConfig,

    /// How long an accepted connection may wait for a free worker
    ///
    /// Connections that are not picked up within this duration are closed
    /// unprocessed. Zero waits indefinitely.
    pub admission_timeout: Duration,

    /// Read deadline, refreshed before every read
    ///
    /// A connection that sends nothing for this long is closed.
    pub read_timeout: Duration,

    /// Size of the per-connection read buffer
    pub read_buffer_size: usize,

    /// Length of a statistics window
    pub stats_interval: Duration,

    /// How long shutdown waits for the accept loops to wind down
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 1234)),
            acceptors: 5,
            pool: PoolConfig::default(),
            admission_timeout: Duration::from_millis(100),
            read_timeout: Duration::from_secs(10),
            read_buffer_size: 1024,
            stats_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the given bind address
    ///
    /// All other settings will use their default values.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the number of accept loops
    pub fn with_acceptors(mut self, acceptors: usize) -> Self {
        self.acceptors = acceptors;
        self
    }

    /// Set the worker pool configuration
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the admission (submission) timeout
    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    /// Set the read timeout duration
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the read buffer size
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the statistics window length
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Set the shutdown timeout duration
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validate the configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.acceptors == 0 {
            return Err(invalid("acceptors must be greater than 0"));
        }

        if self.read_timeout.is_zero() {
            return Err(invalid("read_timeout must be greater than 0"));
        }

        if self.read_buffer_size == 0 {
            return Err(invalid("read_buffer_size must be greater than 0"));
        }

        if self.stats_interval.is_zero() {
            return Err(invalid("stats_interval must be greater than 0"));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(invalid("shutdown_timeout must be greater than 0"));
        }

        self.pool.validate()?;

        Ok(())
    }
}

fn invalid(reason: &str) -> ServiceError {
    ServiceError::InvalidConfig(reason.to_string())
}
