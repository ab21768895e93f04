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

//! Error types for the Kioken service

use kioken_pool::PoolError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Service error types
#[derive(Debug, Error)]
pub enum ServiceError {
    /// I/O error from the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The listening address could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested
        address: SocketAddr,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Error from the worker pool
    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    /// The configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Server is already running
    #[error("Server already running")]
    AlreadyRunning,

    /// Server is not running
    #[error("Server not running")]
    NotRunning,

    /// Server has been shut down and cannot be restarted
    #[error("Server has been shut down")]
    Terminated,
}

impl ServiceError {
    /// Check if the error is fatal at startup
    ///
    /// There is no recovery for these inside the service; the caller has to
    /// fix the configuration or environment and try again.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServiceError::Bind { .. } | ServiceError::InvalidConfig(_) | ServiceError::Terminated
        )
    }

    /// Check if the error is recoverable
    ///
    /// Recoverable errors are those where retrying the operation might succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ServiceError::Io(_) => true,
            ServiceError::Pool(e) => e.is_rejection(),
            _ => false,
        }
    }
}

/// Classify an accept() failure
///
/// Per-connection failures leave the listener healthy and are retried at once.
pub(crate) fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}
