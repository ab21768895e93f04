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

//! Error types for the worker pool

use std::time::Duration;
use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Worker pool error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been shut down and accepts no more work
    #[error("Worker pool is shut down")]
    Shutdown,

    /// No worker took the task before the submission timeout expired
    #[error("Submission timed out after {0:?}")]
    Timeout(Duration),

    /// The pool configuration is invalid
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),
}

impl PoolError {
    /// Check if the error is a backpressure rejection
    ///
    /// A rejected submission is an expected outcome under load; the caller
    /// decides whether to drop the work or retry.
    pub fn is_rejection(&self) -> bool {
        matches!(self, PoolError::Timeout(_))
    }

    /// Check if the error is terminal for the pool
    pub fn is_shutdown(&self) -> bool {
        matches!(self, PoolError::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(PoolError::Timeout(Duration::from_millis(50)).is_rejection());
        assert!(!PoolError::Shutdown.is_rejection());
        assert!(PoolError::Shutdown.is_shutdown());
        assert!(!PoolError::InvalidConfig("x".to_string()).is_shutdown());
    }

    #[test]
    fn test_error_display() {
        let err = PoolError::Timeout(Duration::from_millis(50));
        assert_eq!(err.to_string(), "Submission timed out after 50ms");

        assert_eq!(PoolError::Shutdown.to_string(), "Worker pool is shut down");
    }
}
