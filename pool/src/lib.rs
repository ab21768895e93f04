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

//! Elastic Worker Pool
//!
//! A bounded concurrency scheduler for async tasks:
//!
//! - At most `capacity` tasks execute at once
//! - Submission is a hand-off: it succeeds only once a worker takes the task,
//!   and a submission timeout turns saturation into a backpressure signal
//! - Capacity can be grown or shrunk at runtime; stopped workers finish their
//!   in-flight task first
//! - Idle workers are reclaimed down to a configured floor
//! - Shutdown happens exactly once no matter how many callers request it
//! - A panicking task never takes its worker down
//!
//! # Architecture
//!
//! ```text
//! submit() ──► bounded FIFO queue ──► Worker (slot 0)
//!                                 ├─► Worker (slot 1)
//!                                 └─► Worker (slot n)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use kioken_pool::{PoolConfig, PoolError, WorkerPool};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = WorkerPool::new(PoolConfig::new(2).with_min_capacity(1))?;
//!
//!     match pool.submit(async { /* work */ }, Duration::from_millis(100)).await {
//!         Ok(()) => {}
//!         Err(PoolError::Timeout(_)) => { /* saturated, shed the work */ }
//!         Err(e) => return Err(e.into()),
//!     }
//!
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod pool;
mod worker;

pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use pool::{PoolStats, WorkerPool};
pub use worker::WorkerId;
