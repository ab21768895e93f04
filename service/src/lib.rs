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

//! Kioken Connection Service
//!
//! Accepts TCP connections as fast as possible, hands each one to a bounded
//! worker pool, and publishes connection telemetry once per window:
//!
//! - Several accept loops share one listening socket
//! - Admission waits a bounded time for a free worker, then sheds the connection
//! - Each admitted connection is read and discarded until it goes quiet
//! - Rates are published to a watch channel and an optional telemetry sink
//!
//! # Architecture
//!
//! ```text
//! TcpServer (accept loops)
//!     ↓ submit
//! WorkerPool
//!     ↓
//! ConnectionHandler → ServerStats → StatsAggregator → TelemetrySink
//! ```
//!
//! # Example
//!
//! ```no_run
//! use kioken_service::{ServerConfig, TcpServer, TracingSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = TcpServer::new(ServerConfig::default()).await?;
//!     server.start(Some(Arc::new(TracingSink)))?;
//!
//!     let mut snapshots = server.subscribe();
//!     while snapshots.changed().await.is_ok() {
//!         println!("{}", *snapshots.borrow());
//!     }
//!     Ok(())
//! }
//! ```

mod aggregator;
mod config;
mod connection;
mod error;
mod server;
mod sink;
mod stats;
mod types;

pub use aggregator::StatsAggregator;
pub use config::ServerConfig;
pub use connection::{ConnectionHandler, HandlerConfig};
pub use error::{Result, ServiceError};
pub use server::TcpServer;
pub use sink::{CallbackSink, TelemetrySink, TracingSink};
pub use stats::{ActiveConnection, ServerStats, WindowTotals};
pub use types::{CloseReason, PublishedSnapshot};
