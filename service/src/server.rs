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

//! TCP server implementation
//!
//! The TcpServer owns the listening socket and admits connections: it runs
//! the accept loops, hands every accepted connection to the worker pool and
//! drives the statistics aggregator.

use crate::connection::{ConnectionHandler, HandlerConfig};
use crate::error::is_transient_accept_error;
use crate::{
    PublishedSnapshot, Result, ServerConfig, ServerStats, ServiceError, StatsAggregator,
    TelemetrySink,
};
use kioken_pool::{PoolError, WorkerPool};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

/// Pause after a non-transient accept failure (e.g. descriptor exhaustion)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// TCP server
///
/// This is the main server that accepts connections and manages their lifecycle.
///
/// # Example
///
/// ```no_run
/// use kioken_service::{ServerConfig, TcpServer, TracingSink};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServerConfig::new("0.0.0.0:1234".parse()?);
///     let server = TcpServer::new(config).await?;
///
///     server.start(Some(Arc::new(TracingSink)))?;
///
///     tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///
///     Ok(())
/// }
/// ```
pub struct TcpServer {
    /// Server configuration
    config: ServerConfig,
    /// Listening socket, shared by all accept loops
    listener: Arc<TcpListener>,
    /// Actual bind address
    bind_address: SocketAddr,
    /// Worker pool running the connection handlers
    pool: WorkerPool,
    /// Raw statistics
    stats: Arc<ServerStats>,
    /// Aggregator, parked here until the server starts
    aggregator: Mutex<Option<StatsAggregator>>,
    /// Latest published snapshot
    snapshots: watch::Receiver<PublishedSnapshot>,
    /// Server start time
    started_at: Instant,
    /// Running flag
    running: AtomicBool,
    /// Shutdown signal observed by every loop
    shutdown: CancellationToken,
    /// Accept loops and the aggregator
    tasks: TaskTracker,
}

impl TcpServer {
    /// Create a new server with the given configuration
    ///
    /// This binds to the configured address and starts the worker pool, but
    /// does not accept connections until `start()` is called.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address)
            .await
            .map_err(|source| ServiceError::Bind {
                address: config.bind_address,
                source,
            })?;
        let bind_address = listener.local_addr()?;

        let pool = WorkerPool::new(config.pool.clone())?;
        let stats = Arc::new(ServerStats::new());
        let aggregator = StatsAggregator::new(stats.clone(), config.stats_interval);
        let snapshots = aggregator.subscribe();

        info!("TCP server bound to {}", bind_address);

        Ok(Self {
            config,
            listener: Arc::new(listener),
            bind_address,
            pool,
            stats,
            aggregator: Mutex::new(Some(aggregator)),
            snapshots,
            started_at: Instant::now(),
            running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// Start accepting connections
    ///
    /// Spawns the accept loops and the aggregator, which publishes to `sink`
    /// (if any) and to [`subscribe`](Self::subscribe) receivers. The server
    /// runs until `shutdown()` is called.
    pub fn start(&self, sink: Option<Arc<dyn TelemetrySink>>) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ServiceError::Terminated);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning);
        }

        let aggregator = self
            .aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut aggregator) = aggregator else {
            return Err(ServiceError::Terminated);
        };
        aggregator.set_sink(sink);

        info!(
            acceptors = self.config.acceptors,
            "Starting TCP server on {}", self.bind_address
        );

        self.tasks.spawn(aggregator.run(self.shutdown.clone()));
        for index in 0..self.config.acceptors {
            let acceptor = Acceptor {
                index,
                listener: self.listener.clone(),
                pool: self.pool.clone(),
                stats: self.stats.clone(),
                admission_timeout: self.config.admission_timeout,
                handler_config: HandlerConfig {
                    read_timeout: self.config.read_timeout,
                    buffer_size: self.config.read_buffer_size,
                },
                shutdown: self.shutdown.clone(),
            };
            self.tasks.spawn(acceptor.run());
        }

        Ok(())
    }

    /// Shutdown the server gracefully
    ///
    /// This stops accepting new connections, tells in-flight handlers to
    /// finish, and waits for the worker pool to drain.
    ///
    /// Only the call that stops a running server returns `Ok`. Any other call
    /// (before `start()`, concurrent with or after another shutdown) returns
    /// [`ServiceError::NotRunning`], but still terminates the server and
    /// waits until the worker pool has fully shut down.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            self.shutdown.cancel();
            self.pool.shutdown().await;
            return Err(ServiceError::NotRunning);
        }

        info!("Shutting down TCP server");

        self.shutdown.cancel();
        self.tasks.close();

        if tokio::time::timeout(self.config.shutdown_timeout, self.tasks.wait())
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.config.shutdown_timeout,
                "Accept loops did not stop in time"
            );
        }

        self.pool.shutdown().await;

        info!("TCP server shutdown complete");

        Ok(())
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.bind_address
    }

    /// Subscribe to published snapshots
    pub fn subscribe(&self) -> watch::Receiver<PublishedSnapshot> {
        self.snapshots.clone()
    }

    /// Get the most recently published snapshot
    pub fn snapshot(&self) -> PublishedSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Connections admitted during the last closed window
    pub fn connections_per_sec(&self) -> u64 {
        self.snapshots.borrow().connections_per_sec
    }

    /// Distinct source addresses seen during the last closed window
    pub fn unique_ips_per_sec(&self) -> u64 {
        self.snapshots.borrow().unique_ips_per_sec
    }

    /// Get the number of open connections
    pub fn active_connections(&self) -> u64 {
        self.stats.active_connections()
    }

    /// Get the number of connections admitted since start
    pub fn total_connections(&self) -> u64 {
        self.stats.total_connections()
    }

    /// Get the raw statistics
    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    /// Get the worker pool
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Get the time since the server was created
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("bind_address", &self.local_addr())
            .field("running", &self.is_running())
            .field("active_connections", &self.active_connections())
            .field("uptime", &self.uptime())
            .finish()
    }
}

// Implement Drop to ensure cleanup
impl Drop for TcpServer {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            warn!("TcpServer dropped while still running");
        }
        self.shutdown.cancel();
        self.pool.close();
    }
}

/// One accept loop
struct Acceptor {
    index: usize,
    listener: Arc<TcpListener>,
    pool: WorkerPool,
    stats: Arc<ServerStats>,
    admission_timeout: Duration,
    handler_config: HandlerConfig,
    shutdown: CancellationToken,
}

impl Acceptor {
    async fn run(self) {
        debug!(acceptor = self.index, "Accept loop started");

        loop {
            let accepted = select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, peer_addr)) => {
                    if !self.admit(socket, peer_addr).await {
                        break;
                    }
                }
                Err(e) if is_transient_accept_error(&e) => {
                    trace!(acceptor = self.index, error = %e, "Transient accept failure");
                }
                Err(e) => {
                    warn!(acceptor = self.index, error = %e, "Failed to accept connection");

                    // Back off on errors to avoid tight loop
                    select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = sleep(ACCEPT_BACKOFF) => {}
                    }
                }
            }
        }

        debug!(acceptor = self.index, "Accept loop terminated");
    }

    /// Hand one connection to the pool
    ///
    /// Returns false once the pool has shut down.
    async fn admit(&self, socket: TcpStream, peer_addr: SocketAddr) -> bool {
        trace!(acceptor = self.index, %peer_addr, "Accepted connection");

        let handler = ConnectionHandler::new(
            socket,
            peer_addr,
            self.stats.clone(),
            self.handler_config.clone(),
            self.shutdown.clone(),
        );
        let task = async move {
            handler.run().await;
        };

        match self.pool.submit(task, self.admission_timeout).await {
            Ok(()) => {
                self.stats.connection_admitted(peer_addr.ip());
                true
            }
            Err(PoolError::Timeout(_)) => {
                // Load shedding: the rejected handler was dropped, closing the socket
                debug!(%peer_addr, "Worker pool saturated, connection shed");
                true
            }
            Err(PoolError::Shutdown) => false,
            Err(e) => {
                warn!(%peer_addr, error = %e, "Failed to admit connection");
                true
            }
        }
    }
}
