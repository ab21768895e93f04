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

//! Connection handler implementation
//!
//! The ConnectionHandler is the task body run by a pool worker for one
//! admitted connection:
//! - Read loop with a read deadline refreshed before every read
//! - Byte accounting into the current statistics window
//! - Active gauge accounting, from the first poll until the handler returns
//!
//! Payload bytes are counted and discarded; there is no framing.

use crate::{CloseReason, ServerStats};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::select;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

/// Handler configuration
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Read timeout (max time to wait for data)
    pub read_timeout: Duration,
    /// Read buffer size
    pub buffer_size: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            buffer_size: 1024,
        }
    }
}

/// Reads one connection until it goes quiet, errors or is closed
///
/// Owns the stream exclusively; the stream is closed when the handler is
/// dropped, whether or not it ever ran. A handler only counts as an active
/// connection while [`run`](Self::run) executes, so one that is shed before
/// a worker picks it up never touches the gauge.
pub struct ConnectionHandler<S = TcpStream> {
    stream: S,
    peer_addr: SocketAddr,
    stats: Arc<ServerStats>,
    config: HandlerConfig,
    shutdown: CancellationToken,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    /// Create a new connection handler
    pub fn new(
        stream: S,
        peer_addr: SocketAddr,
        stats: Arc<ServerStats>,
        config: HandlerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            stream,
            peer_addr,
            stats,
            config,
            shutdown,
        }
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Run the read loop to completion
    ///
    /// Consumes the handler, so the connection is closed and the active
    /// gauge released by the time this returns.
    #[instrument(skip(self), fields(peer_addr = %self.peer_addr))]
    pub async fn run(mut self) -> CloseReason {
        let _active = self.stats.begin_connection();
        let opened = Instant::now();
        let mut buf = vec![0u8; self.config.buffer_size];
        let mut received: u64 = 0;

        let reason = loop {
            let read = select! {
                biased;

                _ = self.shutdown.cancelled() => break CloseReason::Shutdown,

                read = timeout(self.config.read_timeout, self.stream.read(&mut buf)) => read,
            };

            match read {
                Ok(Ok(0)) => break CloseReason::Eof,
                Ok(Ok(n)) => {
                    trace!(bytes = n, "Read");
                    received += n as u64;
                    self.stats.bytes_read(n as u64);
                }
                Ok(Err(e)) => break CloseReason::Error(e.kind()),
                Err(_) => break CloseReason::Timeout,
            }
        };

        debug!(
            %reason,
            bytes = received,
            duration = ?opened.elapsed(),
            "Connection closed"
        );

        reason
    }
}

impl<S> std::fmt::Debug for ConnectionHandler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("peer_addr", &self.peer_addr)
            .field("config", &self.config)
            .finish()
    }
}
