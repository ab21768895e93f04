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

//! Core types for the Kioken service

use std::fmt;
use std::io;
use std::time::Duration;

/// Telemetry published once per statistics window
///
/// Windowed fields describe the window that just closed; the connection
/// gauges are live values read at publish time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PublishedSnapshot {
    /// Window sequence number, starting at 1 (0 before the first tick)
    pub sequence: u64,
    /// Connections admitted during the window
    pub connections_per_sec: u64,
    /// Connections currently open
    pub active_connections: u64,
    /// Connections admitted since the server started
    pub total_connections: u64,
    /// Distinct source addresses seen during the window
    pub unique_ips_per_sec: u64,
    /// Inbound throughput in bytes per second, over the measured window length
    pub inbound_bytes_per_sec: f64,
    /// Measured window length
    pub elapsed: Duration,
}

impl fmt::Display for PublishedSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} conn/s={} active={} total={} ip/s={} B/s={:.1}",
            self.sequence,
            self.connections_per_sec,
            self.active_connections,
            self.total_connections,
            self.unique_ips_per_sec,
            self.inbound_bytes_per_sec
        )
    }
}

/// Why a connection handler stopped reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed its side
    Eof,
    /// Nothing arrived before the read deadline
    Timeout,
    /// The read failed
    Error(io::ErrorKind),
    /// The server is shutting down
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => write!(f, "eof"),
            Self::Timeout => write!(f, "timeout"),
            Self::Error(kind) => write!(f, "error ({})", kind),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}
