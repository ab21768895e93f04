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

//! Raw connection statistics
//!
//! Two kinds of values live here:
//! - Windowed counters (admissions, source addresses, bytes read) that the
//!   aggregator swaps out for fresh zeroes once per tick
//! - Running values (active and total connections) that are never reset
//!
//! Handler tasks only ever increment; nothing outside the aggregator reads
//! the windowed counters.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Admissions recorded in the current window
///
/// The count and the address set share one lock so a window boundary can
/// never split a connection from its source address.
#[derive(Debug, Default)]
struct AdmissionWindow {
    admitted: u64,
    addresses: HashSet<IpAddr>,
}

/// Totals of one closed window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowTotals {
    /// Connections admitted during the window
    pub connections: u64,
    /// Distinct source addresses seen during the window
    pub unique_ips: u64,
    /// Bytes read from all connections during the window
    pub bytes: u64,
}

/// Concurrent connection statistics
#[derive(Debug, Default)]
pub struct ServerStats {
    window: Mutex<AdmissionWindow>,
    bytes_read: AtomicU64,
    active_connections: AtomicU64,
    total_connections: AtomicU64,
}

impl ServerStats {
    /// Create a new, zeroed statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    fn window(&self) -> MutexGuard<'_, AdmissionWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Connection tracking

    /// Open an active-connection ledger entry
    ///
    /// The gauge is incremented now and decremented exactly once when the
    /// returned guard is dropped, whichever way the connection ends.
    pub fn begin_connection(self: &Arc<Self>) -> ActiveConnection {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        ActiveConnection {
            stats: self.clone(),
        }
    }

    /// Record a connection that was handed to a worker
    pub fn connection_admitted(&self, source: IpAddr) {
        {
            let mut window = self.window();
            window.admitted += 1;
            window.addresses.insert(source);
        }
        self.total_connections.fetch_add(1, Ordering::SeqCst);
    }

    /// Get the current number of open connections
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// Get the total number of connections admitted since start
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::SeqCst)
    }

    // Throughput tracking

    /// Record bytes read from a connection
    pub fn bytes_read(&self, count: u64) {
        self.bytes_read.fetch_add(count, Ordering::Relaxed);
    }

    // Windowing

    /// Close the current window and start a new, empty one
    ///
    /// Each counter is swapped with zero in a single step, so an increment
    /// racing the swap lands in exactly one window.
    pub fn roll_window(&self) -> WindowTotals {
        let (connections, addresses) = {
            let mut window = self.window();
            let closed = std::mem::take(&mut *window);
            (closed.admitted, closed.addresses)
        };
        let bytes = self.bytes_read.swap(0, Ordering::AcqRel);

        WindowTotals {
            connections,
            unique_ips: addresses.len() as u64,
            bytes,
        }
    }
}

/// Ledger entry for one open connection
///
/// Dropping it releases the connection from the active gauge.
#[derive(Debug)]
pub struct ActiveConnection {
    stats: Arc<ServerStats>,
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.stats
            .active_connections
            .fetch_sub(1, Ordering::SeqCst);
    }
}
