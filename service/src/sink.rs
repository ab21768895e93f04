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

//! Telemetry sink traits and implementations

use crate::PublishedSnapshot;
use async_trait::async_trait;
use std::fmt;

/// Consumer of published telemetry
///
/// Implement this trait to forward snapshots to a dashboard, a socket feed
/// or anything else. `publish` is called exactly once per statistics window,
/// from the aggregator task; a slow sink delays the next window's publish.
///
/// # Example
///
/// ```no_run
/// use kioken_service::{PublishedSnapshot, TelemetrySink};
/// use async_trait::async_trait;
///
/// struct Console;
///
/// #[async_trait]
/// impl TelemetrySink for Console {
///     async fn publish(&self, snapshot: &PublishedSnapshot) {
///         println!("{}", snapshot);
///     }
/// }
/// ```
#[async_trait]
pub trait TelemetrySink: Send + Sync + 'static {
    /// Receive the snapshot of the window that just closed
    async fn publish(&self, snapshot: &PublishedSnapshot);
}

/// Sink that emits every snapshot as a structured `info` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl TelemetrySink for TracingSink {
    async fn publish(&self, snapshot: &PublishedSnapshot) {
        tracing::info!(
            sequence = snapshot.sequence,
            connections_per_sec = snapshot.connections_per_sec,
            active_connections = snapshot.active_connections,
            total_connections = snapshot.total_connections,
            unique_ips_per_sec = snapshot.unique_ips_per_sec,
            inbound_bytes_per_sec = snapshot.inbound_bytes_per_sec,
            "Server stats"
        );
    }
}

/// Type alias for the snapshot callback
type SnapshotCallback = Box<dyn Fn(&PublishedSnapshot) + Send + Sync>;

/// Sink that forwards every snapshot to a closure
///
/// # Example
///
/// ```
/// use kioken_service::CallbackSink;
///
/// let sink = CallbackSink::new(|snapshot| {
///     println!("{} connections/s", snapshot.connections_per_sec);
/// });
/// ```
pub struct CallbackSink {
    callback: SnapshotCallback,
}

impl CallbackSink {
    /// Create a sink from a callback
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&PublishedSnapshot) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl TelemetrySink for CallbackSink {
    async fn publish(&self, snapshot: &PublishedSnapshot) {
        (self.callback)(snapshot);
    }
}

impl fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn test_callback_sink() {
        let seen = Arc::new(AtomicU64::new(0));
        let sink = CallbackSink::new({
            let seen = seen.clone();
            move |snapshot| {
                seen.store(snapshot.connections_per_sec, Ordering::SeqCst);
            }
        });

        let snapshot = PublishedSnapshot {
            connections_per_sec: 7,
            ..Default::default()
        };
        sink.publish(&snapshot).await;

        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }
}
