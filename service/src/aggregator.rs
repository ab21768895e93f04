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

//! Statistics aggregator
//!
//! Once per window the aggregator closes the raw counters in [`ServerStats`],
//! turns them into rates and publishes the result as a [`PublishedSnapshot`].

use crate::{PublishedSnapshot, ServerStats, TelemetrySink};
use metrics::gauge;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Periodic roll-up of raw statistics into published snapshots
pub struct StatsAggregator {
    stats: Arc<ServerStats>,
    interval: Duration,
    publisher: watch::Sender<PublishedSnapshot>,
    sink: Option<Arc<dyn TelemetrySink>>,
    last_tick: Instant,
    sequence: u64,
}

impl StatsAggregator {
    /// Create an aggregator over the given statistics
    pub fn new(stats: Arc<ServerStats>, interval: Duration) -> Self {
        let (publisher, _) = watch::channel(PublishedSnapshot::default());
        Self {
            stats,
            interval,
            publisher,
            sink: None,
            last_tick: Instant::now(),
            sequence: 0,
        }
    }

    /// Also deliver every snapshot to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set or clear the telemetry sink
    pub fn set_sink(&mut self, sink: Option<Arc<dyn TelemetrySink>>) {
        self.sink = sink;
    }

    /// Subscribe to published snapshots
    ///
    /// The receiver always holds the most recent snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PublishedSnapshot> {
        self.publisher.subscribe()
    }

    /// Close the current window and publish its snapshot
    pub async fn tick_once(&mut self) -> PublishedSnapshot {
        let totals = self.stats.roll_window();

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;
        self.sequence += 1;

        let inbound_bytes_per_sec = if elapsed.is_zero() {
            0.0
        } else {
            totals.bytes as f64 / elapsed.as_secs_f64()
        };

        let snapshot = PublishedSnapshot {
            sequence: self.sequence,
            connections_per_sec: totals.connections,
            active_connections: self.stats.active_connections(),
            total_connections: self.stats.total_connections(),
            unique_ips_per_sec: totals.unique_ips,
            inbound_bytes_per_sec,
            elapsed,
        };

        gauge!("kioken.connections.per_sec").set(snapshot.connections_per_sec as f64);
        gauge!("kioken.connections.active").set(snapshot.active_connections as f64);
        gauge!("kioken.connections.total").set(snapshot.total_connections as f64);
        gauge!("kioken.ips.per_sec").set(snapshot.unique_ips_per_sec as f64);
        gauge!("kioken.bytes.per_sec").set(snapshot.inbound_bytes_per_sec);

        trace!(%snapshot, "Window closed");

        self.publisher.send_replace(snapshot.clone());
        if let Some(sink) = &self.sink {
            sink.publish(&snapshot).await;
        }

        snapshot
    }

    /// Run until `shutdown` fires, publishing once per interval
    ///
    /// Missed ticks are skipped, never replayed.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.last_tick = Instant::now();

        debug!(interval = ?self.interval, "Stats aggregator started");

        loop {
            select! {
                biased;

                _ = shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    self.tick_once().await;
                }
            }
        }

        debug!("Stats aggregator stopped");
    }
}

impl std::fmt::Debug for StatsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsAggregator")
            .field("interval", &self.interval)
            .field("sequence", &self.sequence)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
