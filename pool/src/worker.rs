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

//! Pool worker implementation
//!
//! A worker is a long-lived task owned by the pool. It repeatedly:
//! - Waits for the next job from the shared queue
//! - Claims the job's task (unless the submitter already took it back)
//! - Runs the task with panic isolation
//! - Offers itself for reclamation after sitting idle for too long
//!
//! A worker only observes its stop token between tasks, so a task that has
//! started always runs to completion.

use crate::pool::{Shared, lock};
use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::counter;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tokio::select;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// A unit of work executed by the pool
pub(crate) type Task = BoxFuture<'static, ()>;

/// Slot holding a task while it waits to be claimed
///
/// Both the submitter and the worker race to `take()` the task; whoever
/// wins owns it, so a task is either executed or handed back, never both.
pub(crate) type TaskSlot = Arc<Mutex<Option<Task>>>;

/// Unique identifier for a worker (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Create a new worker ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// A queued submission
pub(crate) struct Job {
    slot: TaskSlot,
    accepted: oneshot::Sender<()>,
}

impl Job {
    /// Wrap a task for hand-off
    ///
    /// Returns the job to enqueue, the submitter's handle on the task slot and
    /// the receiver that resolves once a worker has claimed the task.
    pub(crate) fn new(task: Task) -> (Self, TaskSlot, oneshot::Receiver<()>) {
        let slot = Arc::new(Mutex::new(Some(task)));
        let (accepted, accepted_rx) = oneshot::channel();
        let job = Self {
            slot: slot.clone(),
            accepted,
        };
        (job, slot, accepted_rx)
    }

    /// Claim the task for execution
    ///
    /// Returns `None` if the submitter has already taken the task back.
    fn claim(self) -> Option<Task> {
        let task = lock(&self.slot).take()?;
        // The submitter may have stopped listening; the task is ours either way
        let _ = self.accepted.send(());
        Some(task)
    }
}

/// Take a task back out of its slot if no worker has claimed it yet
pub(crate) fn retract(slot: &TaskSlot) -> Option<Task> {
    lock(slot).take()
}

/// Registry entry for a live worker
#[derive(Debug)]
pub(crate) struct WorkerSlot {
    pub(crate) id: WorkerId,
    pub(crate) stop: CancellationToken,
}

/// A single pool worker
pub(crate) struct Worker {
    /// Stable index of this worker's slot in the registry arena
    index: usize,
    id: WorkerId,
    /// Fires when this worker is stopped by a shrink or by pool shutdown
    stop: CancellationToken,
    shared: Arc<Shared>,
}

impl Worker {
    /// Create a new worker bound to the given registry slot
    pub(crate) fn new(
        index: usize,
        id: WorkerId,
        stop: CancellationToken,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            index,
            id,
            stop,
            shared,
        }
    }

    /// Run the worker loop until stopped or reclaimed
    pub(crate) async fn run(self) {
        debug!(worker = %self.id, slot = self.index, "Worker started");

        let idle_timeout = self.shared.config.idle_timeout;
        let mut idle_since = Instant::now();

        loop {
            let job = select! {
                biased;

                _ = self.stop.cancelled() => break,

                job = self.shared.next_job() => job,

                _ = sleep_until(idle_since + idle_timeout) => {
                    if self.shared.try_reclaim(self.index, self.id, idle_since) {
                        debug!(worker = %self.id, "Idle worker reclaimed");
                        return;
                    }
                    // Refused (floor reached or work pending); start a new idle period
                    idle_since = Instant::now();
                    continue;
                }
            };

            let Some(job) = job else {
                // Queue closed, nothing more will ever arrive
                break;
            };

            // Counted busy before leaving the queue so wait_idle never sees a gap
            self.shared.busy.fetch_add(1, Ordering::SeqCst);
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            match job.claim() {
                Some(task) => self.execute(task).await,
                None => {
                    trace!(worker = %self.id, "Skipping job retracted by its submitter");
                    self.shared.busy.fetch_sub(1, Ordering::SeqCst);
                    self.shared.idle.notify_waiters();
                }
            }
            idle_since = Instant::now();
        }

        debug!(worker = %self.id, "Worker stopped");
    }

    /// Run one task, containing any panic it raises
    ///
    /// The caller has already counted this worker as busy.
    async fn execute(&self, task: Task) {
        let outcome = AssertUnwindSafe(task).catch_unwind().await;
        self.shared.busy.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(()) => {
                self.shared.completed.fetch_add(1, Ordering::Relaxed);
                counter!("kioken.pool.tasks.completed").increment(1);
            }
            Err(payload) => {
                self.shared.panicked.fetch_add(1, Ordering::Relaxed);
                counter!("kioken.pool.tasks.panicked").increment(1);
                error!(
                    worker = %self.id,
                    panic = panic_message(payload.as_ref()),
                    "Task panicked"
                );
            }
        }

        self.shared.idle.notify_waiters();
    }
}

/// Extract a printable message from a panic payload
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("stopped", &self.stop.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_display() {
        assert_eq!(WorkerId::new(7).to_string(), "worker-7");
        assert_eq!(WorkerId::new(7).as_u64(), 7);
    }

    #[test]
    fn test_claim_wins_over_retract() {
        let (job, slot, mut accepted) = Job::new(Box::pin(async {}));

        assert!(job.claim().is_some());
        assert!(retract(&slot).is_none());
        assert!(accepted.try_recv().is_ok());
    }

    #[test]
    fn test_retract_wins_over_claim() {
        let (job, slot, mut accepted) = Job::new(Box::pin(async {}));

        assert!(retract(&slot).is_some());
        assert!(job.claim().is_none());
        // The sender was dropped without acknowledging
        assert!(accepted.try_recv().is_err());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(payload.as_ref()), "<non-string panic payload>");
    }
}
