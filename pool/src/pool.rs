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

//! Worker pool implementation
//!
//! The WorkerPool is responsible for:
//! - Handing submitted tasks to idle workers (with backpressure)
//! - Growing and shrinking the live worker set
//! - Reclaiming idle workers down to a configured floor
//! - Exactly-once shutdown coordination

use crate::worker::{Job, TaskSlot, Worker, WorkerId, WorkerSlot, retract};
use crate::{PoolConfig, PoolError, Result};
use metrics::{counter, gauge};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::select;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

/// Lock a std mutex, recovering the guard if a previous holder panicked
///
/// Every structure guarded this way is consistent at each unlock point.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Target number of workers
    pub capacity: usize,
    /// Workers currently registered
    pub live_workers: usize,
    /// Workers currently running a task
    pub busy_workers: usize,
    /// Jobs waiting in the hand-off queue
    pub queued: usize,
    /// Tasks that ran to completion
    pub completed: u64,
    /// Tasks that panicked
    pub panicked: u64,
    /// Workers removed by idle reclamation
    pub reclaimed: u64,
    /// Submissions rejected by timeout or shutdown
    pub rejected: u64,
}

/// Arena of worker slots addressed by stable index
///
/// Removal marks a slot free rather than compacting the vector, so a
/// worker's index stays valid for its whole lifetime.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    slots: Vec<Option<WorkerSlot>>,
    capacity: usize,
}

impl Registry {
    /// Number of occupied slots
    fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// First free slot, growing the arena if none is free
    fn free_index(&mut self) -> usize {
        match self.slots.iter().position(Option::is_none) {
            Some(index) => index,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        }
    }
}

/// State shared between the pool handle and its workers
pub(crate) struct Shared {
    pub(crate) config: PoolConfig,
    queue: mpsc::Sender<Job>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<Job>>,
    registry: Mutex<Registry>,
    /// Root cancellation token; every worker's stop token is a child of it
    shutdown: CancellationToken,
    /// Set exactly once, by the caller that performs the teardown
    shutting_down: AtomicBool,
    tracker: TaskTracker,
    next_worker_id: AtomicU64,
    pub(crate) queued: AtomicUsize,
    pub(crate) busy: AtomicUsize,
    pub(crate) completed: AtomicU64,
    pub(crate) panicked: AtomicU64,
    reclaimed: AtomicU64,
    rejected: AtomicU64,
    /// Signalled whenever a task finishes or a job is dequeued
    pub(crate) idle: Notify,
}

impl Shared {
    /// Wait for the next job from the shared queue
    ///
    /// Cancel safe: a job is never lost if this future is dropped.
    pub(crate) async fn next_job(&self) -> Option<Job> {
        self.receiver.lock().await.recv().await
    }

    /// Attempt to remove an idle worker from the registry
    ///
    /// The emptiness and idleness checks run under the registry lock together
    /// with the removal, so a resize or shutdown cannot interleave.
    pub(crate) fn try_reclaim(&self, index: usize, id: WorkerId, idle_since: Instant) -> bool {
        let mut registry = lock(&self.registry);

        if self.shutting_down.load(Ordering::SeqCst) {
            return false;
        }

        let owns_slot = matches!(registry.slots.get(index), Some(Some(slot)) if slot.id == id);
        if !owns_slot {
            return false;
        }

        if self.queued.load(Ordering::SeqCst) != 0
            || idle_since.elapsed() < self.config.idle_timeout
            || registry.live() <= self.config.min_capacity
        {
            return false;
        }

        registry.slots[index] = None;
        registry.capacity = registry.capacity.saturating_sub(1);
        self.reclaimed.fetch_add(1, Ordering::Relaxed);
        gauge!("kioken.pool.workers").set(registry.live() as f64);
        true
    }
}

/// Register and spawn one worker; the caller holds the registry lock
fn spawn_worker(shared: &Arc<Shared>, registry: &mut Registry) {
    let index = registry.free_index();
    let id = WorkerId::new(shared.next_worker_id.fetch_add(1, Ordering::SeqCst));
    let stop = shared.shutdown.child_token();

    registry.slots[index] = Some(WorkerSlot {
        id,
        stop: stop.clone(),
    });

    let worker = Worker::new(index, id, stop, shared.clone());
    shared.tracker.spawn(worker.run());
}

/// Elastic, bounded worker pool
///
/// Cloning the pool yields another handle to the same workers.
///
/// # Example
///
/// ```no_run
/// use kioken_pool::{PoolConfig, WorkerPool};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = WorkerPool::new(PoolConfig::new(4))?;
///
///     pool.submit(async { println!("hello from the pool") }, Duration::from_millis(50))
///         .await?;
///
///     pool.set_capacity(8)?;
///     pool.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create a new pool and start `config.capacity` workers
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let (queue, receiver) = mpsc::channel(config.queue_depth);
        let shared = Arc::new(Shared {
            config: config.clone(),
            queue,
            receiver: tokio::sync::Mutex::new(receiver),
            registry: Mutex::new(Registry::default()),
            shutdown: CancellationToken::new(),
            shutting_down: AtomicBool::new(false),
            tracker: TaskTracker::new(),
            next_worker_id: AtomicU64::new(1),
            queued: AtomicUsize::new(0),
            busy: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            idle: Notify::new(),
        });

        {
            let mut registry = lock(&shared.registry);
            for _ in 0..config.capacity {
                spawn_worker(&shared, &mut registry);
            }
            registry.capacity = config.capacity;
        }
        gauge!("kioken.pool.workers").set(config.capacity as f64);

        info!(
            capacity = config.capacity,
            min_capacity = config.min_capacity,
            "Worker pool started"
        );

        Ok(Self { shared })
    }

    /// Submit a task to the pool
    ///
    /// Resolves once a worker has taken the task. With a zero `timeout` this
    /// waits indefinitely (or until shutdown); otherwise it gives up after
    /// `timeout` and returns [`PoolError::Timeout`]. A rejected task is
    /// dropped without being polled, releasing anything it owns.
    pub async fn submit<F>(&self, task: F, timeout: Duration) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(PoolError::Shutdown);
        }

        let (job, slot, accepted) = Job::new(Box::pin(task));
        let expiry = async {
            if timeout.is_zero() {
                std::future::pending::<()>().await
            } else {
                sleep(timeout).await
            }
        };

        let reason = select! {
            biased;

            _ = self.shared.shutdown.cancelled() => PoolError::Shutdown,

            delivered = self.deliver(job, accepted) => {
                if delivered {
                    return Ok(());
                }
                PoolError::Shutdown
            }

            _ = expiry => PoolError::Timeout(timeout),
        };

        self.reject(&slot, reason)
    }

    /// Enqueue a job and wait for a worker to acknowledge it
    async fn deliver(&self, job: Job, accepted: oneshot::Receiver<()>) -> bool {
        let Ok(permit) = self.shared.queue.reserve().await else {
            return false;
        };
        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        permit.send(job);
        accepted.await.is_ok()
    }

    /// Settle a submission that was not acknowledged in time
    fn reject(&self, slot: &TaskSlot, reason: PoolError) -> Result<()> {
        match retract(slot) {
            Some(task) => {
                drop(task);
                self.shared.rejected.fetch_add(1, Ordering::Relaxed);
                counter!("kioken.pool.submit.rejected").increment(1);
                trace!(%reason, "Submission rejected");
                Err(reason)
            }
            // A worker claimed the task right as we gave up; it will run
            None => Ok(()),
        }
    }

    /// Adjust the live worker count toward `capacity`
    ///
    /// The target is clamped to the configured floor. Growing spawns workers
    /// immediately; shrinking stops the excess workers, each finishing its
    /// in-flight task first. Queued tasks stay deliverable to the remaining
    /// workers. Returns the applied capacity.
    ///
    /// Stopped workers leave the registry at once, so a shrink followed by a
    /// grow spawns replacements while the stopped workers may still be
    /// finishing their tasks. Until those tasks complete, more than
    /// `capacity` tasks can be running.
    pub fn set_capacity(&self, capacity: usize) -> Result<usize> {
        let target = capacity.max(self.shared.config.min_capacity);
        let mut registry = lock(&self.shared.registry);

        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return Err(PoolError::Shutdown);
        }

        let live = registry.live();
        if target > live {
            for _ in live..target {
                spawn_worker(&self.shared, &mut registry);
            }
        } else if target < live {
            let mut excess = live - target;
            for slot in registry.slots.iter_mut().rev() {
                if excess == 0 {
                    break;
                }
                if let Some(worker) = slot.take() {
                    debug!(worker = %worker.id, "Stopping worker");
                    worker.stop.cancel();
                    excess -= 1;
                }
            }
        }
        registry.capacity = target;
        gauge!("kioken.pool.workers").set(target as f64);

        info!(from = live, to = target, "Worker pool resized");
        Ok(target)
    }

    /// Shut the pool down and wait for every worker to exit
    ///
    /// Safe to call any number of times from any number of callers: only the
    /// first performs the teardown, every caller waits for it to complete.
    /// In-flight tasks run to completion; waiting submissions fail with
    /// [`PoolError::Shutdown`].
    pub async fn shutdown(&self) {
        self.close();
        self.shared.tracker.wait().await;

        let mut registry = lock(&self.shared.registry);
        if !registry.slots.is_empty() {
            registry.slots.clear();
            registry.capacity = 0;
            gauge!("kioken.pool.workers").set(0.0);
            info!("Worker pool shutdown complete");
        }
    }

    /// Begin shutdown without waiting for the workers to exit
    ///
    /// Waiting submissions fail and idle workers stop at once; busy workers
    /// exit after their current task. Usable from synchronous contexts such
    /// as `Drop`. Returns true for the call that initiated the shutdown.
    pub fn close(&self) -> bool {
        let _registry = lock(&self.shared.registry);
        let initiated = self
            .shared
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if initiated {
            info!("Shutting down worker pool");
            self.shared.shutdown.cancel();
            self.shared.tracker.close();
        }
        initiated
    }

    /// Check if the pool has been shut down
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    /// Wait until no task is queued or running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.queued.load(Ordering::SeqCst) == 0
                && self.shared.busy.load(Ordering::SeqCst) == 0
            {
                return;
            }

            select! {
                _ = notified => {}
                _ = self.shared.shutdown.cancelled() => {
                    self.shared.tracker.wait().await;
                    return;
                }
            }
        }
    }

    /// Get the target number of workers
    pub fn capacity(&self) -> usize {
        lock(&self.shared.registry).capacity
    }

    /// Get the number of registered workers
    pub fn live_workers(&self) -> usize {
        lock(&self.shared.registry).live()
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Get a snapshot of the pool state
    pub fn stats(&self) -> PoolStats {
        let (capacity, live_workers) = {
            let registry = lock(&self.shared.registry);
            (registry.capacity, registry.live())
        };

        PoolStats {
            capacity,
            live_workers,
            busy_workers: self.shared.busy.load(Ordering::SeqCst),
            queued: self.shared.queued.load(Ordering::SeqCst),
            completed: self.shared.completed.load(Ordering::Relaxed),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
            reclaimed: self.shared.reclaimed.load(Ordering::Relaxed),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("stats", &self.stats())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
