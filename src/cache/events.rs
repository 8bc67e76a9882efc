//! Cascade job queue.
//!
//! Dependents reported by [`InstanceCache::update_instance`] are queued here
//! and refreshed later by a [`CascadeWorker`].
//!
//! [`InstanceCache::update_instance`]: super::InstanceCache::update_instance
//! [`CascadeWorker`]: super::CascadeWorker

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use time::OffsetDateTime;
use tokio::sync::Notify;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::CascadeTarget;

use super::config::CascadeConfig;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";

pub(super) const METRIC_CASCADE_DROPPED_TOTAL: &str = "instcache_cascade_dropped_total";
const METRIC_CASCADE_QUEUE_LEN: &str = "instcache_cascade_queue_len";

/// Monotonic epoch for ordering jobs within this process.
pub type Epoch = u64;

/// A deferred refresh of one dependent instance.
#[derive(Debug, Clone)]
pub struct CascadeJob {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub target: CascadeTarget,
    /// Number of cascade generations between the original write and this job.
    pub depth: u32,
    pub enqueued_at: OffsetDateTime,
}

impl CascadeJob {
    pub fn new(target: CascadeTarget, depth: u32, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            target,
            depth,
            enqueued_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Accepts cascade targets for asynchronous, at-least-once processing.
pub trait CascadeDispatcher: Send + Sync {
    fn schedule(&self, target: CascadeTarget, depth: u32);
}

/// In-memory FIFO of cascade jobs.
pub struct CascadeQueue {
    queue: Mutex<VecDeque<CascadeJob>>,
    epoch_counter: AtomicU64,
    limit: Option<usize>,
    dropped: AtomicU64,
    notify: Notify,
}

impl CascadeQueue {
    /// An unbounded queue.
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// A queue that drops new jobs once `limit` are pending.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
            limit,
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// A queue bounded by the configured `queue_limit`.
    pub fn from_config(config: &CascadeConfig) -> Self {
        Self::with_limit(config.queue_limit)
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Enqueue a job and wake a worker. Returns false if the queue is full.
    pub fn publish(&self, target: CascadeTarget, depth: u32) -> bool {
        let len = {
            let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
            if self.limit.is_some_and(|limit| queue.len() >= limit) {
                drop(queue);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_CASCADE_DROPPED_TOTAL, "reason" => "queue_full").increment(1);
                warn!(
                    cascade = %target,
                    depth,
                    limit = ?self.limit,
                    "Cascade queue full; job dropped"
                );
                return false;
            }

            let job = CascadeJob::new(target, depth, self.next_epoch());
            info!(
                job_id = %job.id,
                job_epoch = job.epoch,
                cascade = %job.target,
                depth,
                "Cascade job enqueued"
            );
            queue.push_back(job);
            queue.len()
        };

        gauge!(METRIC_CASCADE_QUEUE_LEN).set(len as f64);
        self.notify.notify_one();
        true
    }

    /// Drain up to `limit` jobs in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<CascadeJob> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let jobs: Vec<CascadeJob> = queue.drain(..count).collect();
        gauge!(METRIC_CASCADE_QUEUE_LEN).set(queue.len() as f64);
        jobs
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, SOURCE, "clear").clear();
        gauge!(METRIC_CASCADE_QUEUE_LEN).set(0.0);
    }

    /// Jobs rejected because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait until a job is published.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

impl Default for CascadeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CascadeDispatcher for CascadeQueue {
    fn schedule(&self, target: CascadeTarget, depth: u32) {
        self.publish(target, depth);
    }
}
