//! Cascade worker.
//!
//! Drains cascade jobs and refreshes each target through the updater.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use super::config::CascadeConfig;
use super::events::{CascadeDispatcher, CascadeQueue, METRIC_CASCADE_DROPPED_TOTAL};
use super::instance::InstanceCache;
use super::planner::CascadePlan;
use super::updater::{RecordState, UpdateOptions};

const METRIC_CASCADE_CONSUME_MS: &str = "instcache_cascade_consume_ms";

/// Processes queued cascade jobs.
///
/// Each batch:
/// 1. Drains up to `batch_limit` jobs
/// 2. Merges duplicate targets and sets aside jobs past `max_depth`
/// 3. Reloads and refreshes every target, queueing its dependents one level deeper
pub struct CascadeWorker<R> {
    cache: Arc<InstanceCache<R>>,
    queue: Arc<CascadeQueue>,
    config: CascadeConfig,
}

impl<R> CascadeWorker<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new(
        cache: Arc<InstanceCache<R>>,
        queue: Arc<CascadeQueue>,
        config: CascadeConfig,
    ) -> Self {
        Self {
            cache,
            queue,
            config,
        }
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<CascadeQueue> {
        &self.queue
    }

    /// Process one batch. Returns the number of jobs drained.
    #[instrument(skip(self))]
    pub async fn consume(&self) -> usize {
        let consume_started_at = Instant::now();
        let jobs = self.queue.drain(self.config.batch_limit_non_zero().get());
        if jobs.is_empty() {
            return 0;
        }

        let job_count = jobs.len();
        let plan = CascadePlan::from_jobs(jobs, self.config.max_depth);

        info!(job_count, plan = %plan, "Cascade consumption starting");

        for job in &plan.too_deep {
            counter!(METRIC_CASCADE_DROPPED_TOTAL, "reason" => "max_depth").increment(1);
            warn!(
                job_id = %job.id,
                cascade = %job.target,
                depth = job.depth,
                max_depth = self.config.max_depth,
                "Cascade depth limit reached; job dropped"
            );
        }

        let (mut refreshed, mut failed, mut scheduled) = (0_usize, 0_usize, 0_usize);
        for job in &plan.jobs {
            let options = UpdateOptions::for_version(job.target.version.clone());
            let result = self
                .cache
                .update_instance(
                    &job.target.type_name,
                    &job.target.key,
                    RecordState::Unknown,
                    &options,
                )
                .await;

            match result {
                Ok(targets) => {
                    refreshed += 1;
                    scheduled += targets.len();
                    for target in targets {
                        self.queue.schedule(target, job.depth + 1);
                    }
                }
                Err(err) => {
                    failed += 1;
                    error!(
                        job_id = %job.id,
                        cascade = %job.target,
                        error = %err,
                        "Cascade job failed"
                    );
                }
            }
        }

        info!(
            job_count,
            refreshed,
            failed,
            scheduled,
            "Cascade consumption complete"
        );

        histogram!(METRIC_CASCADE_CONSUME_MS)
            .record(consume_started_at.elapsed().as_secs_f64() * 1000.0);

        job_count
    }

    /// Process batches until the queue is empty. Returns the jobs drained.
    pub async fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let drained = self.consume().await;
            if drained == 0 {
                return total;
            }
            total += drained;
        }
    }

    /// Run in the background until `shutdown` turns true or its sender is dropped.
    ///
    /// Wakes on every publish and at least once per poll interval.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let poll_interval = self.config.poll_interval();
            info!(
                poll_interval_ms = poll_interval.as_millis() as u64,
                "Cascade worker started"
            );

            loop {
                if *shutdown.borrow() {
                    break;
                }

                tokio::select! {
                    _ = self.queue.notified() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }

                self.run_until_idle().await;
            }

            info!("Cascade worker stopped");
        })
    }
}
