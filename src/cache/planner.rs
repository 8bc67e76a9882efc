//! Cascade batch planning.
//!
//! Merges a drained batch of jobs into the set of refreshes to run.

use std::collections::HashMap;
use std::fmt;

use crate::domain::CascadeTarget;

use super::events::{CascadeJob, Epoch};

/// Work derived from one batch of cascade jobs.
#[derive(Debug, Default)]
pub struct CascadePlan {
    /// One job per distinct target, in first-seen order.
    pub jobs: Vec<CascadeJob>,
    /// Jobs beyond the depth cap. They are not run.
    pub too_deep: Vec<CascadeJob>,
    /// Jobs folded into an earlier job for the same target.
    pub merged: usize,
    /// Latest publish epoch among the jobs to run, merged ones included.
    pub newest_epoch: Option<Epoch>,
}

impl fmt::Display for CascadePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CascadePlan {{ run: {}, too_deep: {}, merged: {}",
            self.jobs.len(),
            self.too_deep.len(),
            self.merged,
        )?;
        match self.newest_epoch {
            Some(epoch) => write!(f, ", newest_epoch: {epoch} }}"),
            None => write!(f, " }}"),
        }
    }
}

impl CascadePlan {
    /// Build a plan from a batch.
    ///
    /// - Merges jobs for the same target, keeping the shallowest depth
    /// - Sets aside jobs deeper than `max_depth`
    /// - Records the newest epoch among the jobs to run
    pub fn from_jobs(jobs: Vec<CascadeJob>, max_depth: u32) -> Self {
        let mut plan = Self::default();
        let mut positions: HashMap<CascadeTarget, usize> = HashMap::new();

        for job in jobs {
            if job.depth > max_depth {
                plan.too_deep.push(job);
                continue;
            }
            plan.newest_epoch = plan.newest_epoch.max(Some(job.epoch));
            match positions.get(&job.target) {
                Some(&position) => {
                    plan.merged += 1;
                    let existing = &mut plan.jobs[position];
                    if job.depth < existing.depth {
                        existing.depth = job.depth;
                    }
                }
                None => {
                    positions.insert(job.target.clone(), plan.jobs.len());
                    plan.jobs.push(job);
                }
            }
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
