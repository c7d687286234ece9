//! Apply pool settlements to the job store and the activity tracker.

use anyhow::Result;

use crate::pool::{JobOutcome, Settled};
use crate::queue::JobStatus;
use crate::work::UnitOfWork;

use super::AdaptiveScheduler;

impl<E: UnitOfWork> AdaptiveScheduler<E> {
    /// Record one settlement.
    ///
    /// A halt puts the job back to pending without touching its attempt count.
    /// A failure consumes an attempt. Completion, or a failure that used the
    /// last attempt, marks the user analyzed at the phase the job ran in so the
    /// tick does not queue them again until their next heartbeat.
    pub async fn reconcile(&self, settled: Settled) -> Result<()> {
        let Settled {
            job_id,
            user_id,
            phase,
            outcome,
            ..
        } = settled;

        match outcome {
            JobOutcome::Completed => {
                if self.store.mark_completed(job_id).await? {
                    self.tracker.lock().mark_analyzed(&user_id, phase);
                } else {
                    tracing::debug!(job_id, "ignoring stale completion");
                }
            }
            JobOutcome::Halted(reason) => {
                if self.store.mark_pending_for_retry(job_id).await? {
                    tracing::debug!(job_id, user = %user_id, %reason, "job back to pending");
                }
            }
            JobOutcome::Failed(error) => match self.store.mark_failed(job_id, &error).await? {
                Some(JobStatus::Failed) => {
                    tracing::warn!(job_id, user = %user_id, %error, "job failed permanently");
                    self.tracker.lock().mark_analyzed(&user_id, phase);
                }
                Some(status) => {
                    tracing::debug!(job_id, user = %user_id, %status, "job will be retried");
                }
                None => tracing::debug!(job_id, "ignoring stale failure"),
            },
        }
        Ok(())
    }

    /// Reconcile `settled`, keeping it for the next tick if the store rejects it.
    pub(crate) async fn record(&self, settled: Settled) -> Result<()> {
        if let Err(e) = self.reconcile(settled.clone()).await {
            self.unreconciled().push(settled);
            return Err(e);
        }
        Ok(())
    }

    /// Retry settlements the store rejected earlier; returns how many landed.
    pub(crate) async fn retry_unreconciled(&self) -> usize {
        let backlog = std::mem::take(&mut *self.unreconciled());
        let mut landed = 0;
        for settled in backlog {
            let job_id = settled.job_id;
            match self.record(settled).await {
                Ok(()) => landed += 1,
                Err(e) => tracing::warn!(
                    job_id,
                    error = %format!("{:#}", e),
                    "settlement still not recorded"
                ),
            }
        }
        landed
    }

    /// Settlements waiting for a retry.
    pub fn unreconciled_count(&self) -> usize {
        self.unreconciled().len()
    }

    /// Wait for the next settlement and record it. A settlement the store
    /// rejects is kept and retried on the next tick.
    pub async fn settle_next(&mut self) -> Result<Option<Settled>> {
        let Some(settled) = self.settled_rx.recv().await else {
            return Ok(None);
        };
        self.record(settled.clone()).await?;
        Ok(Some(settled))
    }

    /// Record every settlement already queued, then retry the backlog once.
    /// Returns how many were recorded.
    pub async fn drain_settled(&mut self) -> usize {
        let mut n = 0;
        while let Ok(settled) = self.settled_rx.try_recv() {
            let job_id = settled.job_id;
            match self.record(settled).await {
                Ok(()) => n += 1,
                Err(e) => tracing::warn!(
                    job_id,
                    error = %format!("{:#}", e),
                    "failed to record settlement"
                ),
            }
        }
        n + self.retry_unreconciled().await
    }
}
