//! One poll tick: reconcile running jobs with current phases, then dispatch.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use crate::activity::Phase;
use crate::pool::CancelReason;
use crate::queue::{Job, Priority};
use crate::work::{UnitOfWork, WorkRequest};

use super::AdaptiveScheduler;

/// What a tick did, mostly for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Settlements from earlier failures recorded by this tick.
    pub reconciled: usize,
    pub halted: usize,
    pub upgraded: usize,
    pub enqueued: usize,
    pub dispatched: usize,
}

/// Rows fetched per page while looking for dispatchable jobs.
const SCAN_PAGE: usize = 32;

/// Pages scanned per phase per tick.
const MAX_SCAN_PAGES: usize = 16;

/// Users passed to the query as exclusions; SQLite caps bound parameters.
const MAX_EXCLUDED: usize = 4_096;

impl<E: UnitOfWork> AdaptiveScheduler<E> {
    pub async fn tick(&self) -> Result<TickReport> {
        self.tick_at(Instant::now()).await
    }

    /// Run one tick as if the current time were `now`.
    pub async fn tick_at(&self, now: Instant) -> Result<TickReport> {
        let mut report = TickReport {
            reconciled: self.retry_unreconciled().await,
            ..TickReport::default()
        };
        self.rebalance_running(now, &mut report);

        for phase in Phase::DISPATCH_ORDER {
            if !self.pool.can_accept_job(phase) {
                continue;
            }
            self.enqueue_awaiting(phase, now, &mut report).await;
            self.dispatch_phase(phase, now, &mut report).await?;
        }

        if report != TickReport::default() {
            tracing::debug!(
                reconciled = report.reconciled,
                halted = report.halted,
                upgraded = report.upgraded,
                enqueued = report.enqueued,
                dispatched = report.dispatched,
                "scheduler tick"
            );
        }
        Ok(report)
    }

    /// Halt jobs whose user is active again; move the rest to their user's
    /// current (deeper) phase when that phase has room.
    fn rebalance_running(&self, now: Instant, report: &mut TickReport) {
        let running = self.pool.running();
        if running.is_empty() {
            return;
        }
        let tracker = self.tracker.lock();
        for job in running {
            let phase = tracker.phase_at(&job.user_id, now);
            if phase == Phase::Active {
                if self.pool.cancel(&job.user_id, CancelReason::Reactivated) {
                    report.halted += 1;
                }
            } else if phase > job.phase && self.pool.upgrade_phase(&job.user_id, phase) {
                report.upgraded += 1;
            }
        }
    }

    /// Queue a normal-priority job for every tracked user that reached
    /// `phase` and has not been analyzed at this depth yet. A user whose
    /// enqueue fails is retried on the next tick.
    async fn enqueue_awaiting(&self, phase: Phase, now: Instant, report: &mut TickReport) {
        let awaiting = self.tracker.lock().awaiting_analysis_at(phase, now);
        for user in awaiting {
            match self.store.enqueue(&user, Priority::Normal).await {
                Ok(enqueued) if enqueued.created => report.enqueued += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    user = %user,
                    error = %format!("{:#}", e),
                    "auto-enqueue failed"
                ),
            }
        }
    }

    async fn dispatch_phase(
        &self,
        phase: Phase,
        now: Instant,
        report: &mut TickReport,
    ) -> Result<()> {
        let batch = self
            .settings
            .budgets
            .for_phase(phase)
            .map_or(0, |b| b.batch_size);
        let candidates = self.eligible_for(phase, batch, now).await?;

        for job in candidates {
            if !self.pool.can_accept_job(phase) {
                break;
            }
            if !self.store.mark_processing(job.id).await? {
                continue;
            }
            let request = WorkRequest {
                job_id: job.id,
                user_id: job.user_id.clone(),
                phase,
                attempt: job.attempt_count,
            };
            let executor = Arc::clone(&self.executor);
            let work_request = request.clone();
            let submitted = self.pool.submit_job(request, move |cancel| async move {
                executor.run(work_request, cancel).await
            });
            match submitted {
                Ok(()) => report.dispatched += 1,
                Err(e) => {
                    tracing::debug!(job_id = job.id, error = %e, "dispatch rejected");
                    self.store.mark_pending_for_retry(job.id).await?;
                }
            }
        }
        Ok(())
    }

    /// Up to `batch` eligible jobs whose user is in `phase` (untracked users
    /// count as fully idle) and has nothing running.
    ///
    /// Users known to be elsewhere are filtered in the query; the in-memory
    /// check catches anyone past the exclusion cap or whose phase moved.
    async fn eligible_for(&self, phase: Phase, batch: usize, now: Instant) -> Result<Vec<Job>> {
        let mut skip = self.tracker.lock().users_outside_phase_at(phase, now);
        skip.extend(self.pool.running_users());
        skip.sort();
        skip.dedup();
        skip.truncate(MAX_EXCLUDED);

        let mut picked = Vec::with_capacity(batch);
        let mut offset = 0;
        for _ in 0..MAX_SCAN_PAGES {
            let page = self
                .store
                .eligible_page_excluding(phase, &skip, SCAN_PAGE, offset)
                .await?;
            let fetched = page.len();
            {
                let tracker = self.tracker.lock();
                for job in page {
                    if picked.len() == batch {
                        break;
                    }
                    if self.pool.is_running(&job.user_id)
                        || tracker.phase_at(&job.user_id, now) != phase
                    {
                        continue;
                    }
                    picked.push(job);
                }
            }
            if picked.len() == batch || fetched < SCAN_PAGE {
                break;
            }
            offset += fetched;
        }
        Ok(picked)
    }
}
