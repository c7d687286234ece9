//! Cloneable entry points into a running scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::activity::{ActivityStats, Heartbeat, InvalidUserId, SharedTracker, UserId};
use crate::pool::{CancelReason, WorkerPool, WorkerStats};
use crate::queue::{JobId, JobStore, Priority};

/// Errors surfaced to heartbeat and enqueue callers.
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error(transparent)]
    InvalidUser(#[from] InvalidUserId),
    #[error("job store unavailable: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub is_running: bool,
    pub activity: ActivityStats,
    pub workers: WorkerStats,
}

#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tracker: SharedTracker,
    pool: WorkerPool,
    store: JobStore,
    running: Arc<AtomicBool>,
}

impl SchedulerHandle {
    pub(super) fn new(
        tracker: SharedTracker,
        pool: WorkerPool,
        store: JobStore,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            tracker,
            pool,
            store,
            running,
        }
    }

    /// Record a heartbeat. A job running for the user is halted immediately.
    pub fn record_activity(&self, user: &UserId) -> Heartbeat {
        self.record_activity_at(user, Instant::now())
    }

    pub fn record_activity_at(&self, user: &UserId, now: Instant) -> Heartbeat {
        let heartbeat = self.tracker.lock().record_activity_at(user, now);
        if self.pool.cancel(user, CancelReason::Reactivated) {
            tracing::info!(user = %user, "user active again, halting background job");
        }
        heartbeat
    }

    /// Queue analysis for `user`; returns the live job id (existing or new).
    pub async fn queue_user_for_analysis(
        &self,
        user: &UserId,
        priority: Priority,
    ) -> Result<JobId, IngressError> {
        let enqueued = self
            .store
            .enqueue(user, priority)
            .await
            .map_err(IngressError::Store)?;
        Ok(enqueued.id)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn activity_stats(&self) -> ActivityStats {
        self.tracker.lock().stats()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            is_running: self.is_running(),
            activity: self.activity_stats(),
            workers: self.pool.stats(),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }
}
