//! Adaptive scheduler: turns idle time into background analysis.
//!
//! A single coordinating task polls on a fixed interval. Each tick halts jobs
//! whose user came back, upgrades jobs whose user went deeper idle, then walks
//! the idle phases heaviest first and dispatches eligible jobs within each
//! phase's budget. Settlements from the worker pool are reconciled into the
//! job store as they arrive.

mod handle;
mod reconcile;
mod tick;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::activity::SharedTracker;
use crate::config::{BudgetsConfig, TierdConfig};
use crate::pool::{CancelReason, Settled, WorkerPool};
use crate::queue::JobStore;
use crate::work::UnitOfWork;

pub use handle::{IngressError, SchedulerHandle, SchedulerStats};
pub use tick::TickReport;

/// Timing and budget knobs the scheduler reads from [`TierdConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
    pub shutdown_grace: Duration,
    pub retention_days: u32,
    pub budgets: BudgetsConfig,
}

impl From<&TierdConfig> for SchedulerSettings {
    fn from(cfg: &TierdConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            sweep_interval: cfg.sweep_interval(),
            shutdown_grace: cfg.shutdown_grace(),
            retention_days: cfg.retention_days,
            budgets: cfg.budgets.clone(),
        }
    }
}

pub struct AdaptiveScheduler<E: UnitOfWork> {
    tracker: SharedTracker,
    pool: WorkerPool,
    settled_rx: mpsc::UnboundedReceiver<Settled>,
    store: JobStore,
    executor: Arc<E>,
    settings: SchedulerSettings,
    running: Arc<AtomicBool>,
    /// Settlements the store rejected; retried at the start of each tick.
    unreconciled: Mutex<Vec<Settled>>,
}

impl<E: UnitOfWork> AdaptiveScheduler<E> {
    /// `settled_rx` is the receiver returned alongside `pool` by [`WorkerPool::new`].
    pub fn new(
        tracker: SharedTracker,
        pool: WorkerPool,
        settled_rx: mpsc::UnboundedReceiver<Settled>,
        store: JobStore,
        executor: Arc<E>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            tracker,
            pool,
            settled_rx,
            store,
            executor,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            unreconciled: Mutex::new(Vec::new()),
        }
    }

    fn unreconciled(&self) -> MutexGuard<'_, Vec<Settled>> {
        self.unreconciled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle for ingress: heartbeats, enqueue requests and stats.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(
            self.tracker.clone(),
            self.pool.clone(),
            self.store.clone(),
            Arc::clone(&self.running),
        )
    }

    /// Drive the loop until `shutdown` fires, then drain in-flight work.
    ///
    /// Jobs left in `processing` by a previous crash are returned to pending first.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let recovered = self.store.recover_processing_jobs().await?;
        if recovered > 0 {
            tracing::info!(recovered, "returned stranded jobs to pending");
        }
        self.running.store(true, Ordering::Release);
        tracing::info!(
            poll_secs = self.settings.poll_interval.as_secs(),
            "scheduler started"
        );

        let mut poll = tokio::time::interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let sweep_every = self.settings.sweep_interval;
        let mut sweep =
            tokio::time::interval_at(tokio::time::Instant::now() + sweep_every, sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = poll.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!(error = %format!("{:#}", e), "scheduler tick failed");
                    }
                }
                Some(settled) = self.settled_rx.recv() => {
                    let job_id = settled.job_id;
                    if let Err(e) = self.record(settled).await {
                        tracing::warn!(
                            job_id,
                            error = %format!("{:#}", e),
                            "failed to record settlement, retrying next tick"
                        );
                    }
                }
                _ = sweep.tick() => self.housekeeping().await,
            }
        }

        self.shutdown().await
    }

    /// Evict stale activity records and purge old terminal jobs.
    async fn housekeeping(&self) {
        let evicted = self.tracker.lock().sweep_stale();
        if evicted > 0 {
            tracing::info!(evicted, "evicted stale activity records");
        }
        if let Err(e) = self.store.cleanup(self.settings.retention_days).await {
            tracing::warn!(error = %format!("{:#}", e), "job cleanup failed");
        }
    }

    async fn shutdown(mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        let in_flight = self.pool.stats().active_workers;
        tracing::info!(in_flight, "scheduler stopping");

        if !self.pool.wait_idle(self.settings.shutdown_grace).await {
            let cancelled = self.pool.cancel_all(CancelReason::Shutdown);
            tracing::info!(cancelled, "grace period elapsed, cancelling remaining jobs");
            if !self.pool.wait_idle(self.pool.cancel_grace() * 4).await {
                tracing::warn!("some jobs did not settle before exit");
            }
        }
        let settled = self.drain_settled().await;
        let stranded = self.unreconciled_count();
        if stranded > 0 {
            tracing::warn!(
                stranded,
                "settlements not recorded; jobs stay processing until next start"
            );
        }
        tracing::info!(settled, "scheduler stopped");
        Ok(())
    }
}
