//! Phase-budgeted worker pool.
//!
//! `submit_job` either reserves a slot in the job's phase and spawns the unit
//! of work, or rejects the job without side effects. Every accepted job is
//! settled exactly once on the outcome channel returned by [`WorkerPool::new`].
//! At most one job runs per user.

mod budget;
mod control;
mod guard;
mod types;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::activity::{Phase, UserId};
use crate::config::TierdConfig;
use crate::work::{WorkError, WorkRequest};

use control::{Slot, SlotRegistry};
use guard::SlotGuard;

pub use budget::PhaseBudget;
pub use types::{
    AdmissionError, CancelReason, JobOutcome, PhaseWorkerStats, RunningJob, Settled, WorkerStats,
};

/// How long a cancelled unit of work may keep running before its future is dropped.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(500);

pub(crate) struct PoolInner {
    budget: PhaseBudget,
    slots: SlotRegistry,
    tasks: TaskTracker,
    settled_tx: mpsc::UnboundedSender<Settled>,
    job_timeout: Duration,
    cancel_grace: Duration,
}

/// How the spawned unit of work exited, before the cancel reason is known.
enum Exit {
    Done,
    Cancelled,
    Failed(String),
}

impl PoolInner {
    fn release_slot(&self, user: &UserId) -> Option<Slot> {
        let slot = self.slots.unregister(user)?;
        self.budget.release(slot.phase);
        Some(slot)
    }

    async fn supervise<Fut>(
        &self,
        request: &WorkRequest,
        token: CancellationToken,
        work: Fut,
    ) -> Exit
    where
        Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        let mut handle = tokio::spawn(work);
        let deadline = tokio::time::sleep(self.job_timeout);
        tokio::pin!(deadline);

        let joined = tokio::select! {
            res = &mut handle => res,
            _ = token.cancelled() => self.drain(request, &mut handle).await,
            _ = &mut deadline => {
                tracing::warn!(
                    job_id = request.job_id,
                    user = %request.user_id,
                    timeout_secs = self.job_timeout.as_secs(),
                    "job timed out, cancelling"
                );
                self.slots.request_cancel(&request.user_id, CancelReason::Timeout);
                self.drain(request, &mut handle).await
            }
        };

        match joined {
            Ok(Ok(())) => Exit::Done,
            Ok(Err(WorkError::Cancelled)) => Exit::Cancelled,
            Ok(Err(WorkError::Failed(msg))) => Exit::Failed(msg),
            Err(e) if e.is_panic() => Exit::Failed(panic_message(e)),
            Err(_) => Exit::Cancelled,
        }
    }

    /// Give a cancelled unit of work `cancel_grace` to return, then drop it.
    async fn drain(
        &self,
        request: &WorkRequest,
        handle: &mut JoinHandle<Result<(), WorkError>>,
    ) -> Result<Result<(), WorkError>, JoinError> {
        match tokio::time::timeout(self.cancel_grace, &mut *handle).await {
            Ok(res) => res,
            Err(_) => {
                handle.abort();
                tracing::warn!(
                    job_id = request.job_id,
                    user = %request.user_id,
                    "unit of work ignored cancellation, dropped"
                );
                Ok(Err(WorkError::Cancelled))
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(d) => format!("unit of work panicked: {d}"),
        None => "unit of work panicked".to_string(),
    }
}

/// Cheap to clone; clones share the same budget and running set.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("budget", &self.inner.budget)
            .field("job_timeout", &self.inner.job_timeout)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Create a pool and the receiver its settlements are delivered on.
    pub fn new(
        budget: PhaseBudget,
        job_timeout: Duration,
        cancel_grace: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Settled>) {
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let inner = PoolInner {
            budget,
            slots: SlotRegistry::default(),
            tasks: TaskTracker::new(),
            settled_tx,
            job_timeout,
            cancel_grace,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            settled_rx,
        )
    }

    pub fn from_config(cfg: &TierdConfig) -> (Self, mpsc::UnboundedReceiver<Settled>) {
        Self::new(
            PhaseBudget::new(&cfg.budgets, cfg.max_workers()),
            cfg.job_timeout(),
            DEFAULT_CANCEL_GRACE,
        )
    }

    pub fn budget(&self) -> &PhaseBudget {
        &self.inner.budget
    }

    pub fn cancel_grace(&self) -> Duration {
        self.inner.cancel_grace
    }

    pub fn can_accept_job(&self, phase: Phase) -> bool {
        self.inner.budget.can_accept(phase)
    }

    /// Reserve a slot for `request.phase` and spawn `work`.
    ///
    /// `work` is called once with the job's cancellation token. On rejection
    /// nothing is spawned and `work` is never called.
    pub fn submit_job<F, Fut>(&self, request: WorkRequest, work: F) -> Result<(), AdmissionError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        let phase = request.phase;
        if !phase.is_idle() {
            return Err(AdmissionError::NotIdle(phase));
        }
        if self.inner.slots.contains(&request.user_id) {
            return Err(AdmissionError::AlreadyRunning(request.user_id));
        }
        if !self.inner.budget.try_reserve(phase) {
            return Err(AdmissionError::AtCapacity(phase));
        }
        let Some(token) = self.inner.slots.register(&request.user_id, request.job_id, phase) else {
            self.inner.budget.release(phase);
            return Err(AdmissionError::AlreadyRunning(request.user_id));
        };

        tracing::info!(
            job_id = request.job_id,
            user = %request.user_id,
            %phase,
            attempt = request.attempt,
            "job started"
        );

        let fut = work(token.clone());
        let inner = Arc::clone(&self.inner);
        let guard = SlotGuard {
            inner: Arc::clone(&self.inner),
            user: request.user_id.clone(),
            released: false,
        };

        self.inner.tasks.spawn(async move {
            let exit = inner.supervise(&request, token, fut).await;
            let (reason, phase, elapsed) = match guard.finish() {
                Some(slot) => (
                    slot.reason.unwrap_or(CancelReason::Requested),
                    slot.phase,
                    slot.started_at.elapsed(),
                ),
                None => (CancelReason::Requested, request.phase, Duration::ZERO),
            };
            let outcome = match exit {
                Exit::Done => JobOutcome::Completed,
                Exit::Cancelled => JobOutcome::Halted(reason),
                Exit::Failed(msg) => JobOutcome::Failed(msg),
            };
            match &outcome {
                JobOutcome::Completed => tracing::info!(
                    job_id = request.job_id,
                    user = %request.user_id,
                    %phase,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "job completed"
                ),
                JobOutcome::Halted(reason) => tracing::info!(
                    job_id = request.job_id,
                    user = %request.user_id,
                    %reason,
                    "job halted"
                ),
                JobOutcome::Failed(msg) => tracing::warn!(
                    job_id = request.job_id,
                    user = %request.user_id,
                    error = %msg,
                    "job failed"
                ),
            }
            let settled = Settled {
                job_id: request.job_id,
                user_id: request.user_id,
                phase,
                outcome,
                elapsed,
            };
            if inner.settled_tx.send(settled).is_err() {
                tracing::debug!("settlement receiver closed");
            }
        });
        Ok(())
    }

    /// Signal the user's running job to stop. Returns false if none is running.
    pub fn cancel(&self, user: &UserId, reason: CancelReason) -> bool {
        let signalled = self.inner.slots.request_cancel(user, reason);
        if signalled {
            tracing::debug!(user = %user, %reason, "cancellation requested");
        }
        signalled
    }

    /// Signal every running job; returns how many were signalled.
    pub fn cancel_all(&self, reason: CancelReason) -> usize {
        self.inner.slots.cancel_all(reason)
    }

    /// Move a running job's budget charge to the deeper `phase` if it has room.
    pub fn upgrade_phase(&self, user: &UserId, phase: Phase) -> bool {
        let mut slots = self.inner.slots.write();
        let Some(slot) = slots.get_mut(user) else {
            return false;
        };
        if phase <= slot.phase || !self.inner.budget.try_transfer(slot.phase, phase) {
            return false;
        }
        tracing::debug!(user = %user, from = %slot.phase, to = %phase, "upgraded running job");
        slot.phase = phase;
        true
    }

    pub fn is_running(&self, user: &UserId) -> bool {
        self.inner.slots.contains(user)
    }

    pub fn running_users(&self) -> Vec<UserId> {
        self.inner.slots.users()
    }

    pub fn running(&self) -> Vec<RunningJob> {
        self.inner.slots.snapshot()
    }

    pub fn stats(&self) -> WorkerStats {
        let budget = &self.inner.budget;
        WorkerStats {
            active_workers: budget.total_in_use(),
            max_workers: budget.max_total(),
            cpu_usage_estimate: budget.cpu_usage_estimate(),
            phases: Phase::IDLE_PHASES
                .iter()
                .map(|&phase| PhaseWorkerStats {
                    phase,
                    active: budget.in_use(phase),
                    max_concurrent: budget.ceiling(phase),
                    cpu_share: budget.cpu_share(phase),
                })
                .collect(),
        }
    }

    /// Wait up to `grace` for every spawned job to settle. Returns true if idle.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let tasks = &self.inner.tasks;
        tasks.close();
        let idle = tokio::time::timeout(grace, tasks.wait()).await.is_ok();
        tasks.reopen();
        idle
    }
}
