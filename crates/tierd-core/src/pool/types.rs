//! Types that cross the pool boundary.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::activity::{Phase, UserId};
use crate::queue::JobId;

/// Why a running job's token was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelReason {
    /// The user interacted again.
    Reactivated,
    /// The job exceeded the pool's job timeout.
    Timeout,
    /// The scheduler is shutting down.
    Shutdown,
    /// Explicit request (operator or API).
    Requested,
}

impl CancelReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CancelReason::Reactivated => "reactivated",
            CancelReason::Timeout => "timeout",
            CancelReason::Shutdown => "shutdown",
            CancelReason::Requested => "requested",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a submitted job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Stopped by cancellation; not a failure.
    Halted(CancelReason),
    Failed(String),
}

/// Settlement of one submitted job, delivered on the pool's outcome channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub job_id: JobId,
    pub user_id: UserId,
    /// Deepest phase the job ran in (dispatch phase, or later upgrade).
    pub phase: Phase,
    pub outcome: JobOutcome,
    pub elapsed: Duration,
}

/// Why `submit_job` refused a job. Nothing was spawned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("phase {0} does not run background work")]
    NotIdle(Phase),
    #[error("no capacity left for {0}")]
    AtCapacity(Phase),
    #[error("a job is already running for user {0}")]
    AlreadyRunning(UserId),
}

/// Snapshot of one running job.
#[derive(Debug, Clone, Serialize)]
pub struct RunningJob {
    pub job_id: JobId,
    pub user_id: UserId,
    pub phase: Phase,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseWorkerStats {
    pub phase: Phase,
    pub active: usize,
    pub max_concurrent: usize,
    pub cpu_share: u8,
}

/// Worker pool utilisation.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub active_workers: usize,
    pub max_workers: usize,
    /// Percentage (0-100) of the CPU budget in use.
    pub cpu_usage_estimate: f64,
    pub phases: Vec<PhaseWorkerStats>,
}
