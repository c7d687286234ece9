//! Unit-of-work contract between the scheduler and the analysis backend.
//!
//! A unit of work receives a [`CancellationToken`] and must check it at least
//! every ~100 ms of wall-clock work. On observing cancellation it returns
//! [`WorkError::Cancelled`]; any other error is a genuine failure and counts
//! against the job's attempts. The token must not be retained after `run`
//! returns.

mod simulated;

use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::activity::{Phase, UserId};
use crate::queue::JobId;

pub use simulated::SimulatedAnalysis;

/// Upper bound between two cancellation checks inside a unit of work.
pub const CHECKPOINT_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

/// What the executor is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRequest {
    pub job_id: JobId,
    pub user_id: UserId,
    /// Phase the job was dispatched in; deeper phases get heavier analysis.
    pub phase: Phase,
    /// Failed attempts before this one.
    pub attempt: u32,
}

/// How a unit of work ended other than successfully.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkError {
    /// The cancellation token fired and the work stopped at a checkpoint.
    #[error("cancelled")]
    Cancelled,
    /// The work itself failed.
    #[error("{0}")]
    Failed(String),
}

impl WorkError {
    pub fn failed(err: impl fmt::Display) -> Self {
        WorkError::Failed(err.to_string())
    }
}

impl From<anyhow::Error> for WorkError {
    fn from(err: anyhow::Error) -> Self {
        WorkError::Failed(format!("{:#}", err))
    }
}

/// The analysis/matching backend, opaque to the scheduler.
pub trait UnitOfWork: Send + Sync + 'static {
    fn run(
        &self,
        request: WorkRequest,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), WorkError>> + Send;
}

/// Return `Err(WorkError::Cancelled)` if `cancel` has fired. Call at every checkpoint.
pub fn checkpoint(cancel: &CancellationToken) -> Result<(), WorkError> {
    if cancel.is_cancelled() {
        Err(WorkError::Cancelled)
    } else {
        Ok(())
    }
}
