//! Checkpointed stand-in executor used by `tierd serve` until a real
//! analysis backend is wired in.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::activity::Phase;

use super::{checkpoint, UnitOfWork, WorkError, WorkRequest, CHECKPOINT_INTERVAL};

/// Burns a per-phase amount of wall-clock time in checkpoint-sized steps.
#[derive(Debug, Clone)]
pub struct SimulatedAnalysis {
    phase1: Duration,
    phase2: Duration,
    phase3: Duration,
}

impl Default for SimulatedAnalysis {
    fn default() -> Self {
        Self {
            phase1: Duration::from_secs(2),
            phase2: Duration::from_secs(5),
            phase3: Duration::from_secs(15),
        }
    }
}

impl SimulatedAnalysis {
    pub fn new(phase1: Duration, phase2: Duration, phase3: Duration) -> Self {
        Self {
            phase1,
            phase2,
            phase3,
        }
    }

    pub fn duration_for(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Active => Duration::ZERO,
            Phase::Phase1 => self.phase1,
            Phase::Phase2 => self.phase2,
            Phase::Phase3 => self.phase3,
        }
    }
}

impl UnitOfWork for SimulatedAnalysis {
    async fn run(&self, request: WorkRequest, cancel: CancellationToken) -> Result<(), WorkError> {
        let mut remaining = self.duration_for(request.phase);
        tracing::debug!(
            job_id = request.job_id,
            user = %request.user_id,
            phase = %request.phase,
            "simulated analysis started"
        );
        while !remaining.is_zero() {
            checkpoint(&cancel)?;
            let step = remaining.min(CHECKPOINT_INTERVAL);
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = cancel.cancelled() => return Err(WorkError::Cancelled),
            }
            remaining -= step;
        }
        checkpoint(&cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::UserId;

    fn request(phase: Phase) -> WorkRequest {
        WorkRequest {
            job_id: 1,
            user_id: UserId::parse("sim").unwrap(),
            phase,
            attempt: 0,
        }
    }

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let exec = SimulatedAnalysis::new(
            Duration::from_millis(30),
            Duration::from_millis(30),
            Duration::from_millis(30),
        );
        let res = exec.run(request(Phase::Phase1), CancellationToken::new()).await;
        assert_eq!(res, Ok(()));
    }

    #[tokio::test]
    async fn stops_promptly_on_cancel() {
        let exec = SimulatedAnalysis::new(
            Duration::from_secs(60),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        let res = exec.run(request(Phase::Phase3), token).await;
        assert_eq!(res, Err(WorkError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
