//! Types used by the job queue.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::activity::{Phase, UserId};

/// Job identifier.
pub type JobId = i64;

/// Job status stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled jobs never run again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown job status {:?}", s))
    }
}

/// Dispatch priority. Ordered `Low < Normal < High`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }

    /// Sort key matching `PRIORITY_RANK_SQL`.
    pub(crate) fn rank(self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }

    /// Priorities a phase may draw from. Low-priority work waits for deeply idle users.
    pub fn band_for(phase: Phase) -> &'static [Priority] {
        match phase {
            Phase::Active => &[],
            Phase::Phase1 | Phase::Phase2 => &[Priority::High, Priority::Normal],
            Phase::Phase3 => &[Priority::High, Priority::Normal, Priority::Low],
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            _ => Err(anyhow::anyhow!("unknown priority {:?} (expected high, normal or low)", s)),
        }
    }
}

/// Persisted analysis job. Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub user_id: UserId,
    pub status: JobStatus,
    pub priority: Priority,
    pub queued_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub error_message: Option<String>,
}

/// Result of an enqueue: the live job for the user and whether it was just created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub id: JobId,
    pub created: bool,
}

/// Row counts per status, used by `tierd status` and the stats endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl StatusCounts {
    pub(crate) fn set(&mut self, status: JobStatus, n: u64) {
        match status {
            JobStatus::Pending => self.pending = n,
            JobStatus::Processing => self.processing = n,
            JobStatus::Completed => self.completed = n,
            JobStatus::Failed => self.failed = n,
            JobStatus::Cancelled => self.cancelled = n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_roundtrip() {
        for st in JobStatus::ALL {
            assert_eq!(st.as_str().parse::<JobStatus>().unwrap(), st);
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn priority_order_and_parse() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn bands_widen_with_idleness() {
        assert!(Priority::band_for(Phase::Active).is_empty());
        assert!(!Priority::band_for(Phase::Phase1).contains(&Priority::Low));
        assert!(Priority::band_for(Phase::Phase3).contains(&Priority::Low));
    }
}
