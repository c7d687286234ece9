//! Job read operations: get, list, eligibility scans and counts.

use anyhow::Result;
use sqlx::Row;

use crate::activity::{Phase, UserId};

use super::super::db::{job_from_row, JobStore, JOB_COLUMNS, PRIORITY_RANK_SQL};
use super::super::types::{Job, JobId, JobStatus, Priority, StatusCounts};

impl JobStore {
    /// Fetch a single job row.
    pub async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// List all jobs, newest first.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY queued_at DESC, id DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(job_from_row).collect()
    }

    /// The user's pending or processing job, if any.
    pub async fn active_job_for_user(&self, user: &UserId) -> Result<Option<Job>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE user_id = ?1 AND status IN ('pending', 'processing') \
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// Pending jobs `phase` may draw from, best first:
    /// priority desc, then enqueue time asc, then id asc.
    pub async fn next_eligible(&self, phase: Phase, limit: usize) -> Result<Vec<Job>> {
        self.eligible_page(phase, limit, 0).await
    }

    /// One page of the `next_eligible` ordering, for callers that filter rows further.
    pub async fn eligible_page(
        &self,
        phase: Phase,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>> {
        self.eligible_page_excluding(phase, &[], limit, offset).await
    }

    /// Like [`eligible_page`](Self::eligible_page), skipping jobs owned by
    /// `exclude`d users.
    pub async fn eligible_page_excluding(
        &self,
        phase: Phase,
        exclude: &[UserId],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>> {
        let band = Priority::band_for(phase);
        if band.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; band.len()].join(", ");
        let skip_users = if exclude.is_empty() {
            String::new()
        } else {
            format!(" AND user_id NOT IN ({})", vec!["?"; exclude.len()].join(", "))
        };
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE status = 'pending' AND priority IN ({placeholders}){skip_users} \
             ORDER BY {PRIORITY_RANK_SQL} DESC, queued_at ASC, id ASC \
             LIMIT ? OFFSET ?"
        );
        let mut query = sqlx::query(&sql);
        for p in band {
            query = query.bind(p.as_str());
        }
        for user in exclude {
            query = query.bind(user.as_str());
        }
        let rows = query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Number of jobs in each status.
    pub async fn count_by_status(&self) -> Result<StatusCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            counts.set(status.parse::<JobStatus>()?, n.max(0) as u64);
        }
        Ok(counts)
    }
}
