//! Job write operations: enqueue and status transitions.
//!
//! Every transition is guarded by the expected source status, so a stale
//! settlement (e.g. for a job an operator already cancelled) is a no-op.

use anyhow::Result;
use sqlx::Row;

use crate::activity::UserId;

use super::super::db::{unix_timestamp, JobStore, PRIORITY_RANK_SQL};
use super::super::types::{Enqueued, JobId, JobStatus, Priority};

/// Insert-or-reuse rounds before `enqueue` gives up.
const ENQUEUE_ATTEMPTS: usize = 3;

impl JobStore {
    /// Queue analysis for `user`, reusing the live job if one exists.
    ///
    /// A pending or processing job for the same user is returned instead of
    /// creating a second row; a higher `priority` is applied to it in place.
    /// Both steps are single statements, so concurrent callers wait on the
    /// busy timeout instead of failing on a lock upgrade.
    pub async fn enqueue(&self, user: &UserId, priority: Priority) -> Result<Enqueued> {
        for _ in 0..ENQUEUE_ATTEMPTS {
            // The partial unique index rejects a second live row for the user.
            let inserted = sqlx::query(
                r#"
                INSERT OR IGNORE INTO jobs (
                    user_id, status, priority, queued_at,
                    started_at, completed_at, attempt_count, max_attempts, error_message
                ) VALUES (?1, 'pending', ?2, ?3, NULL, NULL, 0, ?4, NULL)
                "#,
            )
            .bind(user.as_str())
            .bind(priority.as_str())
            .bind(unix_timestamp())
            .bind(i64::from(self.max_attempts))
            .execute(&self.pool)
            .await?;

            if inserted.rows_affected() == 1 {
                let id = inserted.last_insert_rowid();
                tracing::debug!(job_id = id, user = %user, %priority, "enqueued job");
                return Ok(Enqueued { id, created: true });
            }

            let reuse = format!(
                r#"
                UPDATE jobs
                SET priority = CASE WHEN {PRIORITY_RANK_SQL} < ?1 THEN ?2 ELSE priority END
                WHERE user_id = ?3 AND status IN ('pending', 'processing')
                RETURNING id, priority
                "#
            );
            let live = sqlx::query(&reuse)
                .bind(priority.rank())
                .bind(priority.as_str())
                .bind(user.as_str())
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = live {
                let id: i64 = row.get("id");
                let current: String = row.get("priority");
                tracing::debug!(job_id = id, user = %user, priority = %current, "reused live job");
                return Ok(Enqueued { id, created: false });
            }
            // The live job settled between the two statements.
        }
        anyhow::bail!("enqueue for {} kept racing a settling job", user)
    }

    /// pending → processing. Returns false if the job was not pending.
    pub async fn mark_processing(&self, id: JobId) -> Result<bool> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'processing',
                started_at = ?1,
                completed_at = NULL
            WHERE id = ?2 AND status = 'pending'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }

    /// processing → completed.
    pub async fn mark_completed(&self, id: JobId) -> Result<bool> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                completed_at = ?1,
                error_message = NULL
            WHERE id = ?2 AND status = 'processing'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }

    /// processing → pending after a halt. The attempt count is left alone:
    /// a halt is not a failure.
    pub async fn mark_pending_for_retry(&self, id: JobId) -> Result<bool> {
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                started_at = NULL
            WHERE id = ?1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }

    /// Record a failed attempt: increments the attempt count and stores `error`.
    ///
    /// The job goes back to pending while attempts remain and becomes failed
    /// once `attempt_count` reaches `max_attempts`. Returns the new status, or
    /// `None` if the job was not processing.
    pub async fn mark_failed(&self, id: JobId, error: &str) -> Result<Option<JobStatus>> {
        let now = unix_timestamp();
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET attempt_count = attempt_count + 1,
                error_message = ?1,
                started_at = NULL,
                status = CASE
                    WHEN attempt_count + 1 >= max_attempts THEN 'failed'
                    ELSE 'pending'
                END,
                completed_at = CASE
                    WHEN attempt_count + 1 >= max_attempts THEN ?2
                    ELSE NULL
                END
            WHERE id = ?3 AND status = 'processing'
            RETURNING status
            "#,
        )
        .bind(error)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.get::<String, _>("status").parse::<JobStatus>())
            .transpose()
    }

    /// pending → cancelled (operator request). Running jobs are not touched.
    pub async fn cancel_job(&self, id: JobId) -> Result<bool> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled',
                completed_at = ?1
            WHERE id = ?2 AND status = 'pending'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }

    /// Normalize any job left in `processing` to `pending` (e.g. after a crash).
    /// Call before scheduling so stranded jobs are picked up again.
    /// Returns the number of jobs reset.
    pub async fn recover_processing_jobs(&self) -> Result<u64> {
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                started_at = NULL
            WHERE status = 'processing'
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Purge terminal jobs that finished more than `days_old` days ago.
    pub async fn cleanup(&self, days_old: u32) -> Result<u64> {
        let cutoff = unix_timestamp() - i64::from(days_old) * 86_400;
        self.purge_terminal_before(cutoff).await
    }

    /// Purge terminal jobs whose completion (or enqueue, if never completed)
    /// time is strictly before `cutoff` (Unix seconds).
    pub async fn purge_terminal_before(&self, cutoff: i64) -> Result<u64> {
        let r = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'failed', 'cancelled')
              AND COALESCE(completed_at, queued_at) < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        if r.rows_affected() > 0 {
            tracing::info!(purged = r.rows_affected(), "cleaned up terminal jobs");
        }
        Ok(r.rows_affected())
    }
}
