//! SQLite-backed job store implementation.
//!
//! Handles connection, migrations, and timestamp helpers. Job reads and
//! transitions live in `jobs`.

use anyhow::Result;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::activity::UserId;

use super::types::{Job, JobStatus, Priority};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Percent-encode a path for a sqlite:// URI so spaces and special chars survive parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the SQLite-backed job queue.
///
/// The database file is stored under the XDG state directory:
/// `~/.local/state/tierd/jobs.db`.
#[derive(Clone)]
pub struct JobStore {
    pub(crate) pool: Pool<Sqlite>,
    pub(crate) max_attempts: u32,
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore")
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl JobStore {
    /// Open (or create) the default job database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("tierd")?;
        let state_dir = xdg_dirs.get_state_home();
        Self::open_at(state_dir.join("jobs.db")).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await?;
        let store = JobStore {
            pool,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Attempts granted to jobs created from now on.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                queued_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                error_message TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        // At most one live job per user.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS jobs_one_live_per_user
            ON jobs (user_id)
            WHERE status IN ('pending', 'processing');
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS jobs_status_queued
            ON jobs (status, queued_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// SQL expression ranking `priority` so that `ORDER BY ... DESC` puts high first.
pub(crate) const PRIORITY_RANK_SQL: &str =
    "CASE priority WHEN 'high' THEN 2 WHEN 'normal' THEN 1 ELSE 0 END";

pub(crate) const JOB_COLUMNS: &str = "id, user_id, status, priority, queued_at, started_at, \
     completed_at, attempt_count, max_attempts, error_message";

pub(crate) fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let user_id: String = row.get("user_id");
    let status: String = row.get("status");
    let priority: String = row.get("priority");
    let attempt_count: i64 = row.get("attempt_count");
    let max_attempts: i64 = row.get("max_attempts");
    Ok(Job {
        id: row.get("id"),
        user_id: UserId::parse(user_id)?,
        status: status.parse::<JobStatus>()?,
        priority: priority.parse::<Priority>()?,
        queued_at: row.get("queued_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        attempt_count: u32::try_from(attempt_count).unwrap_or(0),
        max_attempts: u32::try_from(max_attempts).unwrap_or(DEFAULT_MAX_ATTEMPTS),
        error_message: row.get("error_message"),
    })
}

/// Current time as Unix seconds (for DB timestamps).
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
/// Open an in-memory database for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<JobStore> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let store = JobStore {
        pool,
        max_attempts: DEFAULT_MAX_ATTEMPTS,
    };
    store.migrate().await?;
    Ok(store)
}
