use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityStats, Phase, UserId};
use crate::queue::{JobId, Priority};
use crate::scheduler::{IngressError, SchedulerStats};

use super::error::ApiError;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub user_id: String,
    pub idle_ms: u64,
    pub phase: Phase,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub user_id: String,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub job_id: JobId,
}

fn parse_user(raw: String) -> Result<UserId, ApiError> {
    UserId::parse(raw).map_err(|e| ApiError::from(IngressError::from(e)))
}

pub(super) async fn health() -> &'static str {
    "ok"
}

pub(super) async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let user = parse_user(req.user_id)?;
    let hb = state.handle.record_activity(&user);
    Ok(Json(HeartbeatResponse {
        user_id: hb.user_id.to_string(),
        idle_ms: u64::try_from(hb.idle.as_millis()).unwrap_or(u64::MAX),
        phase: hb.phase,
    }))
}

pub(super) async fn enqueue(
    State(state): State<AppState>,
    Json(req): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let user = parse_user(req.user_id)?;
    let job_id = state
        .handle
        .queue_user_for_analysis(&user, req.priority)
        .await?;
    tracing::debug!(job_id, user = %user, priority = %req.priority, "analysis requested");
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse { job_id })))
}

pub(super) async fn stats(State(state): State<AppState>) -> Json<SchedulerStats> {
    Json(state.handle.stats())
}

pub(super) async fn activity_stats(State(state): State<AppState>) -> Json<ActivityStats> {
    Json(state.handle.activity_stats())
}
