//! HTTP ingress: heartbeats and enqueue requests in, stats out.
//!
//! Routes:
//! - `POST /api/heartbeat` `{"user_id"}` → `{"user_id", "idle_ms", "phase"}`
//! - `POST /api/jobs` `{"user_id", "priority"?}` → `202 {"job_id"}`
//! - `GET /api/stats`, `GET /api/stats/activity`
//! - `GET /health`
//!
//! When a token is configured every `/api` route requires
//! `Authorization: Bearer <token>`.

mod error;
mod handlers;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::scheduler::SchedulerHandle;

pub use error::ApiError;
pub use handlers::{EnqueueRequest, EnqueueResponse, HeartbeatRequest, HeartbeatResponse};

#[derive(Clone)]
pub struct AppState {
    handle: SchedulerHandle,
    token: Option<Arc<str>>,
}

pub fn build_router(handle: SchedulerHandle, token: Option<String>) -> Router {
    let state = AppState {
        handle,
        token: token.filter(|t| !t.is_empty()).map(Arc::from),
    };

    let api = Router::new()
        .route("/heartbeat", post(handlers::heartbeat))
        .route("/jobs", post(handlers::enqueue))
        .route("/stats", get(handlers::stats))
        .route("/stats/activity", get(handlers::activity_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.token.as_deref() {
        let presented = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected) {
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(req).await)
}

/// Serve `router` on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "http ingress listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
