use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::scheduler::IngressError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Ingress(#[from] IngressError),
    #[error("missing or invalid bearer token")]
    Unauthorized,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Ingress(IngressError::InvalidUser(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_user")
            }
            ApiError::Ingress(IngressError::Store(e)) => {
                tracing::warn!(
                    error = %format!("{:#}", e),
                    "job store error while serving request"
                );
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
        };
        let body = ErrorBody {
            error: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}
