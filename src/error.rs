use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::upstream::UpstreamError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("insufficient credits")]
    InsufficientCredits,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream error: {message}")]
    Upstream { code: Option<u16>, message: String },
    #[error("no result could be extracted from the upstream response")]
    NoResultExtracted,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Stable machine-readable kind, sent as `code` in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::InsufficientCredits => "insufficient_credits",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Upstream { .. } => "upstream_error",
            AppError::NoResultExtracted => "no_result_extracted",
            AppError::Transport(_) => "transport_error",
            AppError::Database(_) => "database",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::InsufficientCredits => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream { code, .. } => code
                .filter(|c| (400..600).contains(c))
                .and_then(|c| StatusCode::from_u16(c).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            AppError::NoResultExtracted | AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::Api { code, message } => AppError::Upstream { code, message },
            UpstreamError::Transport(msg) => AppError::Transport(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = match &self {
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => {
                tracing::warn!(error_type = kind, message = %msg, status = status.as_u16(), "Responding with client error");
                msg.clone()
            }
            AppError::InsufficientCredits => {
                tracing::warn!(error_type = kind, status = status.as_u16(), "Responding with client error");
                "Insufficient credits".to_string()
            }
            AppError::Upstream { message, .. } => {
                tracing::error!(error_type = kind, message = %message, status = status.as_u16(), "Responding with upstream error");
                format!("[AI Engine] {message}")
            }
            AppError::NoResultExtracted => {
                tracing::error!(error_type = kind, status = status.as_u16(), "Responding with upstream error");
                "The AI model responded but no result was found. Please try again or change the prompt."
                    .to_string()
            }
            AppError::Transport(msg) => {
                tracing::error!(error_type = kind, error = %msg, status = status.as_u16(), "Responding with upstream error");
                "Lost connection to AI engine.".to_string()
            }
            AppError::Database(e) => {
                tracing::error!(error_type = kind, error = %e, "Responding with 500");
                "Internal server error".to_string()
            }
        };
        (status, Json(json!({ "error": message, "code": kind }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_status_passes_through_http_codes() {
        let err = AppError::Upstream {
            code: Some(429),
            message: "rate limited".into(),
        };
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_upstream_status_falls_back_to_bad_gateway() {
        let err = AppError::Upstream {
            code: Some(42),
            message: "odd".into(),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        let err = AppError::Upstream {
            code: None,
            message: "none".into(),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(AppError::InsufficientCredits.kind(), "insufficient_credits");
        assert_eq!(AppError::Transport("x".into()).kind(), "transport_error");
        assert_eq!(AppError::NoResultExtracted.kind(), "no_result_extracted");
        assert_eq!(AppError::Conflict("x".into()).kind(), "conflict");
    }
}
