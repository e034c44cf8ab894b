use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: &'static str,
    pub database: &'static str,
}

/// GET /api/health: liveness plus a store round-trip.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.repo.health_check().await {
        tracing::error!(error = %e, "health: account store unreachable");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                success: false,
                message: "API degraded",
                database: "unreachable",
            }),
        );
    }

    (
        StatusCode::OK,
        Json(HealthResponse {
            success: true,
            message: "API OK",
            database: "ok",
        }),
    )
}
