pub mod accounts;
pub mod admin;
pub mod chat;
pub mod generate;
pub mod health;

use axum::http::Uri;

use crate::error::AppError;

/// Fallback for unmatched routes.
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("API route not found: {}", uri.path()))
}
