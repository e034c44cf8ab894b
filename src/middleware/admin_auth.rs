use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::auth::verify_bearer;
use crate::error::AppError;
use crate::util::uid_prefix;
use crate::AppState;

/// The verified administrator behind an admin request.
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    pub uid: String,
}

/// Stateless admin gate: every request is verified against the identity
/// provider and then against the stored role.
///
/// - Missing or unverifiable token: 401.
/// - Verified, but the account is absent or not an administrator: 403.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = verify_bearer(&state, req.headers())
        .await?
        .ok_or_else(|| AppError::Unauthorized("No token provided".into()))?;

    let account = state.repo.find_account(&identity.uid).await?;
    match account {
        Some(account) if account.is_admin() => {
            tracing::debug!(
                uid = %uid_prefix(&identity.uid),
                uri = %req.uri().path(),
                "Admin middleware: administrator verified"
            );
            req.extensions_mut().insert(AdminIdentity { uid: identity.uid });
            Ok(next.run(req).await)
        }
        _ => {
            tracing::warn!(
                uid = %uid_prefix(&identity.uid),
                uri = %req.uri().path(),
                "Admin middleware: rejected, not an administrator"
            );
            Err(AppError::Forbidden("Admin access required".into()))
        }
    }
}
