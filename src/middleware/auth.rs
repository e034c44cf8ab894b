use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::identity::VerifiedIdentity;
use crate::util::uid_prefix;
use crate::AppState;

/// Token from an `Authorization: Bearer <token>` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub(crate) async fn verify_bearer(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<VerifiedIdentity>, AppError> {
    let Some(token) = bearer_token(headers) else {
        return Ok(None);
    };
    match state.identity.verify(token).await {
        Ok(identity) => Ok(Some(identity)),
        Err(e) => {
            tracing::debug!(error = %e, "Identity verification failed");
            Err(AppError::Unauthorized("Unauthorized or invalid token".into()))
        }
    }
}

/// Resolve the bearer token to an identity and attach it to the request.
/// Missing or invalid tokens are rejected with 401.
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let method = req.method().clone();
    let uri = req.uri().path().to_string();

    let identity = verify_bearer(&state, req.headers())
        .await?
        .ok_or_else(|| {
            tracing::warn!(method = %method, uri = %uri, "Auth middleware: rejected, no bearer token");
            AppError::Unauthorized("No token provided".into())
        })?;

    tracing::debug!(
        uid = %uid_prefix(&identity.uid),
        method = %method,
        uri = %uri,
        "Auth middleware: identity verified, forwarding to handler"
    );
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Like [`require_identity`], but lets requests without a bearer token through
/// anonymously. A token that is present must still verify.
pub async fn optional_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(identity) = verify_bearer(&state, req.headers()).await? {
        req.extensions_mut().insert(identity);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc123token"));
        assert_eq!(bearer_token(&headers), Some("abc123token"));

        headers.insert("authorization", HeaderValue::from_static("abc123token"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }
}
