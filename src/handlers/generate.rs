use axum::{extract::State, response::IntoResponse, Extension, Json};

use crate::error::AppError;
use crate::identity::VerifiedIdentity;
use crate::models::generation::{GenerationRequest, GenerationResponse};
use crate::util::uid_prefix;
use crate::AppState;

/// POST /api/generate: charged when a bearer identity is present, free otherwise.
pub async fn generate(
    State(state): State<AppState>,
    identity: Option<Extension<VerifiedIdentity>>,
    Json(body): Json<GenerationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let uid = identity.as_ref().map(|Extension(i)| i.uid.as_str());

    tracing::info!(
        handler = "generate",
        uid = %uid.map(uid_prefix).unwrap_or("anonymous"),
        model = body.model.as_deref().unwrap_or("default"),
        ratio = body.ratio.as_deref().unwrap_or("none"),
        "Handler: POST /api/generate"
    );

    let generation = state.ledger.generate(uid, &body).await?;

    tracing::info!(
        handler = "generate",
        balance = ?generation.balance,
        status = 200,
        "Responding: image generated"
    );

    Ok(Json(GenerationResponse {
        image_url: generation.result_ref,
        credits: generation.balance,
    }))
}
