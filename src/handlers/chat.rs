use axum::{extract::State, response::IntoResponse, Extension, Json};

use crate::error::AppError;
use crate::identity::VerifiedIdentity;
use crate::models::chat::{ChatRequest, ChatResponse, ChatTurn};
use crate::upstream::extract;
use crate::util::uid_prefix;
use crate::AppState;

/// POST /api/chat: relays the conversation to the chat provider. Not charged.
pub async fn chat(
    State(state): State<AppState>,
    identity: Option<Extension<VerifiedIdentity>>,
    Json(body): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "chat",
        uid = %identity.as_ref().map(|Extension(i)| uid_prefix(&i.uid)).unwrap_or("anonymous"),
        history_turns = body.history.len(),
        "Handler: POST /api/chat"
    );

    if body.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message is required".into()));
    }
    for turn in &body.history {
        turn.validate().map_err(AppError::BadRequest)?;
    }

    let mut turns = body.history;
    turns.push(ChatTurn {
        role: "user".into(),
        content: body.message,
    });

    let payload = state.chat.chat(&turns).await?;
    let response = extract::chat_reply(&payload).ok_or_else(|| {
        tracing::error!(payload = %payload, "No reply content in chat response");
        AppError::NoResultExtracted
    })?;

    tracing::info!(handler = "chat", reply_len = response.len(), status = 200, "Responding: chat reply");

    Ok(Json(ChatResponse {
        response,
        model: state.chat.model().to_string(),
    }))
}
