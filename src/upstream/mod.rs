//! Third-party model providers.
//!
//! Providers return the raw JSON payload of a successful call. Turning that
//! payload into a result is left to [`extract`], so the probing logic stays
//! independent of any one provider's response shape.

pub mod extract;
pub mod openrouter;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::chat::ChatTurn;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// The provider answered with an error object or a failing status.
    #[error("provider error{}: {message}", code.map(|c| format!(" {c}")).unwrap_or_default())]
    Api { code: Option<u16>, message: String },
    /// The request never produced a readable response.
    #[error("transport failure: {0}")]
    Transport(String),
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate_image(&self, prompt: &str, model: Option<&str>) -> Result<Value, UpstreamError>;
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Complete a conversation. Stateless: the full turn history is sent each call.
    async fn chat(&self, turns: &[ChatTurn]) -> Result<Value, UpstreamError>;

    /// Model name reported back to clients.
    fn model(&self) -> &str;
}
