//! OpenRouter (OpenAI-compatible Chat Completions) client used for both image
//! generation and chat.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ChatProvider, ImageProvider, UpstreamError};
use crate::models::chat::ChatTurn;

const CHAT_SYSTEM_PROMPT: &str = "You are a helpful, friendly AI assistant on Tech-Image, an AI image generation platform. You can help users with their questions, provide creative suggestions for image prompts, discuss art and technology, and assist with general inquiries. Be conversational, helpful, and engaging. Keep responses concise but informative.";

const APP_TITLE: &str = "Tech-Image AI Studio";

#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    image_model: String,
    chat_model: String,
    referer: Option<String>,
}

impl OpenRouterClient {
    pub fn new(
        api_key: Option<String>,
        base_url: &str,
        image_model: String,
        chat_model: String,
    ) -> Result<Self, UpstreamError> {
        if api_key.is_none() {
            tracing::warn!("OPENROUTER_API_KEY not set; upstream calls will be rejected by the provider");
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| UpstreamError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            image_model,
            chat_model,
            referer: None,
        })
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }

    fn image_body(&self, prompt: &str, model: Option<&str>) -> Value {
        json!({
            "model": model.unwrap_or(&self.image_model),
            "messages": [{
                "role": "user",
                "content": format!("Generate a ultra-high-definition professional image of: {prompt}"),
            }],
            "modalities": ["image"],
        })
    }

    fn chat_body(&self, turns: &[ChatTurn]) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": CHAT_SYSTEM_PROMPT })];
        messages.extend(
            turns
                .iter()
                .map(|t| json!({ "role": t.role, "content": t.content })),
        );
        json!({
            "model": self.chat_model,
            "messages": messages,
            "max_tokens": 1024,
            "temperature": 0.7,
        })
    }

    async fn post(&self, body: &Value) -> Result<Value, UpstreamError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(url = %url, model = %body["model"], "upstream: POST chat/completions");

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("x-title", APP_TITLE)
            .json(body);
        if let Some(referer) = &self.referer {
            request = request.header("http-referer", referer);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(format!("HTTP request failed: {e}")))?;
        let status = response.status();

        let payload: Value = match response.json().await {
            Ok(payload) => payload,
            Err(e) if status.is_success() => {
                return Err(UpstreamError::Transport(format!("unreadable response body: {e}")));
            }
            Err(_) => {
                return Err(UpstreamError::Api {
                    code: Some(status.as_u16()),
                    message: format!("provider returned {status}"),
                });
            }
        };

        if let Some(err) = payload.get("error").filter(|e| !e.is_null()) {
            return Err(api_error(err, status.as_u16()));
        }
        if !status.is_success() {
            return Err(UpstreamError::Api {
                code: Some(status.as_u16()),
                message: format!("provider returned {status}"),
            });
        }

        tracing::debug!(status = status.as_u16(), "upstream: response received");
        Ok(payload)
    }
}

/// Read an OpenAI-style `error` object. The code may be numeric or a string.
fn api_error(err: &Value, http_status: u16) -> UpstreamError {
    let code = match err.get("code") {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
    .or((http_status >= 400).then_some(http_status));

    let message = err
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| err.as_str())
        .unwrap_or("AI Generation Engine Error")
        .to_string();

    UpstreamError::Api { code, message }
}

#[async_trait]
impl ImageProvider for OpenRouterClient {
    async fn generate_image(&self, prompt: &str, model: Option<&str>) -> Result<Value, UpstreamError> {
        self.post(&self.image_body(prompt, model)).await
    }
}

#[async_trait]
impl ChatProvider for OpenRouterClient {
    async fn chat(&self, turns: &[ChatTurn]) -> Result<Value, UpstreamError> {
        self.post(&self.chat_body(turns)).await
    }

    fn model(&self) -> &str {
        &self.chat_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenRouterClient {
        OpenRouterClient::new(
            Some("key".into()),
            "https://openrouter.test/api/v1/",
            "img-model".into(),
            "chat-model".into(),
        )
        .unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        assert_eq!(client().base_url, "https://openrouter.test/api/v1");
    }

    #[test]
    fn test_image_body_uses_default_model() {
        let body = client().image_body("a fox --ar 1:1", None);
        assert_eq!(body["model"], "img-model");
        assert_eq!(body["modalities"], json!(["image"]));
        assert!(body["messages"][0]["content"]
            .as_str()
            .unwrap()
            .ends_with("a fox --ar 1:1"));

        let body = client().image_body("a fox", Some("other/model"));
        assert_eq!(body["model"], "other/model");
    }

    #[test]
    fn test_chat_body_prepends_system_prompt() {
        let turns = vec![
            ChatTurn { role: "user".into(), content: "hi".into() },
            ChatTurn { role: "assistant".into(), content: "hello".into() },
        ];
        let body = client().chat_body(&turns);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["content"], "hello");
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn test_api_error_code_forms() {
        let err = api_error(&json!({ "code": 402, "message": "no funds" }), 200);
        assert_eq!(
            err,
            UpstreamError::Api { code: Some(402), message: "no funds".into() }
        );

        let err = api_error(&json!({ "code": "invalid_model" }), 400);
        assert_eq!(
            err,
            UpstreamError::Api {
                code: Some(400),
                message: "AI Generation Engine Error".into()
            }
        );

        let err = api_error(&json!("plain failure"), 200);
        assert_eq!(
            err,
            UpstreamError::Api { code: None, message: "plain failure".into() }
        );
    }
}
