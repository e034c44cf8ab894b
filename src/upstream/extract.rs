use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://[^\s)]+\.(?:png|jpe?g|gif|webp)(?:\?\S*)?").expect("valid regex")
});

static ANY_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)]+").expect("valid regex"));

type Strategy = fn(&Value) -> Option<String>;

/// Tried in order; the first strategy yielding a reference wins.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("message_images", from_message_images),
    ("data_array", from_data_array),
    ("content_image_url", from_content_image_url),
    ("content_any_url", from_content_any_url),
];

/// Pull a generated image reference out of a provider payload.
pub fn result_reference(payload: &Value) -> Option<String> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let found = strategy(payload)?;
        tracing::debug!(strategy = name, "extract: result reference found");
        Some(found)
    })
}

/// Assistant text of a chat completion, if non-empty.
pub fn chat_reply(payload: &Value) -> Option<String> {
    message_content(payload)
        .filter(|c| !c.trim().is_empty())
        .map(str::to_string)
}

fn first_message(payload: &Value) -> Option<&Value> {
    payload.get("choices")?.get(0)?.get("message")
}

fn message_content(payload: &Value) -> Option<&str> {
    first_message(payload)?.get("content")?.as_str()
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn from_message_images(payload: &Value) -> Option<String> {
    let image = first_message(payload)?.get("images")?.get(0)?;
    image
        .get("url")
        .and_then(Value::as_str)
        .or_else(|| image.get("image_url")?.get("url")?.as_str())
        .and_then(non_empty)
}

fn from_data_array(payload: &Value) -> Option<String> {
    payload
        .get("data")?
        .get(0)?
        .get("url")?
        .as_str()
        .and_then(non_empty)
}

fn from_content_image_url(payload: &Value) -> Option<String> {
    let content = message_content(payload)?;
    IMAGE_URL.find(content).map(|m| m.as_str().to_string())
}

fn from_content_any_url(payload: &Value) -> Option<String> {
    let content = message_content(payload)?;
    ANY_URL
        .find(content)
        .map(|m| m.as_str().replace(['(', ')'], ""))
}
