use serde::{Deserialize, Serialize};

const MAX_SESSION_ID_LEN: usize = 128;
const MAX_TITLE_LEN: usize = 200;

/// One turn of a conversation, as exchanged with the chat provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn validate(&self) -> Result<(), String> {
        match self.role.as_str() {
            "user" | "assistant" => Ok(()),
            other => Err(format!("role must be 'user' or 'assistant', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    /// Set by the server when the session is saved.
    #[serde(default, rename = "timestamp")]
    pub updated_at: i64,
}

impl ChatSession {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() || self.id.len() > MAX_SESSION_ID_LEN {
            return Err(format!(
                "id length must be 1-{MAX_SESSION_ID_LEN}, got {}",
                self.id.len()
            ));
        }
        if self.title.len() > MAX_TITLE_LEN {
            return Err(format!("title must be at most {MAX_TITLE_LEN} bytes"));
        }
        self.messages.iter().try_for_each(ChatTurn::validate)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveSessionRequest {
    pub session: ChatSession,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub chats: Vec<ChatSession>,
}
