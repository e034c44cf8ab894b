use serde::{Deserialize, Serialize};

use super::chat::ChatSession;

/// Balance granted to an account the first time it is seen.
pub const STARTING_BALANCE: i64 = 5;
pub const HISTORY_LIMIT: i64 = 20;
pub const CHAT_SESSION_LIMIT: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Standard,
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Standard => "standard",
            Role::Administrator => "administrator",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "standard" => Ok(Role::Standard),
            "administrator" => Ok(Role::Administrator),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "enabled")]
    pub ai_training: bool,
    #[serde(default = "enabled")]
    pub notifications: bool,
}

fn enabled() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ai_training: true,
            notifications: true,
        }
    }
}

/// Account record as stored, without its history and chat sessions.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub uid: String,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub avatar: Option<String>,
    #[serde(rename = "username")]
    pub handle: Option<String>,
    #[serde(rename = "userType")]
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[serde(rename = "isBlocked")]
    pub blocked: bool,
    #[serde(rename = "credits")]
    pub balance: i64,
    #[sqlx(flatten)]
    pub settings: Settings,
    pub created_at: i64,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub prompt: String,
    #[serde(rename = "imageUrl")]
    pub result_ref: String,
    pub created_at: i64,
}

/// Optional profile values supplied by the client or the identity token.
#[derive(Debug, Clone, Default)]
pub struct ProfileHints {
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub avatar: Option<String>,
}

impl From<ProfileRequest> for ProfileHints {
    fn from(req: ProfileRequest) -> Self {
        Self {
            display_name: req.display_name,
            avatar: req.avatar,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountDocument {
    #[serde(flatten)]
    pub account: Account,
    pub history: Vec<HistoryEntry>,
    pub chats: Vec<ChatSession>,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user: AccountDocument,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: Account,
}

#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    pub settings: Settings,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub settings: Settings,
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub credits: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
    pub settings: Settings,
    pub credits: i64,
    pub username: Option<String>,
    pub user_type: Role,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub user_type: Role,
    pub username: Option<String>,
    pub is_blocked: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetHandleRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct SetHandleResponse {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct HandleAvailability {
    pub available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parses_stored_values() {
        assert_eq!(Role::try_from("standard".to_string()), Ok(Role::Standard));
        assert_eq!(
            Role::try_from("administrator".to_string()),
            Ok(Role::Administrator)
        );
        assert!(Role::try_from("root".to_string()).is_err());
    }

    #[test]
    fn test_settings_default_to_enabled_when_omitted() {
        let settings: Settings = serde_json::from_str(r#"{"aiTraining": false}"#).unwrap();
        assert!(!settings.ai_training);
        assert!(settings.notifications);
    }
}
