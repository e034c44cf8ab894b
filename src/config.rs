use std::env;

pub const DEFAULT_IMAGE_MODEL: &str = "black-forest-labs/flux.2-max";
pub const DEFAULT_CHAT_MODEL: &str = "google/gemini-2.0-flash-exp:free";
pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub cors_origins: Vec<String>,
    pub max_payload_bytes: usize,
    pub openrouter_api_key: Option<String>,
    pub openrouter_url: String,
    pub image_model: String,
    pub chat_model: String,
    pub public_url: Option<String>,
    pub identity_jwt_secret: Option<String>,
    pub identity_issuer: Option<String>,
    pub identity_audience: Option<String>,
    pub bootstrap_admins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:tech-image.db".to_string()),
            cors_origins: split_list(
                &env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            ),
            max_payload_bytes: env::var("MAX_PAYLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10 * 1024 * 1024), // 10 MB, avatars arrive as data URLs
            openrouter_api_key: non_empty_var("OPENROUTER_API_KEY"),
            openrouter_url: env::var("OPENROUTER_URL")
                .unwrap_or_else(|_| DEFAULT_OPENROUTER_URL.to_string()),
            image_model: env::var("IMAGE_MODEL")
                .unwrap_or_else(|_| DEFAULT_IMAGE_MODEL.to_string()),
            chat_model: env::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string()),
            public_url: non_empty_var("PUBLIC_URL"),
            identity_jwt_secret: non_empty_var("IDENTITY_JWT_SECRET"),
            identity_issuer: non_empty_var("IDENTITY_ISSUER"),
            identity_audience: non_empty_var("IDENTITY_AUDIENCE"),
            bootstrap_admins: split_list(&env::var("BOOTSTRAP_ADMINS").unwrap_or_default()),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Split a comma-separated value, dropping blank items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_trims_and_skips_blanks() {
        assert_eq!(
            split_list(" http://a.test, ,http://b.test ,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn test_split_list_empty() {
        assert!(split_list("").is_empty());
    }
}
