use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: Option<String>,
    /// Aspect ratio such as `16:9`.
    pub ratio: Option<String>,
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("Prompt is required".into());
        }
        if let Some(ratio) = &self.ratio {
            if !is_valid_ratio(ratio) {
                return Err(format!("Invalid aspect ratio '{ratio}'"));
            }
        }
        Ok(())
    }

    /// Prompt as sent upstream, carrying the aspect-ratio directive when present.
    pub fn upstream_prompt(&self) -> String {
        match self.ratio.as_deref().filter(|r| !r.is_empty()) {
            Some(ratio) => format!("{} --ar {ratio}", self.prompt),
            None => self.prompt.clone(),
        }
    }
}

fn is_valid_ratio(ratio: &str) -> bool {
    if ratio.is_empty() {
        return true;
    }
    let Some((w, h)) = ratio.split_once(':') else {
        return false;
    };
    let side_ok = |s: &str| (1..=3).contains(&s.len()) && s.chars().all(|c| c.is_ascii_digit());
    side_ok(w) && side_ok(h)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits: Option<i64>,
}
