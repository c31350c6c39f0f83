use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

use super::analysis_generator::GenerationError;
use super::retry_advisor::is_rate_limit_error;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Black-box text generation service
pub trait ModelClient {
    /// Sends one prompt and returns the raw response text.
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Name used to partition the response cache.
    fn model_name(&self) -> &str;
}

/// Model name plus sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
        }
    }
}

/// Google Gemini `generateContent` over blocking HTTP
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    settings: GenerationSettings,
}

impl GeminiClient {
    pub fn new(api_key: String, settings: GenerationSettings) -> Result<Self, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::MissingApiKey);
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GenerationError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_API_BASE.to_string(),
            settings,
        })
    }

    /// Reads `GOOGLE_API_KEY` and the optional `BIOLOG_API_BASE` override.
    pub fn from_env(settings: GenerationSettings) -> Result<Self, GenerationError> {
        let api_key = std::env::var("GOOGLE_API_KEY").map_err(|_| GenerationError::MissingApiKey)?;
        let client = Self::new(api_key, settings)?;
        Ok(match std::env::var("BIOLOG_API_BASE") {
            Ok(base) if !base.trim().is_empty() => client.with_base_url(base),
            _ => client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.settings.model)
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.settings.temperature,
                "topP": self.settings.top_p,
                "topK": self.settings.top_k,
                "maxOutputTokens": self.settings.max_output_tokens,
            }
        })
    }
}

impl ModelClient for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        tracing::debug!(model = %self.settings.model, prompt_len = prompt.len(), "calling generateContent");

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .map_err(|e| classify_failure(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| GenerationError::Transport(format!("failed to read response body: {}", e)))?;

        if status.as_u16() == 429 {
            return Err(GenerationError::RateLimited { message: body });
        }
        if !status.is_success() {
            return Err(classify_failure(format!("HTTP {}: {}", status, body)));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Transport(format!("invalid response JSON: {}", e)))?;
        candidate_text(&value).ok_or_else(|| {
            GenerationError::Transport("response contained no candidate text".to_string())
        })
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

fn classify_failure(message: String) -> GenerationError {
    if is_rate_limit_error(&message) {
        GenerationError::RateLimited { message }
    } else {
        GenerationError::Transport(message)
    }
}

/// Concatenated text parts of the first candidate.
fn candidate_text(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GeminiClient {
        GeminiClient::new("test-key".to_string(), GenerationSettings::default()).unwrap()
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let result = GeminiClient::new("  ".to_string(), GenerationSettings::default());
        assert!(matches!(result, Err(GenerationError::MissingApiKey)));
    }

    #[test]
    fn endpoint_uses_model_and_base_url() {
        let client = client().with_base_url("http://localhost:8080/v1/");
        assert_eq!(
            client.endpoint(),
            "http://localhost:8080/v1/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn request_body_carries_generation_config() {
        let body = client().request_body("hello");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn candidate_text_joins_parts() {
        let value = json!({
            "candidates": [{ "content": { "parts": [{ "text": "a" }, { "text": "b" }] } }]
        });
        assert_eq!(candidate_text(&value), Some("ab".to_string()));
        assert_eq!(candidate_text(&json!({ "candidates": [] })), None);
    }

    #[test]
    fn quota_messages_become_rate_limits() {
        assert!(matches!(
            classify_failure("RESOURCE_EXHAUSTED: retry in 3s".to_string()),
            GenerationError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_failure("connection reset".to_string()),
            GenerationError::Transport(_)
        ));
    }
}
