use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::GeminiConfig;
use crate::error::EngineError;

/// Thin wrapper over the Gemini `generateContent` REST endpoint, in the
/// same client-wrapper shape as the teacher's `OpenRouterClient`.
pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: String,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(config.timeout_secs))
            .build()
            .expect("reqwest client builds with valid config");
        GeminiClient { http, config }
    }

    /// Sends `prompt` with the given `temperature`, optionally asking for a
    /// strict JSON response (used by the result validator), and returns the
    /// first candidate's text.
    pub async fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
        temperature: f64,
        json_mode: bool,
    ) -> Result<String, EngineError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.api_base, self.config.model, self.config.api_key
        );

        let mut generation_config = json!({ "temperature": temperature });
        if json_mode {
            generation_config["response_mime_type"] = json!("application/json");
        }

        let body = json!({
            "system_instruction": { "parts": [{ "text": system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        });

        let response = self.http.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(if status.as_u16() == 429 || status.as_u16() == 401 {
                EngineError::LlmUnavailable(format!("{status}: {text}"))
            } else {
                EngineError::LlmError(format!("{status}: {text}"))
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| EngineError::LlmError("empty response from Gemini".to_string()))
    }
}
