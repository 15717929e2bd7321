use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::{GeminiConfig, ValidationConfig};
use crate::error::EngineError;
use crate::llm::{extract_json, GeminiClient};
use crate::models::ResultValidationResult;

/// Port: given the question, the SQL that was run, and a sample of the
/// result rows, judges whether the result actually answers the question.
#[async_trait]
pub trait ResultValidator: Send + Sync {
    async fn validate(
        &self,
        question: &str,
        sql: &str,
        rows: &[Map<String, Value>],
        row_count: usize,
    ) -> Result<ResultValidationResult, EngineError>;
}

/// Default Gemini-backed implementation, ported from
/// `pg_mcp.services.result_validator.ResultValidator`.
pub struct GeminiResultValidator {
    client: GeminiClient,
    config: ValidationConfig,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
}

impl GeminiResultValidator {
    pub fn new(gemini_config: GeminiConfig, config: ValidationConfig) -> Self {
        GeminiResultValidator {
            client: GeminiClient::new(gemini_config),
            config,
        }
    }

    fn system_instruction() -> &'static str {
        "You judge whether a SQL query result actually answers a natural \
         language question. Respond with strict JSON: \
         {\"confidence\": <0-100>, \"explanation\": <string>, \
         \"suggestion\": <string or null>}."
    }
}

#[async_trait]
impl ResultValidator for GeminiResultValidator {
    async fn validate(
        &self,
        question: &str,
        sql: &str,
        rows: &[Map<String, Value>],
        row_count: usize,
    ) -> Result<ResultValidationResult, EngineError> {
        if !self.config.enabled {
            return Ok(ResultValidationResult {
                confidence: 100,
                explanation: "result validation disabled".to_string(),
                suggestion: None,
                is_acceptable: true,
            });
        }

        let sample: Vec<&Map<String, Value>> =
            rows.iter().take(self.config.sample_rows).collect();
        let prompt = format!(
            "Question: {question}\nSQL: {sql}\nRow count: {row_count}\nSample rows: {}",
            serde_json::to_string(&sample).unwrap_or_default()
        );

        let response = self
            .client
            .generate(Self::system_instruction(), &prompt, 0.0, true)
            .await?;

        let json_text = extract_json(&response);
        let verdict: RawVerdict = match serde_json::from_str(&json_text) {
            Ok(v) => v,
            Err(e) => {
                return Ok(ResultValidationResult {
                    confidence: 60,
                    explanation: format!("Validation response parsing failed: {e}"),
                    suggestion: None,
                    is_acceptable: false,
                })
            }
        };

        let confidence = verdict
            .confidence
            .as_ref()
            .and_then(|v| v.as_i64())
            .unwrap_or(50)
            .clamp(0, 100) as u8;

        Ok(ResultValidationResult {
            is_acceptable: confidence >= self.config.confidence_threshold,
            confidence,
            explanation: verdict
                .explanation
                .unwrap_or_else(|| "no explanation provided".to_string()),
            suggestion: verdict.suggestion,
        })
    }
}
