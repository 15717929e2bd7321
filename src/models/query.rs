use serde::{Deserialize, Serialize};

use crate::error::ErrorInfo;

/// What shape the caller wants back from `execute_query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    Sql,
    Result,
    Both,
}

/// A natural-language question bound for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_return_type")]
    pub return_type: ReturnType,
    #[serde(default)]
    pub context: Option<String>,
}

fn default_return_type() -> ReturnType {
    ReturnType::Both
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        QueryRequest {
            question: question.into(),
            database: None,
            return_type: ReturnType::Both,
            context: None,
        }
    }
}

/// Verdict from the `ResultValidator` port on whether a result set actually
/// answers the original question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultValidationResult {
    pub confidence: u8,
    pub explanation: String,
    pub suggestion: Option<String>,
    pub is_acceptable: bool,
}

/// Outcome of `QueryOrchestrator::execute_query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub generated_sql: Option<String>,
    pub rows: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
    pub row_count: Option<usize>,
    pub validation: Option<ResultValidationResult>,
    pub error: Option<ErrorInfo>,
    pub attempts: u32,
}

impl QueryResponse {
    pub fn failure(error: ErrorInfo, attempts: u32) -> Self {
        QueryResponse {
            success: false,
            generated_sql: None,
            rows: None,
            row_count: None,
            validation: None,
            error: Some(error),
            attempts,
        }
    }
}
