use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The stable error taxonomy for the orchestration engine.
///
/// Every variant carries a stable `code()` tag (mirrored in `ErrorInfo::code`)
/// and a `retryable()` verdict, which is the single match site the retry loop
/// in `QueryOrchestrator::execute_query` consults.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum EngineError {
    #[error("Database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("No database specified and multiple databases are configured")]
    DatabaseRequired,

    #[error("Schema unavailable for database '{0}'")]
    SchemaUnavailable(String),

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    #[error("SQL parse error: {0}")]
    SqlParseError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("LLM request timed out: {0}")]
    LlmTimeout(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("Circuit breaker is open: {0}")]
    CircuitBreakerOpen(String),

    #[error("Database error: {0}")]
    DbError(String),

    #[error("Database connection error: {0}")]
    DbConnectionError(String),
}

impl EngineError {
    /// Stable tag surfaced as `ErrorInfo.code`.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::DatabaseNotFound(_) => "database_not_found",
            EngineError::DatabaseRequired => "database_required",
            EngineError::SchemaUnavailable(_) => "schema_unavailable",
            EngineError::SecurityViolation(_) => "security_violation",
            EngineError::SqlParseError(_) => "sql_parse_error",
            EngineError::LlmError(_) => "llm_error",
            EngineError::LlmTimeout(_) => "llm_timeout",
            EngineError::LlmUnavailable(_) => "llm_unavailable",
            EngineError::CircuitBreakerOpen(_) => "circuit_breaker_open",
            EngineError::DbError(_) => "db_error",
            EngineError::DbConnectionError(_) => "db_connection_error",
        }
    }

    /// Whether the retry loop should feed this error back to the generator
    /// as an `error_feedback` hint and try again. Rate-limit exhaustion,
    /// circuit-open, connection loss and schema/database errors surface
    /// immediately instead.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            EngineError::SecurityViolation(_)
                | EngineError::SqlParseError(_)
                | EngineError::DbError(_)
        )
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                EngineError::DbConnectionError(err.to_string())
            }
            _ => EngineError::DbError(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::LlmTimeout(err.to_string())
        } else if matches!(err.status().map(|s| s.as_u16()), Some(429) | Some(401)) {
            EngineError::LlmUnavailable(err.to_string())
        } else {
            EngineError::LlmError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::LlmError(format!("malformed JSON: {err}"))
    }
}

/// Error payload carried in a failed `QueryResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Map<String, serde_json::Value>>,
}

impl From<&EngineError> for ErrorInfo {
    fn from(err: &EngineError) -> Self {
        ErrorInfo {
            code: err.code().to_string(),
            message: err.to_string(),
            details: None,
        }
    }
}

impl From<EngineError> for ErrorInfo {
    fn from(err: EngineError) -> Self {
        ErrorInfo::from(&err)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
