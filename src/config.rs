use serde::{Deserialize, Serialize};

/// Retry/backoff/circuit-breaker knobs for `QueryOrchestrator`.
///
/// Defaults mirror the literal values exercised in the original test suite
/// (`ResilienceConfig()` bare constructions in `test_resilience_integration.py`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub backoff_factor: f64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout_secs: f64,
    pub query_limit: usize,
    pub llm_limit: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        ResilienceConfig {
            max_retries: 2,
            retry_delay_secs: 0.5,
            backoff_factor: 2.0,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_secs: 60.0,
            query_limit: 10,
            llm_limit: 5,
        }
    }
}

/// SQL validator policy: deny-lists and per-database overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub blocked_functions: Vec<String>,
    pub blocked_keywords: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            blocked_functions: vec![
                "pg_sleep".to_string(),
                "pg_read_file".to_string(),
                "pg_read_binary_file".to_string(),
                "pg_ls_dir".to_string(),
                "dblink".to_string(),
                "dblink_connect".to_string(),
                "lo_import".to_string(),
                "lo_export".to_string(),
                "copy".to_string(),
            ],
            blocked_keywords: vec![
                "DROP".to_string(),
                "CREATE".to_string(),
                "ALTER".to_string(),
                "TRUNCATE".to_string(),
                "INSERT".to_string(),
                "UPDATE".to_string(),
                "DELETE".to_string(),
                "GRANT".to_string(),
                "REVOKE".to_string(),
            ],
        }
    }
}

/// Result-validation knobs: sampling size and acceptance threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub enabled: bool,
    pub sample_rows: usize,
    pub confidence_threshold: u8,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            enabled: true,
            sample_rows: 10,
            confidence_threshold: 70,
        }
    }
}

/// Gemini-backed LLM client configuration, shared by the default
/// `SQLGenerator` and `ResultValidator` port implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub timeout_secs: f64,
    pub api_base: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
            timeout_secs: 30.0,
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}
