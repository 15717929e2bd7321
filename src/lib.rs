//! Natural-language-to-SQL query orchestration engine for PostgreSQL.
//!
//! Sits between an LLM provider and one or more read-only PostgreSQL
//! pools: turns a question into SQL, validates it against a tree-walking
//! security gate, executes it, and optionally judges whether the result
//! actually answers the question — all behind rate limiting and a circuit
//! breaker so a failing database or LLM backend degrades gracefully
//! instead of cascading.

pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod resilience;
pub mod services;
pub mod sql;

pub use config::{GeminiConfig, ResilienceConfig, SecurityConfig, ValidationConfig};
pub use error::{EngineError, EngineResult, ErrorInfo};
pub use models::{
    ColumnInfo, DatabaseSchema, QueryRequest, QueryResponse, ResultValidationResult, ReturnType,
    TableInfo,
};
pub use orchestrator::QueryOrchestrator;
pub use resilience::{CircuitBreaker, CircuitState, MultiRateLimiter};
pub use services::{
    GeminiResultValidator, GeminiSqlGenerator, InMemorySchemaCache, PgSchemaCache, PgSqlExecutor,
    ResultValidator, SchemaCache, SqlExecutor, SqlGenerator,
};
pub use sql::SqlValidator;

/// Installs a `tracing` subscriber reading its filter from `RUST_LOG`,
/// defaulting to `info` when unset. Call once at process startup; the
/// engine itself never installs a global subscriber on its own.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
