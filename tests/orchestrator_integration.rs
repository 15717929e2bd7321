use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use pg_query_orchestrator::config::{ResilienceConfig, SecurityConfig, ValidationConfig};
use pg_query_orchestrator::error::EngineError;
use pg_query_orchestrator::models::{
    ColumnInfo, DatabaseSchema, QueryRequest, ResultValidationResult, ReturnType, TableInfo,
};
use pg_query_orchestrator::observability::{InMemoryMetrics, MetricsSink};
use pg_query_orchestrator::services::{ResultValidator, SchemaCache, SqlExecutor, SqlGenerator};
use pg_query_orchestrator::sql::SqlValidator;
use pg_query_orchestrator::QueryOrchestrator;

fn sample_schema(name: &str) -> DatabaseSchema {
    DatabaseSchema {
        database_name: name.to_string(),
        tables: vec![TableInfo {
            schema_name: "public".to_string(),
            table_name: "users".to_string(),
            columns: vec![ColumnInfo::new("id", "integer", false).primary_key()],
        }],
        version: "15.0".to_string(),
    }
}

struct FixedGenerator {
    sql: String,
    call_count: Arc<AtomicUsize>,
}

impl FixedGenerator {
    fn new(sql: impl Into<String>) -> Self {
        FixedGenerator {
            sql: sql.into(),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SqlGenerator for FixedGenerator {
    async fn generate(
        &self,
        _question: &str,
        _schema: &DatabaseSchema,
        _context: Option<&str>,
        _previous_attempt: Option<&str>,
        _error_feedback: Option<&str>,
    ) -> Result<String, EngineError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.sql.clone())
    }
}

/// Yields each SQL in `attempts` in order, one per call, then repeats the
/// last entry — mirrors the upstream test's "DELETE then SELECT" generator.
struct SequenceGenerator {
    attempts: Vec<String>,
    call_count: Arc<AtomicUsize>,
}

#[async_trait]
impl SqlGenerator for SequenceGenerator {
    async fn generate(
        &self,
        _question: &str,
        _schema: &DatabaseSchema,
        _context: Option<&str>,
        _previous_attempt: Option<&str>,
        _error_feedback: Option<&str>,
    ) -> Result<String, EngineError> {
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .attempts
            .get(idx)
            .cloned()
            .unwrap_or_else(|| self.attempts.last().unwrap().clone()))
    }
}

struct TaggedExecutor {
    tag: &'static str,
    called: Arc<AtomicUsize>,
}

#[async_trait]
impl SqlExecutor for TaggedExecutor {
    async fn execute(&self, _sql: &str) -> Result<(Vec<Map<String, Value>>, usize), EngineError> {
        self.called.fetch_add(1, Ordering::SeqCst);
        let mut row = Map::new();
        row.insert("src".to_string(), Value::String(self.tag.to_string()));
        Ok((vec![row], 1))
    }
}

struct AlwaysFailsExecutor;

#[async_trait]
impl SqlExecutor for AlwaysFailsExecutor {
    async fn execute(&self, _sql: &str) -> Result<(Vec<Map<String, Value>>, usize), EngineError> {
        Err(EngineError::DbError("connection reset".to_string()))
    }
}

struct PanicsIfCalledExecutor;

#[async_trait]
impl SqlExecutor for PanicsIfCalledExecutor {
    async fn execute(&self, _sql: &str) -> Result<(Vec<Map<String, Value>>, usize), EngineError> {
        panic!("executor must not be invoked for a return_type=SQL request");
    }
}

struct NoOpResultValidator;

#[async_trait]
impl ResultValidator for NoOpResultValidator {
    async fn validate(
        &self,
        _question: &str,
        _sql: &str,
        _rows: &[Map<String, Value>],
        _row_count: usize,
    ) -> Result<ResultValidationResult, EngineError> {
        Ok(ResultValidationResult {
            confidence: 100,
            explanation: "ok".to_string(),
            suggestion: None,
            is_acceptable: true,
        })
    }
}

struct StaticSchemaCache(HashMap<String, DatabaseSchema>);

#[async_trait]
impl SchemaCache for StaticSchemaCache {
    async fn get(&self, database: &str) -> Option<DatabaseSchema> {
        self.0.get(database).cloned()
    }
}

fn build_orchestrator(
    databases: Vec<&str>,
    generator: Arc<dyn SqlGenerator>,
    executors: HashMap<String, Arc<dyn SqlExecutor>>,
    resilience_config: ResilienceConfig,
) -> QueryOrchestrator {
    let mut validators = HashMap::new();
    let mut schemas = HashMap::new();
    for db in &databases {
        validators.insert(db.to_string(), SqlValidator::new(SecurityConfig::default()));
        schemas.insert(db.to_string(), sample_schema(db));
    }

    QueryOrchestrator::new(
        generator,
        validators,
        executors,
        Arc::new(NoOpResultValidator),
        Arc::new(StaticSchemaCache(schemas)),
        resilience_config,
        ValidationConfig {
            enabled: false,
            ..ValidationConfig::default()
        },
        Arc::new(InMemoryMetrics::new()),
    )
}

#[tokio::test]
async fn routes_query_to_the_requested_database() {
    let db1_calls = Arc::new(AtomicUsize::new(0));
    let db2_calls = Arc::new(AtomicUsize::new(0));
    let mut executors: HashMap<String, Arc<dyn SqlExecutor>> = HashMap::new();
    executors.insert(
        "db1".to_string(),
        Arc::new(TaggedExecutor {
            tag: "db1",
            called: db1_calls.clone(),
        }),
    );
    executors.insert(
        "db2".to_string(),
        Arc::new(TaggedExecutor {
            tag: "db2",
            called: db2_calls.clone(),
        }),
    );

    let orchestrator = build_orchestrator(
        vec!["db1", "db2"],
        Arc::new(FixedGenerator::new("SELECT * FROM users;")),
        executors,
        ResilienceConfig::default(),
    );

    let mut request = QueryRequest::new("Get all users");
    request.database = Some("db2".to_string());
    request.return_type = ReturnType::Result;

    let response = orchestrator.execute_query(request).await;

    assert!(response.success);
    assert_eq!(db2_calls.load(Ordering::SeqCst), 1);
    assert_eq!(db1_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn auto_selects_single_configured_database() {
    let mut executors: HashMap<String, Arc<dyn SqlExecutor>> = HashMap::new();
    executors.insert(
        "only_db".to_string(),
        Arc::new(TaggedExecutor {
            tag: "only_db",
            called: Arc::new(AtomicUsize::new(0)),
        }),
    );

    let orchestrator = build_orchestrator(
        vec!["only_db"],
        Arc::new(FixedGenerator::new("SELECT * FROM users;")),
        executors,
        ResilienceConfig::default(),
    );

    let mut request = QueryRequest::new("Get all users");
    request.return_type = ReturnType::Sql;
    let response = orchestrator.execute_query(request).await;

    assert!(response.success);
    assert!(response.generated_sql.is_some());
}

#[tokio::test]
async fn sql_only_request_never_reaches_the_executor() {
    let mut executors: HashMap<String, Arc<dyn SqlExecutor>> = HashMap::new();
    executors.insert("only_db".to_string(), Arc::new(PanicsIfCalledExecutor));

    let orchestrator = build_orchestrator(
        vec!["only_db"],
        Arc::new(FixedGenerator::new("SELECT * FROM users;")),
        executors,
        ResilienceConfig::default(),
    );

    let mut request = QueryRequest::new("Get all users");
    request.return_type = ReturnType::Sql;
    let response = orchestrator.execute_query(request).await;

    assert!(response.success);
    assert_eq!(response.generated_sql.as_deref(), Some("SELECT * FROM users;"));
    assert!(response.rows.is_none());
}

#[tokio::test]
async fn requires_explicit_database_when_multiple_are_configured() {
    let mut executors: HashMap<String, Arc<dyn SqlExecutor>> = HashMap::new();
    executors.insert(
        "db1".to_string(),
        Arc::new(TaggedExecutor {
            tag: "db1",
            called: Arc::new(AtomicUsize::new(0)),
        }),
    );
    executors.insert(
        "db2".to_string(),
        Arc::new(TaggedExecutor {
            tag: "db2",
            called: Arc::new(AtomicUsize::new(0)),
        }),
    );

    let orchestrator = build_orchestrator(
        vec!["db1", "db2"],
        Arc::new(FixedGenerator::new("SELECT * FROM users;")),
        executors,
        ResilienceConfig::default(),
    );

    let response = orchestrator.execute_query(QueryRequest::new("Get all users")).await;

    assert!(!response.success);
    let error = response.error.unwrap();
    assert!(error.message.to_lowercase().contains("multiple databases"));
}

#[tokio::test]
async fn nonexistent_database_is_reported() {
    let mut executors: HashMap<String, Arc<dyn SqlExecutor>> = HashMap::new();
    executors.insert(
        "db1".to_string(),
        Arc::new(TaggedExecutor {
            tag: "db1",
            called: Arc::new(AtomicUsize::new(0)),
        }),
    );

    let orchestrator = build_orchestrator(
        vec!["db1"],
        Arc::new(FixedGenerator::new("SELECT * FROM users;")),
        executors,
        ResilienceConfig::default(),
    );

    let mut request = QueryRequest::new("Get all users");
    request.database = Some("nonexistent".to_string());
    let response = orchestrator.execute_query(request).await;

    assert!(!response.success);
    assert!(response
        .error
        .unwrap()
        .message
        .to_lowercase()
        .contains("not found"));
}

#[tokio::test]
async fn per_database_security_isolation() {
    let mut validators = HashMap::new();
    validators.insert(
        "db1".to_string(),
        SqlValidator::new(SecurityConfig::default()).with_blocked_tables(vec!["secrets".to_string()]),
    );
    validators.insert(
        "db2".to_string(),
        SqlValidator::new(SecurityConfig::default()),
    );

    let mut schemas = HashMap::new();
    schemas.insert("db1".to_string(), sample_schema("db1"));
    schemas.insert("db2".to_string(), sample_schema("db2"));

    let mut executors: HashMap<String, Arc<dyn SqlExecutor>> = HashMap::new();
    executors.insert(
        "db1".to_string(),
        Arc::new(TaggedExecutor {
            tag: "db1",
            called: Arc::new(AtomicUsize::new(0)),
        }),
    );
    executors.insert(
        "db2".to_string(),
        Arc::new(TaggedExecutor {
            tag: "db2",
            called: Arc::new(AtomicUsize::new(0)),
        }),
    );

    let orchestrator = QueryOrchestrator::new(
        Arc::new(FixedGenerator::new("SELECT * FROM secrets;")),
        validators,
        executors,
        Arc::new(NoOpResultValidator),
        Arc::new(StaticSchemaCache(schemas)),
        ResilienceConfig {
            max_retries: 0,
            ..ResilienceConfig::default()
        },
        ValidationConfig {
            enabled: false,
            ..ValidationConfig::default()
        },
        Arc::new(InMemoryMetrics::new()),
    );

    let mut req_db1 = QueryRequest::new("Show secrets");
    req_db1.database = Some("db1".to_string());
    let resp_db1 = orchestrator.execute_query(req_db1).await;
    assert!(!resp_db1.success);
    assert_eq!(resp_db1.error.unwrap().code, "security_violation");

    let mut req_db2 = QueryRequest::new("Show secrets");
    req_db2.database = Some("db2".to_string());
    req_db2.return_type = ReturnType::Result;
    let resp_db2 = orchestrator.execute_query(req_db2).await;
    assert!(resp_db2.success);
}

#[tokio::test]
async fn retries_with_backoff_after_a_retryable_rejection() {
    let call_count = Arc::new(AtomicUsize::new(0));
    let generator = Arc::new(SequenceGenerator {
        attempts: vec!["DELETE FROM users;".to_string(), "SELECT * FROM users;".to_string()],
        call_count: call_count.clone(),
    });

    let mut executors: HashMap<String, Arc<dyn SqlExecutor>> = HashMap::new();
    executors.insert(
        "test_db".to_string(),
        Arc::new(TaggedExecutor {
            tag: "test_db",
            called: Arc::new(AtomicUsize::new(0)),
        }),
    );

    let orchestrator = build_orchestrator(
        vec!["test_db"],
        generator,
        executors,
        ResilienceConfig {
            max_retries: 2,
            retry_delay_secs: 0.1,
            backoff_factor: 2.0,
            ..ResilienceConfig::default()
        },
    );

    let started = std::time::Instant::now();
    let response = orchestrator
        .execute_query(QueryRequest::new("Remove stale users"))
        .await;
    let elapsed = started.elapsed();

    assert!(response.success);
    assert_eq!(call_count.load(Ordering::SeqCst), 2);
    assert!(elapsed >= Duration::from_millis(90));
}

#[tokio::test]
async fn circuit_breaker_opens_after_repeated_failures() {
    let mut executors: HashMap<String, Arc<dyn SqlExecutor>> = HashMap::new();
    executors.insert("test_db".to_string(), Arc::new(AlwaysFailsExecutor));

    let orchestrator = build_orchestrator(
        vec!["test_db"],
        Arc::new(FixedGenerator::new("SELECT * FROM users;")),
        executors,
        ResilienceConfig {
            max_retries: 0,
            circuit_breaker_threshold: 2,
            circuit_breaker_timeout_secs: 60.0,
            ..ResilienceConfig::default()
        },
    );

    for _ in 0..2 {
        let response = orchestrator
            .execute_query(QueryRequest::new("Get all users"))
            .await;
        assert!(!response.success);
    }

    let third = orchestrator
        .execute_query(QueryRequest::new("Get all users"))
        .await;
    assert!(!third.success);
    assert!(third
        .error
        .unwrap()
        .message
        .to_lowercase()
        .contains("circuit breaker"));
}
