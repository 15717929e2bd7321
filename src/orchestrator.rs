use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::config::{ResilienceConfig, ValidationConfig};
use crate::error::{EngineError, ErrorInfo};
use crate::models::{QueryRequest, QueryResponse, ReturnType};
use crate::observability::MetricsSink;
use crate::resilience::{CircuitBreaker, MultiRateLimiter};
use crate::services::{ResultValidator, SchemaCache, SqlExecutor, SqlGenerator};
use crate::sql::SqlValidator;

/// The central pipeline: routes a request to a database, generates SQL,
/// validates it, executes it, retries on retryable failure with backoff,
/// and optionally judges whether the result answers the question.
pub struct QueryOrchestrator {
    sql_generator: Arc<dyn SqlGenerator>,
    sql_validators: HashMap<String, SqlValidator>,
    sql_executors: HashMap<String, Arc<dyn SqlExecutor>>,
    result_validator: Arc<dyn ResultValidator>,
    schema_cache: Arc<dyn SchemaCache>,
    resilience_config: ResilienceConfig,
    validation_config: ValidationConfig,
    rate_limiter: MultiRateLimiter,
    pub circuit_breaker: CircuitBreaker,
    metrics: Arc<dyn MetricsSink>,
}

impl QueryOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sql_generator: Arc<dyn SqlGenerator>,
        sql_validators: HashMap<String, SqlValidator>,
        sql_executors: HashMap<String, Arc<dyn SqlExecutor>>,
        result_validator: Arc<dyn ResultValidator>,
        schema_cache: Arc<dyn SchemaCache>,
        resilience_config: ResilienceConfig,
        validation_config: ValidationConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let rate_limiter =
            MultiRateLimiter::new(resilience_config.query_limit, resilience_config.llm_limit);
        let circuit_breaker = CircuitBreaker::new(
            resilience_config.circuit_breaker_threshold,
            Duration::from_secs_f64(resilience_config.circuit_breaker_timeout_secs),
        );
        QueryOrchestrator {
            sql_generator,
            sql_validators,
            sql_executors,
            result_validator,
            schema_cache,
            resilience_config,
            validation_config,
            rate_limiter,
            circuit_breaker,
            metrics,
        }
    }

    pub fn rate_limiter_stats(&self) -> HashMap<String, crate::resilience::BucketStats> {
        self.rate_limiter.get_all_stats()
    }

    fn resolve_database(&self, requested: Option<&str>) -> Result<String, EngineError> {
        match requested {
            Some(name) => {
                if self.sql_executors.contains_key(name) {
                    Ok(name.to_string())
                } else {
                    Err(EngineError::DatabaseNotFound(name.to_string()))
                }
            }
            None => {
                if self.sql_executors.len() == 1 {
                    Ok(self.sql_executors.keys().next().unwrap().clone())
                } else {
                    Err(EngineError::DatabaseRequired)
                }
            }
        }
    }

    pub async fn execute_query(&self, request: QueryRequest) -> QueryResponse {
        let pipeline_start = Instant::now();

        let database = match self.resolve_database(request.database.as_deref()) {
            Ok(db) => db,
            Err(e) => {
                self.metrics.record_query_request("unknown", false);
                return QueryResponse::failure(ErrorInfo::from(e), 0);
            }
        };

        if let Err(e) = self.circuit_breaker.check() {
            warn!(database = %database, "circuit breaker rejected request");
            self.metrics.record_query_request(&database, false);
            return QueryResponse::failure(ErrorInfo::from(e), 0);
        }

        let schema = match self.schema_cache.get(&database).await {
            Some(schema) => schema,
            None => {
                self.metrics.record_query_request(&database, false);
                return QueryResponse::failure(
                    ErrorInfo::from(EngineError::SchemaUnavailable(database.clone())),
                    0,
                );
            }
        };

        let validator = match self.sql_validators.get(&database) {
            Some(v) => v,
            None => {
                self.metrics.record_query_request(&database, false);
                return QueryResponse::failure(
                    ErrorInfo::from(EngineError::DatabaseNotFound(database.clone())),
                    0,
                );
            }
        };
        let executor = self.sql_executors.get(&database).unwrap();

        let mut attempts: u32 = 0;
        let mut previous_attempt: Option<String> = None;
        let mut error_feedback: Option<String> = None;
        let mut last_error: Option<EngineError> = None;
        let mut outcome: Option<(String, Vec<serde_json::Map<String, serde_json::Value>>, usize)> =
            None;

        while attempts <= self.resilience_config.max_retries {
            attempts += 1;

            let sql = {
                let _permit = self.rate_limiter.acquire_llm().await;
                let llm_start = Instant::now();
                let result = self
                    .sql_generator
                    .generate(
                        &request.question,
                        &schema,
                        request.context.as_deref(),
                        previous_attempt.as_deref(),
                        error_feedback.as_deref(),
                    )
                    .await;
                self.metrics
                    .record_llm_call("generate_sql", llm_start.elapsed().as_secs_f64());
                match result {
                    Ok(sql) => {
                        self.circuit_breaker.record_success();
                        sql
                    }
                    Err(e) => {
                        error!(database = %database, error = %e, "SQL generation failed");
                        self.circuit_breaker.record_failure();
                        last_error = Some(e);
                        break;
                    }
                }
            };

            if let Err(e) = validator.validate(&sql) {
                debug!(database = %database, attempt = attempts, error = %e, "generated SQL rejected");
                self.metrics.record_sql_rejected("validation_failed");
                if e.retryable() && attempts <= self.resilience_config.max_retries {
                    previous_attempt = Some(sql);
                    error_feedback = Some(e.to_string());
                    last_error = Some(e);
                    self.backoff_sleep(attempts).await;
                    continue;
                }
                last_error = Some(e);
                break;
            }

            if request.return_type == ReturnType::Sql {
                self.metrics
                    .record_query_duration(pipeline_start.elapsed().as_secs_f64());
                self.metrics.record_query_request(&database, true);
                return QueryResponse {
                    success: true,
                    generated_sql: Some(sql),
                    rows: None,
                    row_count: None,
                    validation: None,
                    error: None,
                    attempts,
                };
            }

            let exec_start = Instant::now();
            let execution = {
                let _permit = self.rate_limiter.acquire_query().await;
                executor.execute(&sql).await
            };
            self.metrics
                .record_db_query_duration(exec_start.elapsed().as_secs_f64());

            match execution {
                Ok((rows, row_count)) => {
                    outcome = Some((sql, rows, row_count));
                    break;
                }
                Err(e) => {
                    warn!(database = %database, attempt = attempts, error = %e, "query execution failed");
                    if e.retryable() && attempts <= self.resilience_config.max_retries {
                        previous_attempt = Some(sql);
                        error_feedback = Some(e.to_string());
                        last_error = Some(e);
                        self.backoff_sleep(attempts).await;
                        continue;
                    }
                    last_error = Some(e);
                    break;
                }
            }
        }

        self.metrics
            .record_query_duration(pipeline_start.elapsed().as_secs_f64());

        let Some((sql, rows, row_count)) = outcome else {
            self.metrics.record_query_request(&database, false);
            let error = last_error.unwrap_or(EngineError::DbError("query failed".to_string()));
            return QueryResponse::failure(ErrorInfo::from(error), attempts);
        };

        self.metrics.record_query_request(&database, true);

        let validation = if self.validation_config.enabled {
            match self
                .result_validator
                .validate(&request.question, &sql, &rows, row_count)
                .await
            {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(database = %database, error = %e, "result validation call failed");
                    None
                }
            }
        } else {
            None
        };

        let generated_sql = matches!(request.return_type, ReturnType::Sql | ReturnType::Both)
            .then(|| sql.clone());
        let (rows, row_count) = if matches!(request.return_type, ReturnType::Result | ReturnType::Both)
        {
            (Some(rows), Some(row_count))
        } else {
            (None, None)
        };

        QueryResponse {
            success: true,
            generated_sql,
            rows,
            row_count,
            validation,
            error: None,
            attempts,
        }
    }

    async fn backoff_sleep(&self, attempt: u32) {
        let delay = self.resilience_config.retry_delay_secs
            * self.resilience_config.backoff_factor.powi(attempt as i32 - 1);
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
    }
}
