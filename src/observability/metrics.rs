use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Port: the counters the orchestrator records at each pipeline stage.
/// Kept synchronous since in-process counters never need to suspend.
pub trait MetricsSink: Send + Sync {
    fn record_query_request(&self, database: &str, success: bool);
    fn record_llm_call(&self, operation: &str, latency_secs: f64);
    fn record_sql_rejected(&self, reason: &str);
    fn record_db_query_duration(&self, secs: f64);
    fn record_query_duration(&self, secs: f64);
}

#[derive(Default)]
struct Counter {
    count: AtomicU64,
    sum_millis: AtomicU64,
}

impl Counter {
    fn observe(&self, secs: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_millis
            .fetch_add((secs * 1000.0).round() as u64, Ordering::Relaxed);
    }
}

/// In-process metrics sink built on atomics, sufficient for the monotonic
/// counter invariants in spec.md §8 without pulling in a metrics backend no
/// example in the pack depends on.
#[derive(Default)]
pub struct InMemoryMetrics {
    query_requests: RwLock<HashMap<(String, bool), u64>>,
    llm_calls: RwLock<HashMap<String, Counter>>,
    sql_rejected: RwLock<HashMap<String, u64>>,
    db_query_duration: Counter,
    query_duration: Counter,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query_requests_count(&self, database: &str, success: bool) -> u64 {
        *self
            .query_requests
            .read()
            .unwrap()
            .get(&(database.to_string(), success))
            .unwrap_or(&0)
    }

    pub fn llm_calls_count(&self, operation: &str) -> u64 {
        self.llm_calls
            .read()
            .unwrap()
            .get(operation)
            .map(|c| c.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn sql_rejected_count(&self, reason: &str) -> u64 {
        *self.sql_rejected.read().unwrap().get(reason).unwrap_or(&0)
    }

    pub fn db_query_duration_sum_secs(&self) -> f64 {
        self.db_query_duration.sum_millis.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn query_duration_sum_secs(&self) -> f64 {
        self.query_duration.sum_millis.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_query_request(&self, database: &str, success: bool) {
        let mut requests = self.query_requests.write().unwrap();
        *requests.entry((database.to_string(), success)).or_insert(0) += 1;
    }

    fn record_llm_call(&self, operation: &str, latency_secs: f64) {
        let mut calls = self.llm_calls.write().unwrap();
        calls
            .entry(operation.to_string())
            .or_insert_with(Counter::default)
            .observe(latency_secs);
    }

    fn record_sql_rejected(&self, reason: &str) {
        let mut rejected = self.sql_rejected.write().unwrap();
        *rejected.entry(reason.to_string()).or_insert(0) += 1;
    }

    fn record_db_query_duration(&self, secs: f64) {
        self.db_query_duration.observe(secs);
    }

    fn record_query_duration(&self, secs: f64) {
        self.query_duration.observe(secs);
    }
}
