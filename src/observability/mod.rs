mod metrics;

pub use metrics::{InMemoryMetrics, MetricsSink};
