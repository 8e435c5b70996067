pub mod metrics;

pub use metrics::{Counter, Gauge, Histogram, MetricsRegistry, MetricsSink, MetricsSnapshot, DEFAULT_BUCKETS};
