//! Metrics sink and in-process registry
//!
//! 컴포넌트는 생성 시 `MetricsSink`를 주입받아 이름 기반 핸들(`Counter`, `Gauge`,
//! `Histogram`)을 얻습니다. 전역 레지스트리는 없습니다. 핸들은 atomic 으로
//! 구현되어 있어 복제 후 어느 태스크에서든 락 없이 갱신할 수 있습니다.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const DEFAULT_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Named metric handle factory
pub trait MetricsSink: Send + Sync {
    fn counter(&self, name: &str, help: &str) -> Counter;
    fn gauge(&self, name: &str, help: &str) -> Gauge;
    fn histogram(&self, name: &str, help: &str, buckets: &[f64]) -> Histogram;
}

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// f64 값을 비트로 저장하는 게이지
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    bits: Arc<AtomicU64>,
}

impl Gauge {
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn add(&self, delta: f64) {
        let _ = self.bits.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            Some((f64::from_bits(bits) + delta).to_bits())
        });
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct HistogramInner {
    bounds: Vec<f64>,
    /// 누적 카운트 (value <= bound)
    bucket_counts: Vec<AtomicU64>,
    sum_bits: AtomicU64,
    count: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct Histogram {
    inner: Arc<HistogramInner>,
}

impl Histogram {
    fn with_buckets(buckets: &[f64]) -> Self {
        let mut bounds: Vec<f64> = buckets.iter().copied().filter(|b| b.is_finite()).collect();
        bounds.sort_by(|a, b| a.total_cmp(b));
        bounds.dedup();
        let bucket_counts = bounds.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            inner: Arc::new(HistogramInner {
                bounds,
                bucket_counts,
                sum_bits: AtomicU64::new(0f64.to_bits()),
                count: AtomicU64::new(0),
            }),
        }
    }

    pub fn observe(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        for (bound, counter) in self.inner.bounds.iter().zip(&self.inner.bucket_counts) {
            if value <= *bound {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
        let _ = self.inner.sum_bits.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            Some((f64::from_bits(bits) + value).to_bits())
        });
        self.inner.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.inner.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> f64 {
        f64::from_bits(self.inner.sum_bits.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            buckets: self
                .inner
                .bounds
                .iter()
                .zip(&self.inner.bucket_counts)
                .map(|(bound, count)| (*bound, count.load(Ordering::Relaxed)))
                .collect(),
            sum: self.sum(),
            count: self.count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistogramSnapshot {
    pub buckets: Vec<(f64, u64)>,
    pub sum: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

#[derive(Debug, Clone)]
enum Metric {
    Counter(Counter),
    Gauge(Gauge),
    Histogram(Histogram),
}

#[derive(Debug, Clone)]
struct Registered {
    help: String,
    metric: Metric,
}

/// DashMap 기반 메트릭 레지스트리
///
/// 같은 이름으로 다시 요청하면 기존 핸들을 돌려줍니다. 다른 종류로 이미 등록된
/// 이름을 요청하면 등록되지 않은 별도 핸들이 반환되고 경고가 남습니다.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    metrics: DashMap<String, Registered>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::default();
        for entry in self.metrics.iter() {
            let name = entry.key().clone();
            match &entry.value().metric {
                Metric::Counter(c) => {
                    snapshot.counters.insert(name, c.get());
                }
                Metric::Gauge(g) => {
                    snapshot.gauges.insert(name, g.get());
                }
                Metric::Histogram(h) => {
                    snapshot.histograms.insert(name, h.snapshot());
                }
            }
        }
        snapshot
    }

    /// Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        let mut entries: Vec<(String, Registered)> = self
            .metrics
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = String::new();
        for (name, registered) in entries {
            let _ = writeln!(out, "# HELP {} {}", name, registered.help);
            match registered.metric {
                Metric::Counter(c) => {
                    let _ = writeln!(out, "# TYPE {} counter", name);
                    let _ = writeln!(out, "{} {}", name, c.get());
                }
                Metric::Gauge(g) => {
                    let _ = writeln!(out, "# TYPE {} gauge", name);
                    let _ = writeln!(out, "{} {}", name, g.get());
                }
                Metric::Histogram(h) => {
                    let snap = h.snapshot();
                    let _ = writeln!(out, "# TYPE {} histogram", name);
                    for (bound, count) in &snap.buckets {
                        let _ = writeln!(out, "{}_bucket{{le=\"{}\"}} {}", name, bound, count);
                    }
                    let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, snap.count);
                    let _ = writeln!(out, "{}_sum {}", name, snap.sum);
                    let _ = writeln!(out, "{}_count {}", name, snap.count);
                }
            }
        }
        out
    }

    fn get_or_register(&self, name: &str, help: &str, make: impl FnOnce() -> Metric) -> Metric {
        self.metrics
            .entry(name.to_string())
            .or_insert_with(|| Registered { help: help.to_string(), metric: make() })
            .metric
            .clone()
    }
}

impl MetricsSink for MetricsRegistry {
    fn counter(&self, name: &str, help: &str) -> Counter {
        match self.get_or_register(name, help, || Metric::Counter(Counter::default())) {
            Metric::Counter(c) => c,
            _ => {
                tracing::warn!("⚠️ 메트릭 종류 충돌: {} (counter 요청)", name);
                Counter::default()
            }
        }
    }

    fn gauge(&self, name: &str, help: &str) -> Gauge {
        match self.get_or_register(name, help, || Metric::Gauge(Gauge::default())) {
            Metric::Gauge(g) => g,
            _ => {
                tracing::warn!("⚠️ 메트릭 종류 충돌: {} (gauge 요청)", name);
                Gauge::default()
            }
        }
    }

    fn histogram(&self, name: &str, help: &str, buckets: &[f64]) -> Histogram {
        match self.get_or_register(name, help, || Metric::Histogram(Histogram::with_buckets(buckets))) {
            Metric::Histogram(h) => h,
            _ => {
                tracing::warn!("⚠️ 메트릭 종류 충돌: {} (histogram 요청)", name);
                Histogram::with_buckets(buckets)
            }
        }
    }
}
