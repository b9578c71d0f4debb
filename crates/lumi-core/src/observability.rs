//! Observability counters with Prometheus text exposition.
//!
//! Counters are keyed by label values. The label map sits behind an
//! `RwLock`; each value is an atomic, so concurrent increments of an
//! existing series only take the read lock.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Tag used when an embedding call is not tied to a tenant (query time).
pub const SYSTEM_TAG: &str = "system";

type LabelValues = Vec<String>;

fn label_key(values: &[&str]) -> LabelValues {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn render_labels(names: &[&str], values: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(n, v)| format!("{n}=\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

/// Monotonic counter family.
pub struct CounterVec {
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    series: RwLock<BTreeMap<LabelValues, AtomicU64>>,
}

impl CounterVec {
    pub fn new(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self { name, help, labels, series: RwLock::new(BTreeMap::new()) }
    }

    pub fn inc(&self, values: &[&str]) {
        self.inc_by(values, 1);
    }

    pub fn inc_by(&self, values: &[&str], n: u64) {
        let key = label_key(values);
        {
            let series = self.series.read().unwrap_or_else(|e| e.into_inner());
            if let Some(c) = series.get(&key) {
                c.fetch_add(n, Ordering::Relaxed);
                return;
            }
        }
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        series
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self, values: &[&str]) -> u64 {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        series
            .get(&label_key(values))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} counter", self.name);
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        for (values, c) in series.iter() {
            let _ = writeln!(
                out,
                "{}{} {}",
                self.name,
                render_labels(self.labels, values),
                c.load(Ordering::Relaxed)
            );
        }
    }
}

/// Up/down gauge family.
pub struct GaugeVec {
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    series: RwLock<BTreeMap<LabelValues, AtomicI64>>,
}

impl GaugeVec {
    pub fn new(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self { name, help, labels, series: RwLock::new(BTreeMap::new()) }
    }

    pub fn add(&self, values: &[&str], delta: i64) {
        let key = label_key(values);
        {
            let series = self.series.read().unwrap_or_else(|e| e.into_inner());
            if let Some(g) = series.get(&key) {
                g.fetch_add(delta, Ordering::Relaxed);
                return;
            }
        }
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        series
            .entry(key)
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self, values: &[&str]) -> i64 {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        series
            .get(&label_key(values))
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} gauge", self.name);
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        for (values, g) in series.iter() {
            let _ = writeln!(
                out,
                "{}{} {}",
                self.name,
                render_labels(self.labels, values),
                g.load(Ordering::Relaxed)
            );
        }
    }
}

/// Latency summary: observation count and total, in microseconds internally.
pub struct SummaryVec {
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    series: RwLock<BTreeMap<LabelValues, (AtomicU64, AtomicU64)>>,
}

impl SummaryVec {
    pub fn new(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self { name, help, labels, series: RwLock::new(BTreeMap::new()) }
    }

    pub fn observe(&self, values: &[&str], seconds: f64) {
        let micros = (seconds.max(0.0) * 1_000_000.0) as u64;
        let key = label_key(values);
        {
            let series = self.series.read().unwrap_or_else(|e| e.into_inner());
            if let Some((count, sum)) = series.get(&key) {
                count.fetch_add(1, Ordering::Relaxed);
                sum.fetch_add(micros, Ordering::Relaxed);
                return;
            }
        }
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        let (count, sum) = series
            .entry(key)
            .or_insert_with(|| (AtomicU64::new(0), AtomicU64::new(0)));
        count.fetch_add(1, Ordering::Relaxed);
        sum.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn count(&self, values: &[&str]) -> u64 {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        series
            .get(&label_key(values))
            .map(|(c, _)| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} summary", self.name);
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        for (values, (count, sum)) in series.iter() {
            let labels = render_labels(self.labels, values);
            let secs = sum.load(Ordering::Relaxed) as f64 / 1_000_000.0;
            let _ = writeln!(out, "{}_sum{} {}", self.name, labels, secs);
            let _ = writeln!(out, "{}_count{} {}", self.name, labels, count.load(Ordering::Relaxed));
        }
    }
}

/// Process-wide metrics registry.
///
/// Built once at startup and shared as `Arc<Metrics>`; there is no global.
pub struct Metrics {
    pub http_requests: CounterVec,
    pub http_errors: CounterVec,
    pub http_active: GaugeVec,
    pub http_duration: SummaryVec,
    pub tenant_requests: CounterVec,
    pub embedding_generations: CounterVec,
    pub embedding_errors: CounterVec,
    pub rag_queries: CounterVec,
    pub rag_query_errors: CounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            http_requests: CounterVec::new(
                "http_requests_total",
                "Total count of requests",
                &["method", "endpoint", "status"],
            ),
            http_errors: CounterVec::new(
                "http_request_errors_total",
                "Total count of errors",
                &["method", "endpoint"],
            ),
            http_active: GaugeVec::new(
                "http_requests_active",
                "Active requests",
                &["method", "endpoint"],
            ),
            http_duration: SummaryVec::new(
                "http_request_duration_seconds",
                "Request latency in seconds",
                &["method", "endpoint"],
            ),
            tenant_requests: CounterVec::new(
                "tenant_requests_total",
                "Total count of requests per tenant",
                &["tenant_id", "endpoint"],
            ),
            embedding_generations: CounterVec::new(
                "embedding_generation_total",
                "Total count of embedding generations",
                &["tenant_id"],
            ),
            embedding_errors: CounterVec::new(
                "embedding_generation_errors_total",
                "Total count of embedding generation errors",
                &["tenant_id"],
            ),
            rag_queries: CounterVec::new(
                "rag_query_total",
                "Total count of RAG queries",
                &["tenant_id"],
            ),
            rag_query_errors: CounterVec::new(
                "rag_query_errors_total",
                "Total count of RAG query errors",
                &["tenant_id"],
            ),
        }
    }

    /// One embedding call finished. `tag` is a tenant id or [`SYSTEM_TAG`].
    pub fn track_embedding(&self, tag: &str, success: bool) {
        self.embedding_generations.inc(&[tag]);
        if success {
            tracing::debug!("Embedding generation succeeded for tenant: {tag}");
        } else {
            self.embedding_errors.inc(&[tag]);
            tracing::warn!("Embedding generation failed for tenant: {tag}");
        }
    }

    pub fn track_rag_attempt(&self, tenant_id: &str) {
        self.rag_queries.inc(&[tenant_id]);
    }

    pub fn track_rag_failure(&self, tenant_id: &str) {
        self.rag_query_errors.inc(&[tenant_id]);
        tracing::warn!("RAG query failed for tenant: {tenant_id}");
    }

    /// Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.http_requests.render(&mut out);
        self.http_errors.render(&mut out);
        self.http_active.render(&mut out);
        self.http_duration.render(&mut out);
        self.tenant_requests.render(&mut out);
        self.embedding_generations.render(&mut out);
        self.embedding_errors.render(&mut out);
        self.rag_queries.render(&mut out);
        self.rag_query_errors.render(&mut out);
        out
    }
}
