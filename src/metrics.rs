//! Process metrics for analyses, the response cache and stream runs.
//!
//! Instruments live in a prometheus [`Registry`], so [`Metrics::render`] can hand
//! the standard text exposition to any scraper. Timed operations also keep a
//! bounded window of recent samples, which is what [`TimerStats`] percentiles and
//! the [`PerformanceReport`] are computed from.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use prometheus::proto::{LabelPair, MetricType};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::analysis::AnalysisResult;
use crate::config::MetricsConfig;

/// Operation name for direct analyzer calls.
pub const OP_ANALYZE: &str = "analyze";
/// Operation name for completed stream runs.
pub const OP_STREAM: &str = "stream";

const ANALYSIS_OPERATIONS: [&str; 2] = [OP_ANALYZE, OP_STREAM];
const REPORT_TOP: usize = 5;

/// Counter, gauge and histogram instruments plus timer sample windows.
pub struct Metrics {
    config: MetricsConfig,
    enabled: AtomicBool,
    registry: Registry,
    analyses: IntCounter,
    errors: IntCounterVec,
    emotions: IntCounterVec,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    cache_evictions: IntCounter,
    cache_entries: IntGauge,
    cache_size_bytes: IntGauge,
    active_streams: IntGauge,
    stream_chunks: IntCounterVec,
    durations: HistogramVec,
    samples: Mutex<Samples>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("config", &self.config)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Series {
    Error,
    Emotion,
    Chunk,
}

struct Samples {
    started: DateTime<Utc>,
    timers: HashMap<String, VecDeque<(DateTime<Utc>, f64)>>,
    /// Last update of each labeled series, for retention cleanup.
    touched: HashMap<(Series, String), DateTime<Utc>>,
}

impl Samples {
    fn new() -> Self {
        Self {
            started: Utc::now(),
            timers: HashMap::new(),
            touched: HashMap::new(),
        }
    }
}

/// A running timer from [`Metrics::start_timer`].
#[derive(Debug)]
pub struct Timer {
    operation: String,
    started: Instant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketCount {
    /// Upper bound of the bucket, in milliseconds.
    pub le: f64,
    /// Observations at or below `le`.
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramStats {
    pub count: u64,
    pub sum: f64,
    pub buckets: Vec<BucketCount>,
}

/// Point-in-time view of every instrument. Keys are `name` or
/// `name{label=value,...}` with labels sorted by name.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, i64>,
    pub histograms: BTreeMap<String, HistogramStats>,
    pub timers: BTreeMap<String, TimerStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionCount {
    pub emotion: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationTiming {
    pub operation: String,
    pub max_ms: f64,
    pub avg_ms: f64,
}

/// Summary of analysis throughput and quality since the last reset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub period: ReportPeriod,
    pub total_analyses: u64,
    pub avg_processing_ms: f64,
    pub p95_processing_ms: f64,
    pub cache_hit_rate: f64,
    pub error_rate: f64,
    pub throughput_per_minute: f64,
    pub top_emotions: Vec<EmotionCount>,
    pub slowest_operations: Vec<OperationTiming>,
}

impl Metrics {
    pub fn new(config: MetricsConfig) -> Result<Self> {
        let registry = Registry::new();

        let analyses = IntCounter::new("augur_analyses_total", "Completed analyses")?;
        let errors = IntCounterVec::new(
            Opts::new("augur_errors_total", "Failed analyses by error code"),
            &["code"],
        )?;
        let emotions = IntCounterVec::new(
            Opts::new("augur_emotions_total", "Detected emotions across analyses"),
            &["emotion"],
        )?;
        let cache_hits = IntCounter::new("augur_cache_hits_total", "Response cache hits")?;
        let cache_misses = IntCounter::new("augur_cache_misses_total", "Response cache misses")?;
        let cache_evictions =
            IntCounter::new("augur_cache_evictions_total", "Response cache evictions")?;
        let cache_entries = IntGauge::new("augur_cache_entries", "Live response cache entries")?;
        let cache_size_bytes =
            IntGauge::new("augur_cache_size_bytes", "Estimated response cache size")?;
        let active_streams = IntGauge::new("augur_active_streams", "Stream runs in progress")?;
        let stream_chunks = IntCounterVec::new(
            Opts::new("augur_stream_chunks_total", "Emitted stream chunks by kind"),
            &["kind"],
        )?;
        let durations = HistogramVec::new(
            HistogramOpts::new("augur_operation_duration_ms", "Operation durations")
                .buckets(config.histogram_buckets.clone()),
            &["operation"],
        )
        .context("invalid histogram buckets")?;

        registry.register(Box::new(analyses.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(emotions.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(cache_evictions.clone()))?;
        registry.register(Box::new(cache_entries.clone()))?;
        registry.register(Box::new(cache_size_bytes.clone()))?;
        registry.register(Box::new(active_streams.clone()))?;
        registry.register(Box::new(stream_chunks.clone()))?;
        registry.register(Box::new(durations.clone()))?;

        Ok(Self {
            enabled: AtomicBool::new(config.enabled),
            config,
            registry,
            analyses,
            errors,
            emotions,
            cache_hits,
            cache_misses,
            cache_evictions,
            cache_entries,
            cache_size_bytes,
            active_streams,
            stream_chunks,
            durations,
            samples: Mutex::new(Samples::new()),
        })
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// The underlying registry, for callers that expose it themselves.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Stop recording. Values already collected stay readable.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Count one finished analysis, its emotions, and its duration under `operation`.
    pub fn record_analysis(&self, operation: &str, result: &AnalysisResult, elapsed: Duration) {
        if !self.is_enabled() {
            return;
        }
        self.analyses.inc();
        for insight in &result.insights {
            self.emotions
                .with_label_values(&[insight.emotion.as_str()])
                .inc();
            self.touch(Series::Emotion, &insight.emotion);
        }
        self.record_duration(operation, elapsed);
    }

    pub fn record_error(&self, code: &str) {
        if !self.is_enabled() {
            return;
        }
        self.errors.with_label_values(&[code]).inc();
        self.touch(Series::Error, code);
    }

    pub fn record_cache_hit(&self) {
        if self.is_enabled() {
            self.cache_hits.inc();
        }
    }

    pub fn record_cache_miss(&self) {
        if self.is_enabled() {
            self.cache_misses.inc();
        }
    }

    pub fn record_cache_eviction(&self) {
        if self.is_enabled() {
            self.cache_evictions.inc();
        }
    }

    pub fn set_cache_usage(&self, entries: usize, size_bytes: usize) {
        if self.is_enabled() {
            self.cache_entries.set(entries as i64);
            self.cache_size_bytes.set(size_bytes as i64);
        }
    }

    pub fn stream_started(&self) {
        if self.is_enabled() {
            self.active_streams.inc();
        }
    }

    /// Decrement the active stream gauge, never below zero.
    pub fn stream_ended(&self) {
        if self.is_enabled() && self.active_streams.get() > 0 {
            self.active_streams.dec();
        }
    }

    pub fn record_chunk(&self, kind: &str) {
        if !self.is_enabled() {
            return;
        }
        self.stream_chunks.with_label_values(&[kind]).inc();
        self.touch(Series::Chunk, kind);
    }

    pub fn start_timer(&self, operation: impl Into<String>) -> Timer {
        Timer {
            operation: operation.into(),
            started: Instant::now(),
        }
    }

    /// Stop `timer`, record it, and return the elapsed time.
    pub fn stop_timer(&self, timer: Timer) -> Duration {
        let elapsed = timer.started.elapsed();
        self.record_duration(&timer.operation, elapsed);
        elapsed
    }

    pub fn record_duration(&self, operation: &str, elapsed: Duration) {
        if !self.is_enabled() {
            return;
        }
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.durations.with_label_values(&[operation]).observe(ms);

        let mut samples = crate::lock(&self.samples);
        let window = samples.timers.entry(operation.to_string()).or_default();
        window.push_back((Utc::now(), ms));
        while window.len() > self.config.max_samples {
            window.pop_front();
        }
    }

    /// Statistics over the retained samples of `operation`.
    pub fn timer_stats(&self, operation: &str) -> Option<TimerStats> {
        let samples = crate::lock(&self.samples);
        let values: Vec<f64> = samples
            .timers
            .get(operation)?
            .iter()
            .map(|(_, ms)| *ms)
            .collect();
        timer_stats(values)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut counters = BTreeMap::new();
        let mut gauges = BTreeMap::new();
        let mut histograms = BTreeMap::new();

        for family in self.registry.gather() {
            for metric in family.get_metric() {
                let key = series_key(family.get_name(), metric.get_label());
                match family.get_field_type() {
                    MetricType::COUNTER => {
                        counters.insert(key, metric.get_counter().get_value() as u64);
                    }
                    MetricType::GAUGE => {
                        gauges.insert(key, metric.get_gauge().get_value() as i64);
                    }
                    MetricType::HISTOGRAM => {
                        let histogram = metric.get_histogram();
                        let buckets = histogram
                            .get_bucket()
                            .iter()
                            .map(|bucket| BucketCount {
                                le: bucket.get_upper_bound(),
                                count: bucket.get_cumulative_count(),
                            })
                            .collect();
                        histograms.insert(
                            key,
                            HistogramStats {
                                count: histogram.get_sample_count(),
                                sum: histogram.get_sample_sum(),
                                buckets,
                            },
                        );
                    }
                    _ => {}
                }
            }
        }

        let samples = crate::lock(&self.samples);
        let timers = samples
            .timers
            .iter()
            .filter_map(|(operation, window)| {
                let values = window.iter().map(|(_, ms)| *ms).collect();
                timer_stats(values).map(|stats| (operation.clone(), stats))
            })
            .collect();

        MetricsSnapshot {
            timestamp: Utc::now(),
            counters,
            gauges,
            histograms,
            timers,
        }
    }

    pub fn report(&self) -> PerformanceReport {
        let end = Utc::now();
        let snapshot = self.snapshot();
        let (start, processing, slowest) = {
            let samples = crate::lock(&self.samples);
            let processing: Vec<f64> = ANALYSIS_OPERATIONS
                .iter()
                .filter_map(|operation| samples.timers.get(*operation))
                .flat_map(|window| window.iter().map(|(_, ms)| *ms))
                .collect();
            let mut slowest: Vec<OperationTiming> = samples
                .timers
                .iter()
                .filter_map(|(operation, window)| {
                    let values = window.iter().map(|(_, ms)| *ms).collect();
                    timer_stats(values).map(|stats| OperationTiming {
                        operation: operation.clone(),
                        max_ms: stats.max,
                        avg_ms: stats.avg,
                    })
                })
                .collect();
            slowest.sort_by(|a, b| b.max_ms.total_cmp(&a.max_ms));
            slowest.truncate(REPORT_TOP);
            (samples.started, processing, slowest)
        };

        let total_analyses = self.analyses.get();
        let hits = self.cache_hits.get();
        let lookups = hits + self.cache_misses.get();
        let errors = sum_with_prefix(&snapshot.counters, "augur_errors_total");
        let minutes = (end - start).num_milliseconds().max(1) as f64 / 60_000.0;
        let processing = timer_stats(processing);

        let mut top_emotions: Vec<EmotionCount> = snapshot
            .counters
            .iter()
            .filter_map(|(key, count)| {
                key.strip_prefix("augur_emotions_total{emotion=")
                    .and_then(|rest| rest.strip_suffix('}'))
                    .map(|emotion| EmotionCount {
                        emotion: emotion.to_string(),
                        count: *count,
                    })
            })
            .collect();
        top_emotions.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.emotion.cmp(&b.emotion)));
        top_emotions.truncate(REPORT_TOP);

        PerformanceReport {
            period: ReportPeriod { start, end },
            total_analyses,
            avg_processing_ms: processing.as_ref().map_or(0.0, |stats| stats.avg),
            p95_processing_ms: processing.as_ref().map_or(0.0, |stats| stats.p95),
            cache_hit_rate: ratio(hits, lookups),
            error_rate: ratio(errors, total_analyses),
            throughput_per_minute: total_analyses as f64 / minutes,
            top_emotions,
            slowest_operations: slowest,
        }
    }

    /// Prometheus text exposition of every registered instrument.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).context("metrics exposition is not UTF-8")
    }

    /// Drop timer samples and labeled series not updated within the retention
    /// period. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(Duration::from_secs(self.config.retention_secs))
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return 0;
        };
        let mut samples = crate::lock(&self.samples);
        let mut removed = 0;

        samples.timers.retain(|_, window| {
            let before = window.len();
            window.retain(|(at, _)| *at >= cutoff);
            removed += before - window.len();
            !window.is_empty()
        });

        let stale: Vec<(Series, String)> = samples
            .touched
            .iter()
            .filter(|(_, at)| **at < cutoff)
            .map(|(series, _)| series.clone())
            .collect();
        for (series, label) in stale {
            samples.touched.remove(&(series, label.clone()));
            let vec = match series {
                Series::Error => &self.errors,
                Series::Emotion => &self.emotions,
                Series::Chunk => &self.stream_chunks,
            };
            if vec.remove_label_values(&[label.as_str()]).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "dropped metrics past retention");
        }
        removed
    }

    /// Zero every instrument, drop all samples, and restart the report period.
    pub fn reset(&self) {
        self.analyses.reset();
        self.errors.reset();
        self.emotions.reset();
        self.cache_hits.reset();
        self.cache_misses.reset();
        self.cache_evictions.reset();
        self.cache_entries.set(0);
        self.cache_size_bytes.set(0);
        self.active_streams.set(0);
        self.stream_chunks.reset();
        self.durations.reset();
        *crate::lock(&self.samples) = Samples::new();
    }

    /// Time since construction or the last [`reset`](Self::reset).
    pub fn uptime(&self) -> Duration {
        let started = crate::lock(&self.samples).started;
        (Utc::now() - started).to_std().unwrap_or_default()
    }

    fn touch(&self, series: Series, label: &str) {
        crate::lock(&self.samples)
            .touched
            .insert((series, label.to_string()), Utc::now());
    }
}

fn series_key(name: &str, labels: &[LabelPair]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let mut pairs: Vec<(&str, &str)> = labels
        .iter()
        .map(|pair| (pair.get_name(), pair.get_value()))
        .collect();
    pairs.sort();
    let joined: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{name}{{{}}}", joined.join(","))
}

fn sum_with_prefix(counters: &BTreeMap<String, u64>, name: &str) -> u64 {
    counters
        .iter()
        .filter(|(key, _)| key.as_str() == name || key.starts_with(&format!("{name}{{")))
        .map(|(_, count)| count)
        .sum()
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Nearest-rank percentile over sorted values.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

fn timer_stats(mut values: Vec<f64>) -> Option<TimerStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let count = values.len();
    Some(TimerStats {
        count,
        min: values[0],
        max: values[count - 1],
        avg: values.iter().sum::<f64>() / count as f64,
        p50: percentile(&values, 50.0),
        p95: percentile(&values, 95.0),
        p99: percentile(&values, 99.0),
    })
}
