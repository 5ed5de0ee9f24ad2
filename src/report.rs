//! Offline analysis of a results directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ReportConfig;
use crate::error::BenchError;
use crate::metrics::reducer::{self, percentile_of};
use crate::metrics::{RequestSample, ResourceSample};
use crate::persist::{self, MetricKind, SeriesKey};

// ─── Loaded series ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum SeriesData {
    Requests(Vec<RequestSample>),
    Memory(Vec<ResourceSample>),
}

#[derive(Debug, Clone)]
pub struct Series {
    pub key: SeriesKey,
    pub data: SeriesData,
}

/// Wall-clock span covered by a collection of observations.
pub trait TimeRange {
    fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)>;
}

fn widen(
    acc: Option<(DateTime<Utc>, DateTime<Utc>)>,
    next: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    match (acc, next) {
        (Some((a0, a1)), Some((b0, b1))) => Some((a0.min(b0), a1.max(b1))),
        (a, b) => a.or(b),
    }
}

impl TimeRange for [RequestSample] {
    /// Requests extend to the moment their response arrived.
    fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.iter()
            .map(|s| Some((s.issued_at, s.completed_at())))
            .fold(None, widen)
    }
}

impl TimeRange for [ResourceSample] {
    fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.iter()
            .map(|s| Some((s.sampled_at, s.sampled_at)))
            .fold(None, widen)
    }
}

impl TimeRange for Series {
    fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match &self.data {
            SeriesData::Requests(samples) => samples.time_range(),
            SeriesData::Memory(samples) => samples.time_range(),
        }
    }
}

/// Load every classifiable `*.csv` in `dir`, ordered by key.
pub fn load_dir(dir: &Path) -> Result<Vec<Series>, BenchError> {
    let mut series = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(key) = persist::classify(&name) else {
            debug!(file = %name, "skipping unclassified file");
            continue;
        };

        debug!(file = %name, "parsing");
        let path = entry.path();
        let data = match key.kind {
            MetricKind::RequestTime => SeriesData::Requests(persist::read_request_series(&path)?),
            MetricKind::MemoryUsage => SeriesData::Memory(persist::read_resource_series(&path)?),
        };
        series.push(Series { key, data });
    }

    series.sort_by(|a, b| a.key.cmp(&b.key));
    info!(dir = %dir.display(), files = series.len(), "results loaded");
    Ok(series)
}

// ─── Partitioning ────────────────────────────────────────────────

pub fn is_kind(kind: MetricKind) -> impl Fn(&Series) -> bool {
    move |s| s.key.kind == kind
}

pub fn is_label(label: &str) -> impl Fn(&Series) -> bool + '_ {
    move |s| s.key.label.eq_ignore_ascii_case(label)
}

pub fn is_backend(backend: &str) -> impl Fn(&Series) -> bool + '_ {
    move |s| s.key.backend.eq_ignore_ascii_case(backend)
}

/// `(matching, rest)` for any of the predicates above.
pub fn partition<F>(series: &[Series], pred: F) -> (Vec<Series>, Vec<Series>)
where
    F: Fn(&Series) -> bool,
{
    reducer::partition(series, |s| pred(s))
}

// ─── Summaries ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestStats {
    pub count: usize,
    pub timeouts: usize,
    /// Answered requests left out of the percentiles.
    pub outliers: usize,
    pub p50_ms: Option<f64>,
    pub p90_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub samples: usize,
    pub peak_mb: Option<f64>,
    pub mean_mb: Option<f64>,
    pub median_mb: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub label: String,
    pub backend: String,
    pub requests: Option<RequestStats>,
    pub memory: Option<MemoryStats>,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

pub fn request_stats(samples: &[RequestSample], reject_outliers: bool) -> RequestStats {
    let answered: Vec<f64> = samples
        .iter()
        .filter(|s| !s.outcome.is_timeout())
        .map(|s| s.latency.as_micros() as f64 / 1_000.0)
        .collect();

    let (kept, outliers) = if reject_outliers {
        let (outliers, inliers) = reducer::split_outliers(&answered, |v| *v);
        (inliers, outliers.len())
    } else {
        (answered, 0)
    };

    RequestStats {
        count: samples.len(),
        timeouts: samples.iter().filter(|s| s.outcome.is_timeout()).count(),
        outliers,
        p50_ms: percentile_of(0.50, &kept),
        p90_ms: percentile_of(0.90, &kept),
        p99_ms: percentile_of(0.99, &kept),
    }
}

pub fn memory_stats(samples: &[ResourceSample]) -> MemoryStats {
    let values: Vec<f64> = samples.iter().map(|s| s.value_mb).collect();
    let mean_mb = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);

    MemoryStats {
        samples: values.len(),
        peak_mb: values.iter().copied().max_by(f64::total_cmp),
        mean_mb,
        median_mb: percentile_of(0.5, &values),
    }
}

/// One summary per `(label, backend)` pair present in `series`.
pub fn summarize(series: &[Series], reject_outliers: bool) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<(String, String), GroupSummary> = BTreeMap::new();

    for s in series {
        let group = groups
            .entry((s.key.label.clone(), s.key.backend.clone()))
            .or_insert_with(|| GroupSummary {
                label: s.key.label.clone(),
                backend: s.key.backend.clone(),
                requests: None,
                memory: None,
                time_range: None,
            });

        group.time_range = widen(group.time_range, s.time_range());
        match &s.data {
            SeriesData::Requests(samples) => {
                group.requests = Some(request_stats(samples, reject_outliers))
            }
            SeriesData::Memory(samples) => group.memory = Some(memory_stats(samples)),
        }
    }

    groups.into_values().collect()
}

/// Load, filter and summarise a results directory; optionally dump JSON.
pub fn run(config: &ReportConfig) -> Result<Vec<GroupSummary>, BenchError> {
    let mut series = load_dir(&config.input_dir)?;
    if let Some(label) = &config.label {
        series = partition(&series, is_label(label)).0;
    }
    if let Some(backend) = &config.backend {
        series = partition(&series, is_backend(backend)).0;
    }

    let summaries = summarize(&series, config.reject_outliers);

    if let Some(path) = &config.json {
        fs::write(path, serde_json::to_string_pretty(&summaries)?)?;
        info!(path = %path.display(), "summary written");
    }
    Ok(summaries)
}

fn ms(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}ms")).unwrap_or_else(|| "-".into())
}

fn mb(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.1}MiB")).unwrap_or_else(|| "-".into())
}

/// One console line per group.
pub fn render_line(g: &GroupSummary) -> String {
    let mut line = format!("{:<10} {:<12}", g.label, g.backend);
    if let Some(r) = &g.requests {
        line.push_str(&format!(
            "  req {:>6} (timeouts {:>5}, outliers {:>5})  p50 {:>10}  p90 {:>10}  p99 {:>10}",
            r.count,
            r.timeouts,
            r.outliers,
            ms(r.p50_ms),
            ms(r.p90_ms),
            ms(r.p99_ms),
        ));
    }
    if let Some(m) = &g.memory {
        line.push_str(&format!(
            "  mem {:>5} samples  peak {:>10}  mean {:>10}  median {:>10}",
            m.samples,
            mb(m.peak_mb),
            mb(m.mean_mb),
            mb(m.median_mb),
        ));
    }
    if let Some((from, to)) = g.time_range {
        let span = (to - from).num_milliseconds() as f64 / 1_000.0;
        line.push_str(&format!("  span {span:.1}s"));
    }
    line
}
