use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::BenchError;

// ─── Run configuration ───────────────────────────────────────────

/// Everything one benchmark run is parameterised by.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Target endpoint, hit with plain GET requests
    #[arg(long, env = "BENCH_URL")]
    pub url: String,

    /// Number of requests to dispatch
    #[arg(long, env = "BENCH_COUNT", default_value_t = default_count())]
    #[serde(default = "default_count")]
    pub count: usize,

    /// In-flight request limit (defaults to the number of available cores)
    #[arg(long, env = "BENCH_CONCURRENCY")]
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Resource sampling interval in milliseconds
    #[arg(long = "interval-ms", env = "BENCH_INTERVAL_MS", default_value_t = default_interval_ms())]
    #[serde(default = "default_interval_ms")]
    pub sample_interval_ms: u64,

    /// Per-request timeout in milliseconds
    #[arg(long = "timeout-ms", env = "BENCH_TIMEOUT_MS", default_value_t = default_timeout_ms())]
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Delay between sampler start and the first request (defaults to half the interval)
    #[arg(long = "lead-in-ms", env = "BENCH_LEAD_IN_MS")]
    #[serde(default)]
    pub lead_in_ms: Option<u64>,

    /// Workload label, encoded in the output file names
    #[arg(long, env = "BENCH_LABEL", default_value_t = default_label())]
    #[serde(default = "default_label")]
    pub label: String,

    /// Backend tag, encoded in the output file names
    #[arg(long, env = "BENCH_BACKEND")]
    pub backend: String,

    /// Directory the series files are written to
    #[arg(long, env = "BENCH_OUTPUT_DIR", default_value = "benchmarkingResults")]
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_count() -> usize {
    10_000
}
fn default_interval_ms() -> u64 {
    500
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_label() -> String {
    "small".into()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("benchmarkingResults")
}

const MAX_CONCURRENCY: usize = 4096;

impl BenchConfig {
    /// Config with every default filled in.
    pub fn new(url: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            count: default_count(),
            concurrency: None,
            sample_interval_ms: default_interval_ms(),
            request_timeout_ms: default_timeout_ms(),
            lead_in_ms: None,
            label: default_label(),
            backend: backend.into(),
            output_dir: default_output_dir(),
        }
    }

    /// The pool size actually used: explicit, or one worker per core.
    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn lead_in(&self) -> Duration {
        self.lead_in_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.sample_interval() / 2)
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| BenchError::InvalidConfig(format!("url {:?}: {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BenchError::InvalidConfig(format!(
                "url must be http or https, got {:?}",
                url.scheme()
            )));
        }

        let concurrency = self.concurrency();
        if concurrency == 0 || concurrency > MAX_CONCURRENCY {
            return Err(BenchError::InvalidConfig(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}"
            )));
        }
        if self.sample_interval_ms == 0 {
            return Err(BenchError::InvalidConfig(
                "sampling interval must be positive".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(BenchError::InvalidConfig(
                "request timeout must be positive".into(),
            ));
        }
        validate_tag("label", &self.label)?;
        validate_tag("backend", &self.backend)?;
        Ok(())
    }
}

/// Tags become `_`-separated file-name components and must survive the split.
fn validate_tag(what: &str, value: &str) -> Result<(), BenchError> {
    if value.is_empty() {
        return Err(BenchError::InvalidConfig(format!("{what} must not be empty")));
    }
    if value.contains(['_', '/', '\\', '.']) {
        return Err(BenchError::InvalidConfig(format!(
            "{what} {value:?} must not contain '_', '.', or path separators"
        )));
    }
    Ok(())
}

// ─── Report configuration ────────────────────────────────────────

/// Options for summarising a results directory.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory holding the series files
    #[arg(long = "input", default_value = "benchmarkingResults")]
    #[serde(default = "default_output_dir")]
    pub input_dir: PathBuf,

    /// Only summarise this workload label
    #[arg(long)]
    #[serde(default)]
    pub label: Option<String>,

    /// Only summarise this backend tag
    #[arg(long)]
    #[serde(default)]
    pub backend: Option<String>,

    /// Keep outlying latencies in the percentiles
    #[arg(long = "keep-outliers", action = clap::ArgAction::SetFalse)]
    #[serde(default = "default_reject_outliers")]
    pub reject_outliers: bool,

    /// Also write the summaries to this JSON file
    #[arg(long)]
    #[serde(default)]
    pub json: Option<PathBuf>,
}

fn default_reject_outliers() -> bool {
    true
}

impl ReportConfig {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            label: None,
            backend: None,
            reject_outliers: default_reject_outliers(),
            json: None,
        }
    }
}
