//! Series files on disk.
//!
//! Each run produces two headerless CSV files whose names carry the
//! classification key `<metricType>_<label>_<backend>.csv`, plus a JSON
//! manifest with the run metadata.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::BenchError;
use crate::harness::{BenchmarkRun, RunHeader, RunStatus};
use crate::metrics::{LatencySummary, Outcome, RequestSample, ResourceSample};

// ─── File-name classification ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    MemoryUsage,
    RequestTime,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MemoryUsage => "memory_usage",
            Self::RequestTime => "request_time",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory_usage" => Some(Self::MemoryUsage),
            "request_time" => Some(Self::RequestTime),
            _ => None,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric type, workload label and backend identity of one series file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub kind: MetricKind,
    pub label: String,
    pub backend: String,
}

impl SeriesKey {
    pub fn new(kind: MetricKind, label: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            backend: backend.into(),
        }
    }

    pub fn file_name(&self) -> String {
        series_file_name(self.kind, &self.label, &self.backend)
    }
}

pub fn series_file_name(kind: MetricKind, label: &str, backend: &str) -> String {
    format!("{kind}_{label}_{backend}.csv")
}

/// Recover the key from a series file name. The last `_` component is the
/// backend, the one before it the label, everything in front the metric type.
pub fn classify(file_name: &str) -> Option<SeriesKey> {
    let stem = file_name.strip_suffix(".csv")?;
    let (rest, backend) = stem.rsplit_once('_')?;
    let (kind, label) = rest.rsplit_once('_')?;
    if label.is_empty() || backend.is_empty() {
        return None;
    }
    Some(SeriesKey::new(MetricKind::parse(kind)?, label, backend))
}

// ─── Row encoding ────────────────────────────────────────────────

/// UNIX seconds with microsecond precision.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    format!("{}.{:06}", ts.timestamp(), ts.timestamp_subsec_micros())
}

fn parse_timestamp(field: &str) -> Result<DateTime<Utc>, String> {
    let secs: f64 = field
        .trim()
        .parse()
        .map_err(|_| format!("bad timestamp {field:?}"))?;
    DateTime::from_timestamp_micros((secs * 1e6).round() as i64)
        .ok_or_else(|| format!("timestamp out of range {field:?}"))
}

fn parse_seconds(field: &str) -> Result<Duration, String> {
    let secs: f64 = field
        .trim()
        .parse()
        .map_err(|_| format!("bad duration {field:?}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("bad duration {field:?}: {e}"))
}

fn malformed(path: &Path, line: usize, reason: impl fmt::Display) -> BenchError {
    BenchError::MalformedSeries {
        path: path.to_path_buf(),
        reason: format!("row {line}: {reason}"),
    }
}

fn writer(path: &Path) -> Result<csv::Writer<fs::File>, BenchError> {
    Ok(csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?)
}

fn reader(path: &Path) -> Result<csv::Reader<fs::File>, BenchError> {
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

// ─── Request series ──────────────────────────────────────────────

/// Rows: `issued_at,statusCodeOrTIMEOUT,elapsed`.
pub fn write_request_series(path: &Path, samples: &[RequestSample]) -> Result<(), BenchError> {
    let mut wtr = writer(path)?;
    for s in samples {
        wtr.write_record([
            format_timestamp(s.issued_at),
            s.outcome.to_string(),
            format!("{:.6}", s.latency.as_secs_f64()),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_request_series(path: &Path) -> Result<Vec<RequestSample>, BenchError> {
    let mut rdr = reader(path)?;
    let mut samples = Vec::new();

    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let line = i + 1;
        if record.len() != 3 {
            return Err(malformed(path, line, format!("expected 3 fields, got {}", record.len())));
        }
        samples.push(RequestSample {
            issued_at: parse_timestamp(&record[0]).map_err(|e| malformed(path, line, e))?,
            outcome: record[1]
                .parse::<Outcome>()
                .map_err(|e| malformed(path, line, e))?,
            latency: parse_seconds(&record[2]).map_err(|e| malformed(path, line, e))?,
        });
    }
    Ok(samples)
}

// ─── Resource series ─────────────────────────────────────────────

/// Rows: `sampled_at,value_mb`.
pub fn write_resource_series(path: &Path, samples: &[ResourceSample]) -> Result<(), BenchError> {
    let mut wtr = writer(path)?;
    for s in samples {
        wtr.write_record([format_timestamp(s.sampled_at), s.value_mb.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_resource_series(path: &Path) -> Result<Vec<ResourceSample>, BenchError> {
    let mut rdr = reader(path)?;
    let mut samples = Vec::new();

    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let line = i + 1;
        if record.len() != 2 {
            return Err(malformed(path, line, format!("expected 2 fields, got {}", record.len())));
        }
        let value_mb: f64 = record[1]
            .parse()
            .map_err(|_| malformed(path, line, format!("bad value {:?}", &record[1])))?;
        samples.push(ResourceSample {
            sampled_at: parse_timestamp(&record[0]).map_err(|e| malformed(path, line, e))?,
            value_mb,
        });
    }
    Ok(samples)
}

// ─── Whole runs ──────────────────────────────────────────────────

/// Everything about a run except the samples themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(flatten)]
    pub header: RunHeader,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub request_samples: usize,
    pub resource_samples: usize,
    pub latency_us: LatencySummary,
}

impl RunManifest {
    pub fn of(run: &BenchmarkRun) -> Self {
        Self {
            header: run.header().clone(),
            finished_at: run.finished_at(),
            status: run.status().clone(),
            request_samples: run.requests().len(),
            resource_samples: run.resources().len(),
            latency_us: run.latency_summary(),
        }
    }
}

/// Paths produced by [`write_run`].
#[derive(Debug, Clone)]
pub struct RunFiles {
    pub requests: PathBuf,
    pub resources: PathBuf,
    pub manifest: PathBuf,
}

pub fn manifest_file_name(label: &str, backend: &str) -> String {
    format!("{label}_{backend}.run.json")
}

/// Persist both series and the manifest under `dir`, creating it if needed.
/// Existing files for the same label and backend are overwritten.
pub fn write_run(dir: &Path, run: &BenchmarkRun) -> Result<RunFiles, BenchError> {
    fs::create_dir_all(dir)?;
    let header = run.header();

    let key = |kind| SeriesKey::new(kind, header.label.as_str(), header.backend.as_str());

    let files = RunFiles {
        requests: dir.join(key(MetricKind::RequestTime).file_name()),
        resources: dir.join(key(MetricKind::MemoryUsage).file_name()),
        manifest: dir.join(manifest_file_name(&header.label, &header.backend)),
    };

    write_request_series(&files.requests, run.requests())?;
    write_resource_series(&files.resources, run.resources())?;

    let manifest = serde_json::to_string_pretty(&RunManifest::of(run))?;
    fs::write(&files.manifest, manifest)?;

    info!(
        requests = %files.requests.display(),
        resources = %files.resources.display(),
        "run persisted"
    );
    Ok(files)
}

pub fn read_manifest(path: &Path) -> Result<RunManifest, BenchError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn at(micros: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(1_700_000_000_000_000 + micros).unwrap()
    }

    #[test]
    fn file_names_carry_the_key() {
        assert_eq!(
            series_file_name(MetricKind::RequestTime, "small", "flask"),
            "request_time_small_flask.csv"
        );
        assert_eq!(
            classify("memory_usage_Large_nginx.csv"),
            Some(SeriesKey::new(MetricKind::MemoryUsage, "Large", "nginx"))
        );
        assert_eq!(
            classify("REQUEST_TIME_small_flask.csv").map(|k| k.kind),
            Some(MetricKind::RequestTime)
        );
    }

    #[test]
    fn unclassifiable_names() {
        for name in [
            "notes.txt",
            "request_time.csv",
            "request_small.csv",
            "cpu_usage_small_flask.csv",
            "request_time__flask.csv",
            "small_flask.run.json",
        ] {
            assert_eq!(classify(name), None, "{name}");
        }
    }

    #[test]
    fn request_rows_keep_timeouts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request_time_small_flask.csv");
        let samples = vec![
            RequestSample {
                issued_at: at(0),
                outcome: Outcome::Status(200),
                latency: Duration::from_micros(5_250),
            },
            RequestSample {
                issued_at: at(1_500),
                outcome: Outcome::Timeout,
                latency: Duration::from_secs(30),
            },
        ];

        write_request_series(&path, &samples).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows[0], "1700000000.000000,200,0.005250");
        assert_eq!(rows[1], "1700000000.001500,TIMEOUT,30.000000");

        assert_eq!(read_request_series(&path).unwrap(), samples);
    }

    #[test]
    fn resource_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_usage_small_flask.csv");
        let samples = vec![
            ResourceSample {
                sampled_at: at(0),
                value_mb: 41.5,
            },
            ResourceSample {
                sampled_at: at(500_000),
                value_mb: 43.25,
            },
        ];

        write_resource_series(&path, &samples).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap().lines().next(),
            Some("1700000000.000000,41.5")
        );
        assert_eq!(read_resource_series(&path).unwrap(), samples);
    }

    #[test]
    fn malformed_rows_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request_time_small_flask.csv");
        fs::write(&path, "1700000000.0,200,0.1\n1700000000.5,teapot,0.1\n").unwrap();

        match read_request_series(&path) {
            Err(BenchError::MalformedSeries { path: p, reason }) => {
                assert_eq!(p, path);
                assert!(reason.starts_with("row 2"), "{reason}");
            }
            other => panic!("expected MalformedSeries, got {other:?}"),
        }

        fs::write(&path, "1700000000.0,200,-1\n").unwrap();
        assert!(read_request_series(&path).is_err());
    }

    #[test]
    fn empty_series_is_an_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_usage_small_flask.csv");
        write_resource_series(&path, &[]).unwrap();
        assert!(read_resource_series(&path).unwrap().is_empty());
    }

    #[test]
    fn whole_run_with_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("results");
        let header = RunHeader {
            run_id: Uuid::new_v4(),
            target: "pid:1".into(),
            url: "http://localhost:8081/small".into(),
            label: "small".into(),
            backend: "flask".into(),
            count: 1,
            concurrency: 1,
            sample_interval: Duration::from_millis(500),
            started_at: at(0),
        };
        let run = BenchmarkRun::seal(
            header.clone(),
            vec![RequestSample {
                issued_at: at(10),
                outcome: Outcome::Status(200),
                latency: Duration::from_millis(4),
            }],
            vec![],
            RunStatus::Failed("boom".into()),
            at(1_000_000),
        );

        let files = write_run(&out, &run).unwrap();
        assert!(files.requests.ends_with("request_time_small_flask.csv"));
        assert!(files.resources.ends_with("memory_usage_small_flask.csv"));

        let manifest = read_manifest(&files.manifest).unwrap();
        assert_eq!(manifest.header, header);
        assert_eq!(manifest.status, RunStatus::Failed("boom".into()));
        assert_eq!(manifest.request_samples, 1);
        assert_eq!(manifest.resource_samples, 0);
        assert_eq!(manifest.latency_us.count, 1);
    }
}
