use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

use super::RequestSample;

/// HdrHistogram range: 1 μs → 10 min, 3 significant figures.
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 600_000_000;
const HIST_SIGFIG: u8 = 3;

/// Latency breakdown of one request series, in microseconds.
/// Logged at the end of a run and written into the run manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub p999: u64,
    /// Requests that got a response of any status.
    pub count: u64,
    /// Requests that never got a response.
    pub timeouts: u64,
}

impl LatencySummary {
    /// Summarise the answered requests of a series. Timeouts are counted
    /// but kept out of the histogram so they cannot skew the tail.
    pub fn from_samples(samples: &[RequestSample]) -> Self {
        let timeouts = samples.iter().filter(|s| s.outcome.is_timeout()).count() as u64;

        let Ok(mut hist) = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        else {
            return Self::empty(timeouts);
        };

        for sample in samples.iter().filter(|s| !s.outcome.is_timeout()) {
            // Clamp to ≥ 1 μs; saturate anything beyond the tracked range.
            let us = (sample.latency.as_micros() as u64).clamp(HIST_LOW, HIST_HIGH);
            let _ = hist.record(us);
        }

        Self::from_histogram(&hist, timeouts)
    }

    /// Extract a full percentile set from an HdrHistogram.
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>, timeouts: u64) -> Self {
        if hist.len() == 0 {
            return Self::empty(timeouts);
        }

        Self {
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_percentile(50.0),
            p95: hist.value_at_percentile(95.0),
            p99: hist.value_at_percentile(99.0),
            p999: hist.value_at_percentile(99.9),
            count: hist.len(),
            timeouts,
        }
    }

    fn empty(timeouts: u64) -> Self {
        Self {
            min: 0,
            max: 0,
            mean: 0.0,
            p50: 0,
            p95: 0,
            p99: 0,
            p999: 0,
            count: 0,
            timeouts,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Outcome;
    use chrono::Utc;
    use std::time::Duration;

    fn sample(ms: u64, outcome: Outcome) -> RequestSample {
        RequestSample {
            issued_at: Utc::now(),
            outcome,
            latency: Duration::from_millis(ms),
        }
    }

    #[test]
    fn timeouts_are_counted_not_histogrammed() {
        let samples = vec![
            sample(5, Outcome::Status(200)),
            sample(7, Outcome::Status(200)),
            sample(30_000, Outcome::Timeout),
        ];
        let summary = LatencySummary::from_samples(&samples);

        assert_eq!(summary.count, 2);
        assert_eq!(summary.timeouts, 1);
        assert!(summary.max < 8_000, "max was {}", summary.max);
        assert!(summary.min >= 4_990);
    }

    #[test]
    fn empty_series() {
        let summary = LatencySummary::from_samples(&[]);
        assert!(!summary.has_data());
        assert_eq!(summary.timeouts, 0);
        assert_eq!(summary.p99, 0);
    }
}
