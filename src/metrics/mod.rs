pub mod percentiles;
pub mod reducer;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use percentiles::LatencySummary;

// ─── Request side ────────────────────────────────────────────────

/// What a single request came back with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The server answered; any status code counts, 5xx included.
    Status(u16),
    /// Transport-level failure: timeout, refused connection, DNS, ...
    Timeout,
}

impl Outcome {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "{code}"),
            Self::Timeout => f.write_str("TIMEOUT"),
        }
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("TIMEOUT") {
            return Ok(Self::Timeout);
        }
        s.parse::<u16>()
            .map(Self::Status)
            .map_err(|_| format!("expected a status code or TIMEOUT, got {s:?}"))
    }
}

/// One dispatched request. Created once, in the worker that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestSample {
    pub issued_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub latency: Duration,
}

impl RequestSample {
    /// Wall-clock instant the response (or failure) arrived.
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.issued_at
            + chrono::Duration::from_std(self.latency).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

// ─── Resource side ───────────────────────────────────────────────

/// One observation of the target's memory footprint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub sampled_at: DateTime<Utc>,
    pub value_mb: f64,
}

/// Bytes → MiB, the unit every memory series is stored in.
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_text_form() {
        assert_eq!(Outcome::Status(200).to_string(), "200");
        assert_eq!(Outcome::Timeout.to_string(), "TIMEOUT");
        assert_eq!("503".parse::<Outcome>(), Ok(Outcome::Status(503)));
        assert_eq!(" timeout ".parse::<Outcome>(), Ok(Outcome::Timeout));
        assert!("abc".parse::<Outcome>().is_err());
    }

    #[test]
    fn completed_at_adds_latency() {
        let issued_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let sample = RequestSample {
            issued_at,
            outcome: Outcome::Status(200),
            latency: Duration::from_millis(250),
        };
        assert_eq!(
            sample.completed_at() - issued_at,
            chrono::Duration::milliseconds(250)
        );
    }

    #[test]
    fn mib_conversion() {
        assert_eq!(bytes_to_mb(3 * 1024 * 1024), 3.0);
    }
}
