use std::path::PathBuf;

// ─── Run-level errors ────────────────────────────────────────────

/// Everything that can stop a benchmark run or an analysis pass.
///
/// Per-request transport failures and sampler query failures are *not*
/// represented here: they are recovered locally (see [`SendError`] and
/// [`ProbeError`]).
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// The dispatcher could not build its worker pool or HTTP client.
    #[error("dispatch setup failed: {0}")]
    DispatchSetup(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The container collaborator (docker CLI) refused a lifecycle command.
    #[error("target control failed: {0}")]
    Target(String),

    #[error("malformed series file {path}: {reason}")]
    MalformedSeries { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// ─── Sampler-side errors ─────────────────────────────────────────

/// Why a resource query produced no value. Either variant ends sampling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The target no longer exists (process exited, container removed).
    #[error("target not found: {0}")]
    NotFound(String),

    #[error("resource query failed: {0}")]
    Query(String),
}

// ─── Request-side errors ─────────────────────────────────────────

/// Transport-level failure of a single request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}
