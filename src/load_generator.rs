use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::error::{BenchError, SendError};
use crate::metrics::{Outcome, RequestSample};

// ─── Transport seam ──────────────────────────────────────────────

/// Issues one plain GET and reports the status code.
///
/// Implementations carry their own timeout; the dispatcher never cancels
/// a request once it has been handed over.
#[async_trait]
pub trait RequestSender: Send + Sync + 'static {
    async fn send(&self, url: &Url) -> Result<u16, SendError>;
}

#[async_trait]
impl RequestSender for reqwest::Client {
    async fn send(&self, url: &Url) -> Result<u16, SendError> {
        let response = self.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        // A request only completes once its body is in; a stalled or reset
        // body is a transport failure like any other.
        response.bytes().await?;
        Ok(status)
    }
}

/// Build the reqwest client used for real runs. No retries, no redirects
/// beyond reqwest's defaults, one timeout per request.
pub fn http_client(request_timeout: Duration) -> Result<reqwest::Client, BenchError> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .build()
        .map_err(|e| BenchError::DispatchSetup(format!("cannot build HTTP client: {e}")))
}

// ─── Dispatcher ──────────────────────────────────────────────────

/// Bounded-concurrency request pool.
pub struct Dispatcher<S: RequestSender> {
    sender: Arc<S>,
}

impl Dispatcher<reqwest::Client> {
    /// Dispatcher backed by a fresh reqwest client.
    pub fn http(request_timeout: Duration) -> Result<Self, BenchError> {
        Ok(Self::new(http_client(request_timeout)?))
    }
}

impl<S: RequestSender> Dispatcher<S> {
    pub fn new(sender: S) -> Self {
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Fire `count` GETs at `url` with at most `concurrency` in flight.
    ///
    /// Returns exactly `count` samples in completion order. Transport failures
    /// become `Outcome::Timeout` samples; only setup problems are errors.
    pub async fn dispatch(
        &self,
        url: &str,
        count: usize,
        concurrency: usize,
    ) -> Result<Vec<RequestSample>, BenchError> {
        if concurrency == 0 {
            return Err(BenchError::DispatchSetup(
                "concurrency must be at least 1".into(),
            ));
        }
        let url = parse_target(url)?;

        if count == 0 {
            return Ok(Vec::new());
        }

        let workers = concurrency.min(count);
        info!(%url, count, workers, "dispatching requests");

        // Work is claimed one ticket at a time; each worker owns its buffer.
        let next_ticket = Arc::new(AtomicUsize::new(0));
        let url = Arc::new(url);
        let started = Instant::now();

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let sender = self.sender.clone();
            let next_ticket = next_ticket.clone();
            let url = url.clone();

            handles.push(tokio::spawn(async move {
                worker(worker_id, sender, url, next_ticket, count).await
            }));
        }

        let mut samples = Vec::with_capacity(count);
        let mut lost_workers = 0usize;
        for h in handles {
            match h.await {
                Ok(mut owned) => samples.append(&mut owned),
                Err(e) => {
                    lost_workers += 1;
                    warn!(error = %e, "dispatch worker did not finish");
                }
            }
        }

        if lost_workers > 0 {
            return Err(BenchError::DispatchSetup(format!(
                "{lost_workers} of {workers} workers aborted, {} of {count} samples recorded",
                samples.len()
            )));
        }

        let timeouts = samples.iter().filter(|s| s.outcome.is_timeout()).count();
        info!(
            count = samples.len(),
            timeouts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "dispatch finished"
        );

        Ok(samples)
    }
}

/// Accept only absolute http(s) URLs; anything else cannot be dispatched at all.
fn parse_target(url: &str) -> Result<Url, BenchError> {
    let parsed = Url::parse(url)
        .map_err(|e| BenchError::DispatchSetup(format!("invalid target URL {url:?}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(BenchError::DispatchSetup(format!(
            "unsupported scheme {other:?} in {url:?}"
        ))),
    }
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker<S: RequestSender>(
    id: usize,
    sender: Arc<S>,
    url: Arc<Url>,
    next_ticket: Arc<AtomicUsize>,
    count: usize,
) -> Vec<RequestSample> {
    let mut owned = Vec::new();

    while next_ticket.fetch_add(1, Ordering::Relaxed) < count {
        owned.push(fire(sender.as_ref(), &url).await);
    }

    debug!(worker = id, issued = owned.len(), "worker drained");
    owned
}

/// One timed request. Never fails: transport errors are folded into the sample.
async fn fire<S: RequestSender>(sender: &S, url: &Url) -> RequestSample {
    let issued_at = Utc::now();
    let t0 = Instant::now();

    let result = sender.send(url).await;
    let latency = t0.elapsed();

    let outcome = match result {
        Ok(code) => Outcome::Status(code),
        Err(e) => {
            debug!(error = %e, "request failed");
            Outcome::Timeout
        }
    };

    RequestSample {
        issued_at,
        outcome,
        latency,
    }
}
