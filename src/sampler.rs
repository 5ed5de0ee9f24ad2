use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ProbeError;
use crate::metrics::ResourceSample;
use crate::probe::ResourceProbe;

/// Background resource sampler.
///
/// One long-lived task polls the probe, sleeps a full `interval`, and
/// repeats. It owns its buffer and hands it back when it exits, so the
/// samples are only ever read after the loop has quiesced.
pub struct Sampler;

/// Longest a single probe query may take before the target counts as
/// unobservable. `docker stats --no-stream` alone needs a second or two.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Running sampler. Dropping it without calling [`stop`](Self::stop) ends
/// the loop at its next sleep and discards the samples.
pub struct SamplerHandle {
    stop_tx: watch::Sender<bool>,
    taken_rx: watch::Receiver<usize>,
    task: JoinHandle<Vec<ResourceSample>>,
    target: String,
}

#[derive(Debug)]
enum SamplerExit {
    Stopped,
    TargetGone(ProbeError),
}

impl Sampler {
    /// Spawn the sampling loop. The first query happens immediately.
    pub fn start(probe: Arc<dyn ResourceProbe>, interval: Duration) -> SamplerHandle {
        Self::start_with_timeout(probe, interval, QUERY_TIMEOUT)
    }

    /// As [`start`](Self::start), giving up on any query slower than `query_timeout`.
    pub fn start_with_timeout(
        probe: Arc<dyn ResourceProbe>,
        interval: Duration,
        query_timeout: Duration,
    ) -> SamplerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (taken_tx, taken_rx) = watch::channel(0usize);
        let target = probe.target();

        info!(%target, interval_ms = interval.as_millis() as u64, "starting sampler");
        let ticks = Ticks {
            interval,
            query_timeout,
        };
        let task = tokio::spawn(run(probe, ticks, stop_rx, taken_tx));

        SamplerHandle {
            stop_tx,
            taken_rx,
            task,
            target,
        }
    }
}

impl SamplerHandle {
    /// True once the loop has exited on its own (target gone) or been stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Resolve once the first sample is in the buffer. Returns `false` if the
    /// loop ended without ever taking one.
    pub async fn first_sample(&mut self) -> bool {
        self.taken_rx.wait_for(|taken| *taken > 0).await.is_ok()
    }

    /// Signal the loop and wait for it to exit. Returns the samples in the
    /// order they were taken; callers that need a guarantee must sort.
    ///
    /// Returns promptly whether the loop is sleeping or mid-query; an
    /// in-flight query is abandoned and records nothing.
    pub async fn stop(self) -> Vec<ResourceSample> {
        // The receiver is gone if the loop already ended; that is fine.
        let _ = self.stop_tx.send(true);

        match self.task.await {
            Ok(samples) => {
                debug!(target = %self.target, samples = samples.len(), "sampler joined");
                samples
            }
            Err(e) => {
                warn!(target = %self.target, error = %e, "sampler task lost, no samples recovered");
                Vec::new()
            }
        }
    }
}

// ─── Sampling loop ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Ticks {
    interval: Duration,
    query_timeout: Duration,
}

async fn run(
    probe: Arc<dyn ResourceProbe>,
    ticks: Ticks,
    mut stop_rx: watch::Receiver<bool>,
    taken_tx: watch::Sender<usize>,
) -> Vec<ResourceSample> {
    let mut samples = Vec::new();

    let exit = loop {
        if *stop_rx.borrow() {
            break SamplerExit::Stopped;
        }

        let queried = tokio::select! {
            queried = tokio::time::timeout(ticks.query_timeout, probe.query_mb()) => queried,
            _ = stop_rx.changed() => break SamplerExit::Stopped,
        };
        match queried {
            Ok(Ok(value_mb)) => {
                samples.push(ResourceSample {
                    sampled_at: Utc::now(),
                    value_mb,
                });
                // Nobody waiting is fine.
                let _ = taken_tx.send(samples.len());
            }
            Ok(Err(e)) => break SamplerExit::TargetGone(e),
            Err(_) => {
                break SamplerExit::TargetGone(ProbeError::Query(format!(
                    "no answer within {}ms",
                    ticks.query_timeout.as_millis()
                )))
            }
        }

        // Full sleep after every query: a slow query stretches the cadence
        // rather than causing back-to-back ticks.
        tokio::select! {
            _ = tokio::time::sleep(ticks.interval) => {}
            // Only ever flips to true; a dropped handle counts as a stop too.
            _ = stop_rx.changed() => break SamplerExit::Stopped,
        }
    };

    match &exit {
        SamplerExit::Stopped => debug!(samples = samples.len(), "sampler stopped"),
        SamplerExit::TargetGone(reason) => {
            info!(samples = samples.len(), %reason, "sampling ended, target no longer observable")
        }
    }

    samples
}
