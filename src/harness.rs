use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BenchConfig;
use crate::load_generator::{Dispatcher, RequestSender};
use crate::metrics::{LatencySummary, RequestSample, ResourceSample};
use crate::probe::ResourceProbe;
use crate::sampler::Sampler;

// ─── Lifecycle ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Idle,
    SamplerStarting,
    Running,
    Draining,
    Sealed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// The dispatcher could not run; whatever was sampled is still kept.
    Failed(String),
}

impl RunStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

// ─── Sealed run ──────────────────────────────────────────────────

/// Identity and parameters of a run, fixed when it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHeader {
    pub run_id: Uuid,
    /// What was sampled, e.g. `container:flasktestenv` or `pid:4242`.
    pub target: String,
    pub url: String,
    pub label: String,
    pub backend: String,
    pub count: usize,
    pub concurrency: usize,
    pub sample_interval: Duration,
    pub started_at: DateTime<Utc>,
}

/// One finished benchmark: both series sorted by timestamp, never mutated again.
#[derive(Debug, Clone)]
pub struct BenchmarkRun {
    header: RunHeader,
    finished_at: DateTime<Utc>,
    status: RunStatus,
    requests: Vec<RequestSample>,
    resources: Vec<ResourceSample>,
}

impl BenchmarkRun {
    /// Order both series and freeze the run.
    pub fn seal(
        header: RunHeader,
        mut requests: Vec<RequestSample>,
        mut resources: Vec<ResourceSample>,
        status: RunStatus,
        finished_at: DateTime<Utc>,
    ) -> Self {
        requests.sort_by_key(|s| s.issued_at);
        resources.sort_by_key(|s| s.sampled_at);
        Self {
            header,
            finished_at,
            status,
            requests,
            resources,
        }
    }

    pub fn header(&self) -> &RunHeader {
        &self.header
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn requests(&self) -> &[RequestSample] {
        &self.requests
    }

    pub fn resources(&self) -> &[ResourceSample] {
        &self.resources
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.header.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn latency_summary(&self) -> LatencySummary {
        LatencySummary::from_samples(&self.requests)
    }
}

// ─── Coordinator ─────────────────────────────────────────────────

/// Runs the sampler around the dispatcher and seals the result.
pub struct Harness<S: RequestSender> {
    dispatcher: Dispatcher<S>,
    probe: Arc<dyn ResourceProbe>,
    state: HarnessState,
}

impl<S: RequestSender> Harness<S> {
    pub fn new(dispatcher: Dispatcher<S>, probe: Arc<dyn ResourceProbe>) -> Self {
        Self {
            dispatcher,
            probe,
            state: HarnessState::Idle,
        }
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    fn transition(&mut self, next: HarnessState) {
        debug!(from = ?self.state, to = ?next, "harness transition");
        self.state = next;
    }

    /// Execute one run. Always returns a sealed run; a dispatcher setup
    /// failure is recorded in its status instead of discarding the samples.
    pub async fn run(&mut self, config: &BenchConfig) -> BenchmarkRun {
        self.state = HarnessState::Idle;

        let header = RunHeader {
            run_id: Uuid::new_v4(),
            target: self.probe.target(),
            url: config.url.clone(),
            label: config.label.clone(),
            backend: config.backend.clone(),
            count: config.count,
            concurrency: config.concurrency(),
            sample_interval: config.sample_interval(),
            started_at: Utc::now(),
        };
        info!(
            run_id = %header.run_id,
            target = %header.target,
            url = %header.url,
            count = header.count,
            concurrency = header.concurrency,
            "benchmark run starting"
        );

        self.transition(HarnessState::SamplerStarting);
        let mut sampler = Sampler::start(self.probe.clone(), header.sample_interval);
        // Load starts after the lead-in and never before the first sample has landed.
        let ((), observed) = tokio::join!(
            tokio::time::sleep(config.lead_in()),
            sampler.first_sample()
        );
        if !observed {
            warn!(
                run_id = %header.run_id,
                target = %header.target,
                "sampler ended before its first sample"
            );
        }

        self.transition(HarnessState::Running);
        let dispatched = self
            .dispatcher
            .dispatch(&header.url, header.count, header.concurrency)
            .await;

        self.transition(HarnessState::Draining);
        let resources = sampler.stop().await;

        let (requests, status) = match dispatched {
            Ok(requests) => (requests, RunStatus::Completed),
            Err(e) => {
                error!(run_id = %header.run_id, error = %e, "dispatch failed, sealing partial run");
                (Vec::new(), RunStatus::Failed(e.to_string()))
            }
        };

        let run = BenchmarkRun::seal(header, requests, resources, status, Utc::now());
        self.transition(HarnessState::Sealed);

        info!(
            run_id = %run.header().run_id,
            requests = run.requests().len(),
            resource_samples = run.resources().len(),
            failed = run.status().is_failed(),
            "benchmark run sealed"
        );
        run
    }
}
