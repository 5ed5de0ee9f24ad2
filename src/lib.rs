//! HTTP load harness: fires a burst of GET requests at a target while a
//! background task samples the target's memory, then seals both series
//! into a time-ordered run for offline analysis.

pub mod config;
pub mod error;
pub mod harness;
pub mod load_generator;
pub mod logging;
pub mod metrics;
pub mod persist;
pub mod probe;
pub mod report;
pub mod sampler;
pub mod target;

pub use config::{BenchConfig, ReportConfig};
pub use error::{BenchError, ProbeError, SendError};
pub use harness::{BenchmarkRun, Harness, HarnessState, RunHeader, RunStatus};
pub use load_generator::{Dispatcher, RequestSender};
pub use metrics::{Outcome, RequestSample, ResourceSample};
pub use sampler::{Sampler, SamplerHandle};
