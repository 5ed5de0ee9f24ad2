//! Ways of asking "how much memory is the target using right now?".

mod container;
mod process;

pub use container::ContainerProbe;
pub use process::ProcessProbe;

use async_trait::async_trait;

use crate::error::ProbeError;

/// A source of resource observations for one target.
///
/// `Err` ends sampling: [`ProbeError::NotFound`] is the normal way a run
/// learns that its target has exited.
#[async_trait]
pub trait ResourceProbe: Send + Sync + 'static {
    /// Current resident memory in MiB.
    async fn query_mb(&self) -> Result<f64, ProbeError>;

    /// Human-readable target identity for logs and manifests.
    fn target(&self) -> String;
}
