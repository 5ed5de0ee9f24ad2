use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use super::ResourceProbe;
use crate::error::ProbeError;
use crate::metrics::bytes_to_mb;

/// Samples the resident set size of a local process through sysinfo.
pub struct ProcessProbe {
    pid: Pid,
    // Refreshing needs `&mut System`; the probe is only queried by one sampler.
    sys: Mutex<System>,
}

impl ProcessProbe {
    pub fn new(pid: u32) -> Self {
        Self {
            pid: Pid::from_u32(pid),
            sys: Mutex::new(System::new()),
        }
    }

    fn resident_bytes(&self) -> Result<u64, ProbeError> {
        let mut sys = self.sys.lock();

        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );

        sys.process(self.pid)
            .map(|p| p.memory())
            .ok_or_else(|| ProbeError::NotFound(format!("pid {}", self.pid)))
    }
}

#[async_trait]
impl ResourceProbe for ProcessProbe {
    async fn query_mb(&self) -> Result<f64, ProbeError> {
        self.resident_bytes().map(bytes_to_mb)
    }

    fn target(&self) -> String {
        format!("pid:{}", self.pid)
    }
}
