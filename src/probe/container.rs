use async_trait::async_trait;

use super::ResourceProbe;
use crate::error::ProbeError;
use crate::target::DockerCli;

/// Samples a running container through `docker stats`.
pub struct ContainerProbe {
    docker: DockerCli,
    name: String,
}

impl ContainerProbe {
    pub fn new(docker: DockerCli, name: impl Into<String>) -> Self {
        Self {
            docker,
            name: name.into(),
        }
    }
}

#[async_trait]
impl ResourceProbe for ContainerProbe {
    async fn query_mb(&self) -> Result<f64, ProbeError> {
        self.docker.query_resource_usage(&self.name).await
    }

    fn target(&self) -> String {
        format!("container:{}", self.name)
    }
}
