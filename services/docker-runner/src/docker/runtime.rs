//! Docker-backed `ContainerRuntime`.

use std::time::Duration;

use async_trait::async_trait;
use nodestart_process::ExecError;
use tracing::debug;

use crate::runtime::ContainerRuntime;

use super::api::{DockerClient, DockerError};
use super::model::{ContainerInspect, CreateContainerRequest};

impl From<DockerError> for ExecError {
    fn from(err: DockerError) -> Self {
        if err.is_not_found() {
            ExecError::NotFound(err.to_string())
        } else if err.is_transient() {
            ExecError::Transient(err.to_string())
        } else {
            ExecError::Fatal(err.to_string())
        }
    }
}

/// Container runtime that talks to a Docker daemon.
pub struct DockerRuntime {
    client: DockerClient,
}

impl DockerRuntime {
    /// Wrap a connected client.
    pub fn new(client: DockerClient) -> Self {
        Self { client }
    }

    /// Connect to the daemon listening on `socket_path`.
    ///
    /// Fails when the socket does not exist.
    pub fn connect(socket_path: &str) -> Result<Self, ExecError> {
        let client = DockerClient::new(socket_path);
        if !client.socket_exists() {
            return Err(DockerError::SocketNotFound(socket_path.to_string()).into());
        }
        debug!(socket = socket_path, "Connected to Docker daemon");
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn pull_image(&self, repository: &str, tag: &str) -> Result<(), ExecError> {
        Ok(self.client.pull_image(repository, tag).await?)
    }

    async fn create_container(
        &self,
        name: &str,
        request: &CreateContainerRequest,
    ) -> Result<String, ExecError> {
        let response = self.client.create_container(name, request).await?;
        for warning in response.warnings.unwrap_or_default() {
            debug!(container_id = %response.id, warning = %warning, "Create warning");
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), ExecError> {
        Ok(self.client.start_container(id).await?)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect, ExecError> {
        Ok(self.client.inspect_container(id).await?)
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), ExecError> {
        Ok(self.client.stop_container(id, timeout).await?)
    }

    async fn kill_container(&self, id: &str) -> Result<(), ExecError> {
        Ok(self.client.kill_container(id).await?)
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), ExecError> {
        Ok(self.client.remove_container(id, force).await?)
    }

    async fn wait_container(&self, id: &str) -> Result<i64, ExecError> {
        let response = self.client.wait_container(id).await?;
        if let Some(error) = response.error.filter(|e| !e.message.is_empty()) {
            return Err(ExecError::Fatal(error.message));
        }
        Ok(response.status_code)
    }
}
