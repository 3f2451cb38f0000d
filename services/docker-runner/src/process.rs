//! Per-container process handle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodestart_process::{ExecError, Process};
use tracing::{debug, info, warn};

use crate::registry::ContainerRegistry;
use crate::runtime::ContainerRuntime;

/// Seconds the runtime waits after a graceful stop before it kills.
pub const STOP_CONTAINER_TIMEOUT: Duration = Duration::from_secs(60);

/// Exponential backoff between `wait` retries.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Calculate delay for the given attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Handle to a container started by the Docker runner.
pub struct DockerContainer {
    id: String,
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<ContainerRegistry>,
    stop_timeout: Duration,
    backoff: BackoffPolicy,
}

impl DockerContainer {
    /// Create a handle for container `id`.
    pub fn new(
        id: String,
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<ContainerRegistry>,
    ) -> Self {
        Self {
            id,
            runtime,
            registry,
            stop_timeout: STOP_CONTAINER_TIMEOUT,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Override the graceful stop timeout.
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Override the backoff between `wait` retries.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl Process for DockerContainer {
    fn process_id(&self) -> u32 {
        0
    }

    fn container_id(&self) -> &str {
        &self.id
    }

    async fn wait(&self) {
        let mut attempt = 0u32;
        loop {
            match self.runtime.wait_container(&self.id).await {
                Ok(exit_code) => {
                    debug!(container_id = %self.id, exit_code, "Container exited");
                    return;
                }
                Err(e) if e.is_not_found() => {
                    debug!(container_id = %self.id, "Container no longer exists");
                    return;
                }
                Err(e) if e.is_transient() => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        container_id = %self.id,
                        error = %e,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        "Wait for container interrupted, retrying"
                    );
                    attempt = attempt.saturating_add(1);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(container_id = %self.id, error = %e, "Failed to wait for container");
                    return;
                }
            }
        }
    }

    async fn terminate(&self) -> Result<(), ExecError> {
        debug!(
            container_id = %self.id,
            timeout_secs = self.stop_timeout.as_secs(),
            "Stopping container"
        );
        self.runtime
            .stop_container(&self.id, self.stop_timeout)
            .await
    }

    async fn kill(&self) -> Result<(), ExecError> {
        debug!(container_id = %self.id, "Killing container");
        self.runtime.kill_container(&self.id).await
    }

    async fn cleanup(&self) -> Result<(), ExecError> {
        info!(container_id = %self.id, "Removing container");
        match self.runtime.remove_container(&self.id, true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(container_id = %self.id, "Container already removed");
            }
            Err(e) => return Err(e),
        }
        self.registry.unrecord(&self.id);
        Ok(())
    }
}
