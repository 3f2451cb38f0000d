//! Configuration for the Docker runner.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::gc::{DEFAULT_GC_DELAY, DEFAULT_GC_INTERVAL};
use crate::process::STOP_CONTAINER_TIMEOUT;
use crate::runner::DockerRunnerConfig;

/// Docker runner configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unix socket of the Docker daemon.
    pub endpoint: PathBuf,

    /// Image to run database nodes from.
    pub image: String,

    /// Fixed user to run containers as.
    pub user: Option<String>,

    /// Container to inherit volumes from.
    pub volumes_from: Option<String>,

    /// Minimum container age before garbage collection, in seconds.
    pub gc_delay_secs: u64,

    /// Interval between garbage collection passes, in seconds.
    pub gc_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from `lookup`, which maps a variable name to its
    /// value. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let endpoint = var("NODESTART_DOCKER_ENDPOINT")
            .map(|s| {
                s.strip_prefix("unix://")
                    .map(str::to_string)
                    .unwrap_or(s)
            })
            .unwrap_or_else(|| "/var/run/docker.sock".to_string());

        let image =
            var("NODESTART_DOCKER_IMAGE").unwrap_or_else(|| "arangodb/arangodb:latest".to_string());

        let user = var("NODESTART_DOCKER_USER");
        let volumes_from = var("NODESTART_DOCKER_VOLUMES_FROM");

        let gc_delay_secs = var("NODESTART_DOCKER_GC_DELAY_SECS")
            .map(|s| s.parse::<u64>())
            .transpose()
            .context("invalid NODESTART_DOCKER_GC_DELAY_SECS")?
            .unwrap_or(DEFAULT_GC_DELAY.as_secs());

        let gc_interval_secs = var("NODESTART_DOCKER_GC_INTERVAL_SECS")
            .map(|s| s.parse::<u64>())
            .transpose()
            .context("invalid NODESTART_DOCKER_GC_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_GC_INTERVAL.as_secs());

        let log_level = var("NODESTART_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            endpoint: PathBuf::from(endpoint),
            image,
            user,
            volumes_from,
            gc_delay_secs,
            gc_interval_secs,
            log_level,
        })
    }

    /// Runner configuration derived from this configuration.
    pub fn runner_config(&self) -> DockerRunnerConfig {
        DockerRunnerConfig {
            endpoint: self.endpoint.clone(),
            image: self.image.clone(),
            user: self.user.clone(),
            volumes_from: self.volumes_from.clone(),
            gc_delay: Duration::from_secs(self.gc_delay_secs),
            gc_interval: Duration::from_secs(self.gc_interval_secs.max(1)),
            stop_timeout: STOP_CONTAINER_TIMEOUT,
        }
    }
}
