//! Runner and process handle traits.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::ExecError;

/// Port distance between the nodes of consecutive launchers on one host.
pub const PORT_OFFSET_INCREMENT: u16 = 5;

/// A host directory made available inside the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Path on the host.
    pub host_path: PathBuf,

    /// Path inside the container.
    pub container_path: PathBuf,

    /// Mount read-only.
    pub read_only: bool,
}

impl Volume {
    /// Create a read-write volume.
    pub fn new(host_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }

    /// Create a read-only volume.
    pub fn read_only(host_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Self {
        Self {
            read_only: true,
            ..Self::new(host_path, container_path)
        }
    }
}

/// Starts processes and reclaims what they leave behind.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Start `command` with `args`, wiring the given volumes and ports.
    ///
    /// `name` identifies the process to the backend; backends may sanitize it.
    async fn start(
        &self,
        command: &str,
        args: &[String],
        volumes: &[Volume],
        ports: &[u16],
        name: &str,
    ) -> Result<Box<dyn Process>, ExecError>;

    /// Translate a host data directory into the path the process sees.
    fn container_dir(&self, host_dir: &Path) -> PathBuf;

    /// Shell snippet an operator can run on another host to start launcher
    /// number `index` that joins the master at `master_ip`.
    fn start_command_hint(&self, index: u16, master_ip: &str, master_port: Option<u16>) -> String;

    /// Release everything the runner still tracks.
    ///
    /// Called once at shutdown, after all processes have been stopped.
    async fn cleanup(&self) -> Result<(), ExecError>;
}

/// Control surface for one started process.
#[async_trait]
pub trait Process: Send + Sync {
    /// OS process id, or 0 when the process has no meaningful local pid.
    fn process_id(&self) -> u32;

    /// Container id, or an empty string for bare processes.
    fn container_id(&self) -> &str;

    /// Wait until the process has terminated.
    async fn wait(&self);

    /// Ask the process to stop gracefully.
    async fn terminate(&self) -> Result<(), ExecError>;

    /// Stop the process immediately.
    async fn kill(&self) -> Result<(), ExecError>;

    /// Release resources held for the process.
    async fn cleanup(&self) -> Result<(), ExecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_constructors() {
        let rw = Volume::new("/host/data", "/data");
        assert_eq!(rw.host_path, PathBuf::from("/host/data"));
        assert_eq!(rw.container_path, PathBuf::from("/data"));
        assert!(!rw.read_only);

        let ro = Volume::read_only("/host/secrets", "/secrets");
        assert!(ro.read_only);
        assert_eq!(ro.container_path, PathBuf::from("/secrets"));
    }
}
