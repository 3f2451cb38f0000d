//! Docker-backed `Runner`.
//!
//! Starts each process in its own container:
//! - Pulls the configured image before every create
//! - Publishes each requested port on the same host port
//! - Bind-mounts the requested volumes, or inherits the volumes of a
//!   configured container
//!
//! Every created container is recorded so it can be reclaimed by the
//! garbage collector or by `cleanup`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use nodestart_process::{ExecError, Process, Runner, Volume, PORT_OFFSET_INCREMENT};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::docker::{
    parse_repository_tag, tcp_port_key, CreateContainerRequest, DockerRuntime, EmptyObject,
    HostConfig, PortBinding,
};
use crate::gc::{Collector, CollectorConfig, DEFAULT_GC_DELAY, DEFAULT_GC_INTERVAL};
use crate::process::{DockerContainer, STOP_CONTAINER_TIMEOUT};
use crate::registry::ContainerRegistry;
use crate::runtime::ContainerRuntime;

/// Data directory inside a container that inherits its volumes.
pub const CONTAINER_DATA_DIR: &str = "/data";

/// Image used in the start command hint for additional launchers.
const LAUNCHER_IMAGE: &str = "arangodb/arangodb-starter";

/// Port the launcher container listens on.
const LAUNCHER_PORT: u16 = 4000;

/// Configuration for the Docker runner.
#[derive(Debug, Clone)]
pub struct DockerRunnerConfig {
    /// Unix socket of the Docker daemon.
    pub endpoint: PathBuf,
    /// Image every container runs.
    pub image: String,
    /// User to run containers as.
    pub user: Option<String>,
    /// Container whose volumes are inherited instead of bind mounts.
    pub volumes_from: Option<String>,
    /// Minimum age before the collector considers a container.
    pub gc_delay: Duration,
    /// Interval between collector passes.
    pub gc_interval: Duration,
    /// Graceful stop timeout before the runtime kills a container.
    pub stop_timeout: Duration,
}

impl Default for DockerRunnerConfig {
    fn default() -> Self {
        Self {
            endpoint: PathBuf::from("/var/run/docker.sock"),
            image: "arangodb/arangodb:latest".to_string(),
            user: None,
            volumes_from: None,
            gc_delay: DEFAULT_GC_DELAY,
            gc_interval: DEFAULT_GC_INTERVAL,
            stop_timeout: STOP_CONTAINER_TIMEOUT,
        }
    }
}

/// Runner that starts processes in Docker containers.
pub struct DockerRunner {
    config: DockerRunnerConfig,
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<ContainerRegistry>,
    collector: OnceLock<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl DockerRunner {
    /// Connect to the Docker daemon at `config.endpoint`.
    pub fn connect(config: DockerRunnerConfig) -> Result<Self, ExecError> {
        let endpoint = config.endpoint.to_string_lossy().to_string();
        let runtime = DockerRuntime::connect(&endpoint)?;
        Ok(Self::with_runtime(config, Arc::new(runtime)))
    }

    /// Create a runner over an existing runtime.
    pub fn with_runtime(config: DockerRunnerConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            runtime,
            registry: Arc::new(ContainerRegistry::new()),
            collector: OnceLock::new(),
            shutdown,
        }
    }

    /// The runner's configuration.
    pub fn config(&self) -> &DockerRunnerConfig {
        &self.config
    }

    /// Containers created by this runner and not yet removed.
    pub fn registry(&self) -> &Arc<ContainerRegistry> {
        &self.registry
    }

    /// A collector over this runner's runtime and registry.
    pub fn collector(&self) -> Collector {
        Collector::new(
            Arc::clone(&self.runtime),
            Arc::clone(&self.registry),
            CollectorConfig {
                gc_delay: self.config.gc_delay,
                interval: self.config.gc_interval,
            },
        )
    }

    /// True once the background collector has been spawned.
    pub fn collector_started(&self) -> bool {
        self.collector.get().is_some()
    }

    /// Spawn the background collector unless it is already running.
    fn ensure_collector(&self) {
        self.collector.get_or_init(|| {
            let collector = self.collector();
            let shutdown = self.shutdown.subscribe();
            tokio::spawn(collector.run(shutdown))
        });
    }

    /// Build the create request for one container.
    pub fn create_request(
        &self,
        command: &str,
        args: &[String],
        volumes: &[Volume],
        ports: &[u16],
    ) -> CreateContainerRequest {
        let mut host_config = HostConfig {
            publish_all_ports: true,
            auto_remove: false,
            ..Default::default()
        };
        match &self.config.volumes_from {
            Some(container) => host_config.volumes_from.push(container.clone()),
            None => host_config.binds = volumes.iter().map(bind_spec).collect(),
        }

        let mut request = CreateContainerRequest {
            image: self.config.image.clone(),
            entrypoint: vec![command.to_string()],
            cmd: args.to_vec(),
            tty: true,
            user: self.config.user.clone(),
            ..Default::default()
        };
        for &port in ports {
            let key = tcp_port_key(port);
            request.exposed_ports.insert(key.clone(), EmptyObject {});
            host_config
                .port_bindings
                .insert(key, vec![PortBinding::all_interfaces(port)]);
        }
        request.host_config = host_config;
        request
    }

    fn handle(&self, id: String) -> DockerContainer {
        DockerContainer::new(id, Arc::clone(&self.runtime), Arc::clone(&self.registry))
            .with_stop_timeout(self.config.stop_timeout)
    }
}

/// Docker does not accept `:` in container names.
pub fn sanitize_container_name(name: &str) -> String {
    name.replace(':', "")
}

/// Bind mount string for a volume, `host:container[:ro]`.
fn bind_spec(volume: &Volume) -> String {
    let bind = format!(
        "{}:{}",
        volume.host_path.display(),
        volume.container_path.display()
    );
    if volume.read_only {
        bind + ":ro"
    } else {
        bind
    }
}

#[async_trait]
impl Runner for DockerRunner {
    async fn start(
        &self,
        command: &str,
        args: &[String],
        volumes: &[Volume],
        ports: &[u16],
        name: &str,
    ) -> Result<Box<dyn Process>, ExecError> {
        self.ensure_collector();

        let (repository, tag) = parse_repository_tag(&self.config.image);
        debug!(repository, tag, "Pulling image");
        self.runtime.pull_image(repository, tag).await?;

        let name = sanitize_container_name(name);
        let request = self.create_request(command, args, volumes, ports);
        debug!(name = %name, "Creating container");
        let id = self.runtime.create_container(&name, &request).await?;
        self.registry.record(&id);

        debug!(name = %name, container_id = %id, "Starting container");
        self.runtime.start_container(&id).await?;
        debug!(name = %name, container_id = %id, "Started container");

        Ok(Box::new(self.handle(id)))
    }

    fn container_dir(&self, host_dir: &Path) -> PathBuf {
        if self.config.volumes_from.is_some() {
            PathBuf::from(CONTAINER_DATA_DIR)
        } else {
            host_dir.to_path_buf()
        }
    }

    fn start_command_hint(&self, index: u16, master_ip: &str, master_port: Option<u16>) -> String {
        let offset = PORT_OFFSET_INCREMENT.saturating_mul(index.saturating_sub(1));
        let (join, host_port) = match master_port {
            Some(port) => (format!("{master_ip}:{port}"), port.saturating_add(offset)),
            None => (master_ip.to_string(), LAUNCHER_PORT.saturating_add(offset)),
        };
        [
            format!("docker volume create arangodb{index} &&"),
            format!(
                "docker run -it --name=adb{index} --rm -p {host_port}:{LAUNCHER_PORT} \
                 -v arangodb{index}:/data -v /var/run/docker.sock:/var/run/docker.sock \
                 {LAUNCHER_IMAGE}"
            ),
            format!("--dockerContainer=adb{index} --ownAddress={master_ip} --join={join}"),
        ]
        .join(" \\\n    ")
    }

    async fn cleanup(&self) -> Result<(), ExecError> {
        // Stops the collector; no starts follow cleanup.
        self.shutdown.send_replace(true);

        for id in self.registry.drain() {
            info!(container_id = %id, "Removing container");
            match self.runtime.remove_container(&id, true).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(container_id = %id, "Container already removed");
                }
                Err(e) => {
                    warn!(container_id = %id, error = %e, "Failed to remove container");
                }
            }
        }
        Ok(())
    }
}
