//! Container runtime interface and mock implementation.
//!
//! The runtime interface abstracts the container lifecycle calls the runner
//! and the garbage collector make:
//! - Pulling images
//! - Creating, starting, stopping, killing and removing containers
//! - Inspecting and waiting for containers
//!
//! Implementations own no runner state. A mock implementation is provided for
//! testing and development.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodestart_process::ExecError;
use tokio::sync::Notify;
use tracing::debug;

use crate::docker::{ContainerInspect, ContainerState, ContainerStatus, CreateContainerRequest};

/// Container runtime interface.
///
/// Every method is a round-trip to the runtime. Errors are classified so
/// callers can tell a missing container (`ExecError::NotFound`) apart from
/// real failures.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pull `repository:tag`.
    async fn pull_image(&self, repository: &str, tag: &str) -> Result<(), ExecError>;

    /// Create a container named `name`, returning its id.
    async fn create_container(
        &self,
        name: &str,
        request: &CreateContainerRequest,
    ) -> Result<String, ExecError>;

    /// Start a created container.
    async fn start_container(&self, id: &str) -> Result<(), ExecError>;

    /// Inspect a container.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect, ExecError>;

    /// Stop a container gracefully; the runtime kills it after `timeout`.
    /// Stopping an already stopped container succeeds.
    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), ExecError>;

    /// Kill a running container.
    async fn kill_container(&self, id: &str) -> Result<(), ExecError>;

    /// Remove a container. With `force`, a running container is killed first.
    async fn remove_container(&self, id: &str, force: bool) -> Result<(), ExecError>;

    /// Wait until a container is no longer running; returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, ExecError>;
}

/// A container held by the mock runtime.
#[derive(Debug, Clone)]
struct MockContainer {
    name: String,
    request: CreateContainerRequest,
    inspect: ContainerInspect,
}

/// Injected failures.
#[derive(Debug, Default)]
struct Faults {
    fail_pulls: bool,
    fail_creates: bool,
    fail_starts: bool,
    inspect: HashSet<String>,
    remove: HashSet<String>,
    waits: u32,
}

/// In-memory runtime for testing and development.
///
/// Containers follow the Docker state machine closely enough for the runner:
/// names are unique, `kill` fails on a stopped container, a non-forced
/// `remove` fails on a running one, and `wait` blocks while a container runs.
pub struct MockRuntime {
    containers: Mutex<HashMap<String, MockContainer>>,
    faults: Mutex<Faults>,
    id_counter: AtomicU64,
    pulls: AtomicU64,
    changed: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockRuntime {
    /// Create a new mock runtime.
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
            id_counter: AtomicU64::new(0),
            pulls: AtomicU64::new(0),
            changed: Notify::new(),
        }
    }

    /// Make all image pulls fail.
    pub fn fail_pulls(&self, fail: bool) {
        lock(&self.faults).fail_pulls = fail;
    }

    /// Make all container creations fail.
    pub fn fail_creates(&self, fail: bool) {
        lock(&self.faults).fail_creates = fail;
    }

    /// Make all container starts fail.
    pub fn fail_starts(&self, fail: bool) {
        lock(&self.faults).fail_starts = fail;
    }

    /// Make inspecting `id` fail with a transient error.
    pub fn fail_inspect(&self, id: &str, fail: bool) {
        let mut faults = lock(&self.faults);
        if fail {
            faults.inspect.insert(id.to_string());
        } else {
            faults.inspect.remove(id);
        }
    }

    /// Make removing `id` fail.
    pub fn fail_remove(&self, id: &str, fail: bool) {
        let mut faults = lock(&self.faults);
        if fail {
            faults.remove.insert(id.to_string());
        } else {
            faults.remove.remove(id);
        }
    }

    /// Make the next `count` waits fail with a transient error.
    pub fn fail_next_waits(&self, count: u32) {
        lock(&self.faults).waits = count;
    }

    /// Number of image pulls performed.
    pub fn pull_count(&self) -> u64 {
        self.pulls.load(Ordering::SeqCst)
    }

    /// Number of containers that currently exist.
    pub fn container_count(&self) -> usize {
        lock(&self.containers).len()
    }

    /// Check whether a container exists.
    pub fn contains(&self, id: &str) -> bool {
        lock(&self.containers).contains_key(id)
    }

    /// Name a container was created with.
    pub fn name_of(&self, id: &str) -> Option<String> {
        lock(&self.containers).get(id).map(|c| c.name.clone())
    }

    /// Request a container was created with.
    pub fn request_of(&self, id: &str) -> Option<CreateContainerRequest> {
        lock(&self.containers).get(id).map(|c| c.request.clone())
    }

    /// Current status of a container.
    pub fn status_of(&self, id: &str) -> Option<ContainerStatus> {
        lock(&self.containers)
            .get(id)
            .map(|c| c.inspect.state.status)
    }

    /// Let a running container exit with `exit_code`.
    pub fn exit(&self, id: &str, exit_code: i64) {
        self.update(id, |inspect| {
            if inspect.state.status.is_active() {
                inspect.state.status = ContainerStatus::Exited;
                inspect.state.exit_code = exit_code;
                inspect.state.finished_at = Utc::now();
            }
        });
    }

    /// Override the runtime-reported finish time of a container.
    pub fn set_finished_at(&self, id: &str, finished_at: DateTime<Utc>) {
        self.update(id, |inspect| inspect.state.finished_at = finished_at);
    }

    /// Override the runtime-reported creation time of a container.
    pub fn set_created(&self, id: &str, created: DateTime<Utc>) {
        self.update(id, |inspect| inspect.created = created);
    }

    /// Remove a container behind the runner's back.
    pub fn forget(&self, id: &str) {
        lock(&self.containers).remove(id);
        self.changed.notify_waiters();
    }

    fn update<F: FnOnce(&mut ContainerInspect)>(&self, id: &str, f: F) {
        if let Some(container) = lock(&self.containers).get_mut(id) {
            f(&mut container.inspect);
        }
        self.changed.notify_waiters();
    }

    fn not_found(id: &str) -> ExecError {
        ExecError::NotFound(format!("No such container: {id}"))
    }

    /// Status and exit code, or `NotFound`.
    fn current_state(&self, id: &str) -> Result<(ContainerStatus, i64), ExecError> {
        lock(&self.containers)
            .get(id)
            .map(|c| (c.inspect.state.status, c.inspect.state.exit_code))
            .ok_or_else(|| Self::not_found(id))
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn pull_image(&self, repository: &str, tag: &str) -> Result<(), ExecError> {
        if lock(&self.faults).fail_pulls {
            return Err(ExecError::Fatal(format!(
                "[MOCK] pull access denied for {repository}"
            )));
        }
        self.pulls.fetch_add(1, Ordering::SeqCst);
        debug!(repository, tag, "[MOCK] Pulled image");
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        request: &CreateContainerRequest,
    ) -> Result<String, ExecError> {
        if lock(&self.faults).fail_creates {
            return Err(ExecError::Fatal("[MOCK] create failed".to_string()));
        }

        let mut containers = lock(&self.containers);
        if containers.values().any(|c| c.name == name) {
            return Err(ExecError::Fatal(format!(
                "Conflict. The container name \"/{name}\" is already in use"
            )));
        }

        let counter = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("mock_{counter:016x}");
        let never = DateTime::<Utc>::default();
        containers.insert(
            id.clone(),
            MockContainer {
                name: name.to_string(),
                request: request.clone(),
                inspect: ContainerInspect {
                    id: id.clone(),
                    name: format!("/{name}"),
                    created: Utc::now(),
                    state: ContainerState {
                        status: ContainerStatus::Created,
                        exit_code: 0,
                        started_at: never,
                        finished_at: never,
                    },
                },
            },
        );
        debug!(container_id = %id, name, "[MOCK] Created container");
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), ExecError> {
        if lock(&self.faults).fail_starts {
            return Err(ExecError::Fatal("[MOCK] start failed".to_string()));
        }
        {
            let mut containers = lock(&self.containers);
            let container = containers.get_mut(id).ok_or_else(|| Self::not_found(id))?;
            if !container.inspect.state.status.is_active() {
                container.inspect.state.status = ContainerStatus::Running;
                container.inspect.state.started_at = Utc::now();
            }
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect, ExecError> {
        if lock(&self.faults).inspect.contains(id) {
            return Err(ExecError::Transient("[MOCK] connection reset".to_string()));
        }
        lock(&self.containers)
            .get(id)
            .map(|c| c.inspect.clone())
            .ok_or_else(|| Self::not_found(id))
    }

    async fn stop_container(&self, id: &str, _timeout: Duration) -> Result<(), ExecError> {
        {
            let mut containers = lock(&self.containers);
            let state = &mut containers
                .get_mut(id)
                .ok_or_else(|| Self::not_found(id))?
                .inspect
                .state;
            if state.status.is_active() {
                state.status = ContainerStatus::Exited;
                state.exit_code = 0;
                state.finished_at = Utc::now();
            }
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn kill_container(&self, id: &str) -> Result<(), ExecError> {
        {
            let mut containers = lock(&self.containers);
            let state = &mut containers
                .get_mut(id)
                .ok_or_else(|| Self::not_found(id))?
                .inspect
                .state;
            if !state.status.is_active() {
                return Err(ExecError::Fatal(format!("Container {id} is not running")));
            }
            state.status = ContainerStatus::Exited;
            state.exit_code = 137;
            state.finished_at = Utc::now();
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), ExecError> {
        if lock(&self.faults).remove.contains(id) {
            return Err(ExecError::Fatal(format!(
                "[MOCK] removal of container {id} failed"
            )));
        }
        {
            let mut containers = lock(&self.containers);
            let container = containers.get(id).ok_or_else(|| Self::not_found(id))?;
            if container.inspect.state.status.is_active() && !force {
                return Err(ExecError::Fatal(format!(
                    "You cannot remove a running container {id}"
                )));
            }
            containers.remove(id);
        }
        self.changed.notify_waiters();
        debug!(container_id = %id, force, "[MOCK] Removed container");
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, ExecError> {
        {
            let mut faults = lock(&self.faults);
            if faults.waits > 0 {
                faults.waits -= 1;
                return Err(ExecError::Transient("[MOCK] connection reset".to_string()));
            }
        }

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (status, exit_code) = self.current_state(id)?;
            if !status.is_active() {
                return Ok(exit_code);
            }
            notified.await;
        }
    }
}
