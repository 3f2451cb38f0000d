//! Integration tests for the Docker runner.
//!
//! These tests drive `DockerRunner` through the `Runner` trait against the
//! mock runtime:
//! 1. Container wiring (name, ports, volumes)
//! 2. Registry bookkeeping on success and failure
//! 3. Handle lifecycle and runner cleanup

use std::sync::Arc;
use std::time::Duration;

use nodestart_docker_runner::docker::{tcp_port_key, ContainerStatus, PortBinding};
use nodestart_docker_runner::{DockerRunner, DockerRunnerConfig, MockRuntime};
use nodestart_process::{Process, Runner, Volume};

fn test_runner(config: DockerRunnerConfig) -> (DockerRunner, Arc<MockRuntime>) {
    let runtime = Arc::new(MockRuntime::new());
    let runner = DockerRunner::with_runtime(config, runtime.clone());
    (runner, runtime)
}

fn test_config() -> DockerRunnerConfig {
    DockerRunnerConfig {
        image: "arangodb/arangodb:3.11".to_string(),
        ..Default::default()
    }
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_start_wires_container() {
    let (runner, runtime) = test_runner(test_config());

    let process = runner
        .start(
            "arangod",
            &args(&["--server.endpoint=tcp://0.0.0.0:8529"]),
            &[Volume::new("/host/data", "/data")],
            &[8529],
            "node:1",
        )
        .await
        .unwrap();

    let id = process.container_id().to_string();
    assert_eq!(process.process_id(), 0);
    assert_eq!(runtime.name_of(&id).as_deref(), Some("node1"));
    assert_eq!(runtime.status_of(&id), Some(ContainerStatus::Running));
    assert_eq!(runtime.pull_count(), 1);

    let request = runtime.request_of(&id).unwrap();
    assert_eq!(request.image, "arangodb/arangodb:3.11");
    assert_eq!(request.entrypoint, args(&["arangod"]));
    assert_eq!(request.cmd, args(&["--server.endpoint=tcp://0.0.0.0:8529"]));
    assert!(request.tty);
    assert!(request.exposed_ports.contains_key("8529/tcp"));
    assert_eq!(
        request.host_config.port_bindings[&tcp_port_key(8529)],
        vec![PortBinding::all_interfaces(8529)]
    );
    assert_eq!(request.host_config.binds, args(&["/host/data:/data"]));

    assert!(runner.registry().contains(&id));
    assert!(runner.collector_started());
}

#[tokio::test]
async fn test_start_volumes_from_ignores_volumes() {
    let (runner, runtime) = test_runner(DockerRunnerConfig {
        volumes_from: Some("starter".to_string()),
        user: Some("arangodb".to_string()),
        ..test_config()
    });

    let process = runner
        .start(
            "arangod",
            &[],
            &[Volume::read_only("/host/keys", "/keys")],
            &[],
            "agent8531",
        )
        .await
        .unwrap();

    let request = runtime.request_of(process.container_id()).unwrap();
    assert!(request.host_config.binds.is_empty());
    assert_eq!(request.host_config.volumes_from, args(&["starter"]));
    assert_eq!(request.user.as_deref(), Some("arangodb"));
}

#[tokio::test]
async fn test_pull_failure_creates_nothing() {
    let (runner, runtime) = test_runner(test_config());
    runtime.fail_pulls(true);

    let result = runner.start("arangod", &[], &[], &[], "node1").await;
    assert!(result.is_err());
    assert_eq!(runtime.container_count(), 0);
    assert!(runner.registry().is_empty());
}

#[tokio::test]
async fn test_create_failure_registers_nothing() {
    let (runner, runtime) = test_runner(test_config());
    runtime.fail_creates(true);

    let result = runner.start("arangod", &[], &[], &[], "node1").await;
    assert!(result.is_err());
    assert!(runner.registry().is_empty());
}

#[tokio::test]
async fn test_start_failure_keeps_container_registered() {
    let (runner, runtime) = test_runner(test_config());
    runtime.fail_starts(true);

    let err = match runner.start("arangod", &[], &[], &[], "node1").await {
        Ok(_) => panic!("start should fail"),
        Err(e) => e,
    };
    assert!(!err.is_not_found());
    assert_eq!(runtime.container_count(), 1);
    assert_eq!(runner.registry().len(), 1);

    // Cleanup still reaps the half-started container.
    runner.cleanup().await.unwrap();
    assert_eq!(runtime.container_count(), 0);
    assert!(runner.registry().is_empty());
}

#[tokio::test]
async fn test_duplicate_name_is_surfaced() {
    let (runner, _runtime) = test_runner(test_config());

    runner.start("arangod", &[], &[], &[], "node:1").await.unwrap();
    let result = runner.start("arangod", &[], &[], &[], "node1").await;
    assert!(result.is_err());
    assert_eq!(runner.registry().len(), 1);
}

#[tokio::test]
async fn test_pull_before_every_create() {
    let (runner, runtime) = test_runner(test_config());

    for i in 0..3 {
        runner
            .start("arangod", &[], &[], &[], &format!("node{i}"))
            .await
            .unwrap();
    }
    assert_eq!(runtime.pull_count(), 3);
    assert_eq!(runner.registry().len(), 3);
}

#[tokio::test]
async fn test_handle_lifecycle_is_idempotent() {
    let (runner, runtime) = test_runner(test_config());

    let process = runner.start("arangod", &[], &[], &[], "node1").await.unwrap();
    let id = process.container_id().to_string();

    process.terminate().await.unwrap();
    assert_eq!(runtime.status_of(&id), Some(ContainerStatus::Exited));

    // Killing a stopped container is reported, not a panic.
    assert!(process.kill().await.is_err());

    process.cleanup().await.unwrap();
    assert!(!runtime.contains(&id));
    assert!(!runner.registry().contains(&id));

    // Everything again on a removed container.
    assert!(process.terminate().await.unwrap_err().is_not_found());
    assert!(process.kill().await.unwrap_err().is_not_found());
    process.cleanup().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), process.wait())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_wait_raced_against_timeout_then_kill() {
    let (runner, runtime) = test_runner(test_config());

    let process = runner.start("arangod", &[], &[], &[], "node1").await.unwrap();

    let waited = tokio::time::timeout(Duration::from_millis(20), process.wait()).await;
    assert!(waited.is_err());

    process.kill().await.unwrap();
    process.wait().await;
    assert_eq!(
        runtime.status_of(process.container_id()),
        Some(ContainerStatus::Exited)
    );
}

#[tokio::test]
async fn test_cleanup_removes_everything() {
    let (runner, runtime) = test_runner(test_config());

    let mut ids = Vec::new();
    for i in 0..4 {
        let process = runner
            .start("arangod", &[], &[], &[], &format!("node{i}"))
            .await
            .unwrap();
        ids.push(process.container_id().to_string());
    }

    // One disappeared behind our back, one refuses removal.
    runtime.forget(&ids[0]);
    runtime.fail_remove(&ids[1], true);

    runner.cleanup().await.unwrap();
    assert!(runner.registry().is_empty());
    assert!(!runtime.contains(&ids[2]));
    assert!(!runtime.contains(&ids[3]));
    // Cleanup is best-effort; the failed removal leaks.
    assert!(runtime.contains(&ids[1]));
}

#[tokio::test]
async fn test_concurrent_starts() {
    let (runner, runtime) = test_runner(test_config());
    let runner = Arc::new(runner);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move {
                runner
                    .start("arangod", &[], &[], &[8529 + i], &format!("node:{i}"))
                    .await
                    .map(|p| p.container_id().to_string())
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(runner.registry().len(), 16);
    assert_eq!(runtime.container_count(), 16);
    assert!(ids.iter().all(|id| runner.registry().contains(id)));
    assert!(runner.collector_started());
}
