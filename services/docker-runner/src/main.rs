//! nodestart Docker runner
//!
//! Starts one database node in a container and keeps it running until it
//! exits or the runner is interrupted:
//!
//! ```text
//! docker-runner <command> [args...]
//! ```
//!
//! On Ctrl-C the container is stopped gracefully (killed if that fails), then
//! removed together with everything else the runner created.

use anyhow::{bail, Result};
use nodestart_docker_runner::config::Config;
use nodestart_docker_runner::DockerRunner;
use nodestart_process::Runner;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        bail!("usage: docker-runner <command> [args...]");
    };
    let args: Vec<String> = args.collect();

    info!(
        endpoint = %config.endpoint.display(),
        image = %config.image,
        volumes_from = ?config.volumes_from,
        gc_delay_secs = config.gc_delay_secs,
        "Configuration loaded"
    );

    let runner = DockerRunner::connect(config.runner_config())?;

    let name = format!("nodestart-{}", std::process::id());
    let process = runner.start(&command, &args, &[], &[], &name).await?;
    info!(container_id = %process.container_id(), "Container started");

    tokio::select! {
        _ = process.wait() => {
            info!(container_id = %process.container_id(), "Container exited");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            if let Err(e) = process.terminate().await {
                warn!(error = %e, "Graceful stop failed, killing container");
                if let Err(e) = process.kill().await {
                    error!(error = %e, "Failed to kill container");
                }
            }
        }
    }

    if let Err(e) = process.cleanup().await {
        warn!(error = %e, "Failed to remove container");
    }
    runner.cleanup().await?;

    info!("Docker runner shutdown complete");
    Ok(())
}
