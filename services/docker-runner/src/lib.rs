//! nodestart Docker runner library
//!
//! Runs database-node processes in Docker containers on behalf of the
//! nodestart launcher, implementing the `Runner` and `Process` traits from
//! `nodestart-process`.
//!
//! ## Architecture
//!
//! ```text
//! DockerRunner ──start──▶ ContainerRuntime (pull, create, start)
//!      │                        ▲
//!      ├── ContainerRegistry ◀──┤ (record / unrecord)
//!      │                        │
//!      └── Collector ───────────┘ (inspect, remove; spawned on first start)
//! ```
//!
//! ## Modules
//!
//! - `docker`: Docker Engine API client and the production runtime
//! - `runtime`: Runtime interface and mock implementation
//! - `registry`: Tracking of created containers
//! - `runner`: The `Runner` implementation
//! - `process`: The per-container `Process` handle
//! - `gc`: Background garbage collector

pub mod config;
pub mod docker;
pub mod gc;
pub mod process;
pub mod registry;
pub mod runner;
pub mod runtime;

// Re-export commonly used types
pub use gc::{CollectionReport, Collector, CollectorConfig};
pub use process::DockerContainer;
pub use registry::ContainerRegistry;
pub use runner::{DockerRunner, DockerRunnerConfig};
pub use runtime::{ContainerRuntime, MockRuntime};
