//! Docker runtime implementation.
//!
//! This module provides the production `ContainerRuntime`, talking to the
//! Docker daemon over its Unix socket.
//!
//! ## Components
//!
//! - `api`: HTTP client for the Docker Engine API
//! - `model`: request and response bodies
//! - `reference`: image reference parsing
//! - `runtime`: `ContainerRuntime` trait implementation

mod api;
mod model;
mod reference;
mod runtime;

pub use api::{DockerClient, DockerError};
pub use model::{
    tcp_port_key, ContainerInspect, ContainerState, ContainerStatus, CreateContainerRequest,
    EmptyObject, HostConfig, PortBinding,
};
pub use reference::parse_repository_tag;
pub use runtime::DockerRuntime;
