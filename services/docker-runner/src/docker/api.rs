//! Docker Engine HTTP API client.
//!
//! This module provides an HTTP client for the Docker daemon's Unix socket
//! API. It covers the container lifecycle calls the runner needs and nothing
//! more.
//!
//! Reference: https://docs.docker.com/engine/api/latest/

use std::path::Path;
use std::time::Duration;

use hyper::body::Bytes;
use hyper::{Body, Client, Method, Request, StatusCode};
use hyperlocal::{UnixClientExt, UnixConnector, Uri};
use thiserror::Error;
use tracing::{debug, error};
use urlencoding::encode;

use super::model::{
    ContainerInspect, CreateContainerRequest, CreateContainerResponse, ErrorResponse,
    PullProgress, WaitResponse,
};

/// Errors from the Docker API.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("image pull failed: {0}")]
    Pull(String),

    #[error("Socket not found: {0}")]
    SocketNotFound(String),
}

impl DockerError {
    /// True if the daemon reported that the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DockerError::Api { status: 404, .. })
    }

    /// True if the request may succeed when repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            DockerError::Http(_) => true,
            DockerError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Docker API client for Unix socket communication.
pub struct DockerClient {
    socket_path: String,
    client: Client<UnixConnector>,
}

impl DockerClient {
    /// Create a new Docker client for the given socket path.
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        let socket_path = socket_path.as_ref().to_string_lossy().to_string();
        let client = Client::unix();
        Self {
            socket_path,
            client,
        }
    }

    /// Check if the socket exists.
    pub fn socket_exists(&self) -> bool {
        Path::new(&self.socket_path).exists()
    }

    /// The socket this client talks to.
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Pull an image. An empty tag pulls `latest`.
    pub async fn pull_image(&self, repository: &str, tag: &str) -> Result<(), DockerError> {
        let tag = if tag.is_empty() { "latest" } else { tag };
        let path = format!(
            "/images/create?fromImage={}&tag={}",
            encode(repository),
            encode(tag)
        );
        let body = self.post(&path, None).await?;

        check_pull_progress(&body).inspect_err(|e| {
            error!(repository, tag, error = %e, "Image pull failed");
        })
    }

    /// Create a container.
    pub async fn create_container(
        &self,
        name: &str,
        request: &CreateContainerRequest,
    ) -> Result<CreateContainerResponse, DockerError> {
        let path = format!("/containers/create?name={}", encode(name));
        let body = self.post(&path, Some(serde_json::to_vec(request)?)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Start a created container. Starting a running container is a no-op.
    pub async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        let path = format!("/containers/{}/start", encode(id));
        self.post_allow_not_modified(&path).await
    }

    /// Inspect a container.
    pub async fn inspect_container(&self, id: &str) -> Result<ContainerInspect, DockerError> {
        let path = format!("/containers/{}/json", encode(id));
        let body = self.send(Method::GET, &path, None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Stop a container, killing it after `timeout`. Stopping a stopped
    /// container is a no-op.
    pub async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), DockerError> {
        let path = format!("/containers/{}/stop?t={}", encode(id), timeout.as_secs());
        self.post_allow_not_modified(&path).await
    }

    /// Send SIGKILL to a container.
    pub async fn kill_container(&self, id: &str) -> Result<(), DockerError> {
        let path = format!("/containers/{}/kill", encode(id));
        self.post(&path, None).await.map(|_| ())
    }

    /// Remove a container. `force` kills it first if it is running.
    pub async fn remove_container(&self, id: &str, force: bool) -> Result<(), DockerError> {
        let path = format!("/containers/{}?force={}", encode(id), force);
        self.send(Method::DELETE, &path, None).await.map(|_| ())
    }

    /// Block until a container stops and return its exit code.
    pub async fn wait_container(&self, id: &str) -> Result<WaitResponse, DockerError> {
        let path = format!("/containers/{}/wait", encode(id));
        let body = self.post(&path, None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// POST that treats `304 Not Modified` as success.
    async fn post_allow_not_modified(&self, path: &str) -> Result<(), DockerError> {
        match self.post(path, None).await {
            Ok(_) | Err(DockerError::Api { status: 304, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Perform a POST request.
    async fn post(&self, path: &str, body: Option<Vec<u8>>) -> Result<Bytes, DockerError> {
        self.send(Method::POST, path, body).await
    }

    /// Perform a request and return the body of a successful response.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, DockerError> {
        let uri = Uri::new(&self.socket_path, path);

        debug!(method = %method, path = path, "Request to Docker API");

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Accept", "application/json");
        let body = match body {
            Some(bytes) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(bytes)
            }
            None => Body::empty(),
        };
        let request = builder.body(body)?;

        let response = self.client.request(request).await?;
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await?;

        if status.is_success() {
            Ok(body)
        } else {
            let message = error_message(status, &body);
            if status != StatusCode::NOT_FOUND && status != StatusCode::NOT_MODIFIED {
                error!(status = %status, message = %message, "Docker API error");
            }
            Err(DockerError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Scan the progress stream of an image pull.
///
/// The daemon answers 200 before the pull finishes; a failure shows up as a
/// line carrying `error`.
pub(crate) fn check_pull_progress(body: &[u8]) -> Result<(), DockerError> {
    for line in body.split(|b| *b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let progress: PullProgress = serde_json::from_slice(line)?;
        if let Some(message) = progress.error {
            return Err(DockerError::Pull(message));
        }
        if let Some(status) = progress.status {
            debug!(status = %status, "Pull progress");
        }
    }
    Ok(())
}

/// Extract the daemon's error message, falling back to the raw body.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(response) => response.message,
        Err(_) if body.is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}

impl From<hyper::http::Error> for DockerError {
    fn from(err: hyper::http::Error) -> Self {
        DockerError::Api {
            status: 0,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty("", None)]
    #[case::progress(
        "{\"status\":\"Pulling from arangodb/arangodb\",\"id\":\"3.11\"}\n\
         {\"status\":\"Download complete\",\"id\":\"a1b2\"}\n\
         {\"status\":\"Status: Image is up to date for arangodb/arangodb:3.11\"}\n",
        None
    )]
    #[case::blank_lines("\n{\"status\":\"Pulling fs layer\"}\r\n\n", None)]
    #[case::error_line(
        "{\"status\":\"Pulling from arangodb/arangodb\"}\n\
         {\"errorDetail\":{\"message\":\"manifest unknown\"},\"error\":\"manifest unknown\"}\n",
        Some("manifest unknown")
    )]
    #[case::error_first("{\"error\":\"pull access denied\"}\n", Some("pull access denied"))]
    fn test_check_pull_progress(#[case] body: &str, #[case] expected: Option<&str>) {
        match (check_pull_progress(body.as_bytes()), expected) {
            (Ok(()), None) => {}
            (Err(DockerError::Pull(message)), Some(expected)) => assert_eq!(message, expected),
            (result, expected) => panic!("got {result:?}, expected pull error {expected:?}"),
        }
    }

    #[test]
    fn test_check_pull_progress_rejects_garbage() {
        assert!(matches!(
            check_pull_progress(b"not json\n"),
            Err(DockerError::Json(_))
        ));
    }

    #[test]
    fn test_error_message_from_json() {
        let body = br#"{"message":"No such container: abc"}"#;
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, body),
            "No such container: abc"
        );
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(error_message(StatusCode::CONFLICT, b""), "Conflict");
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, b"daemon busy\n"),
            "daemon busy"
        );
    }

    #[test]
    fn test_error_classification() {
        let not_found = DockerError::Api {
            status: 404,
            message: "No such container: abc".to_string(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_transient());

        let busy = DockerError::Api {
            status: 503,
            message: "busy".to_string(),
        };
        assert!(busy.is_transient());

        let conflict = DockerError::Api {
            status: 409,
            message: "container is not running".to_string(),
        };
        assert!(!conflict.is_transient());
        assert!(!conflict.is_not_found());

        assert!(!DockerError::Pull("denied".to_string()).is_transient());
    }

    #[test]
    fn test_socket_exists() {
        let client = DockerClient::new("/nonexistent/docker.sock");
        assert!(!client.socket_exists());
        assert_eq!(client.socket_path(), "/nonexistent/docker.sock");
    }
}
