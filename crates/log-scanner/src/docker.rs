//! Docker API abstraction for testability.
//!
//! The [`DockerClient`] trait abstracts the container runtime calls the scanner
//! needs: listing running containers, inspecting one container, following its
//! combined log output from a watermark, and subscribing to lifecycle events.
//! Production code uses [`BollardDockerClient`]; tests use `MockDockerClient`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐
//! │ ScanRegistry │   │ StreamScanner │
//! └──────┬───────┘   └───────┬───────┘
//!        │                   │
//!        ▼                   ▼
//!        ┌───────────────────┐
//!        │   DockerClient    │ (trait)
//!        └───────────────────┘
//!             │         │
//!             ▼         ▼
//!        ┌─────────┐ ┌──────┐
//!        │ Bollard │ │ Mock │
//!        └────┬────┘ └──────┘
//!             │
//!             ▼
//!        Docker Daemon
//! ```
//!
//! # Log framing
//!
//! The daemon multiplexes stdout and stderr over one connection using 8-byte
//! frame headers. `bollard` strips those headers and yields one [`LogChunk`]
//! per frame, tagged with its [`OutputStream`]. Frames are not line aligned;
//! see [`LineSplitter`](crate::line::LineSplitter).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use rattle_core::types::ContainerIdentity;

use crate::error::ScannerError;

/// Output stream a log chunk was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
    /// TTY-attached containers have no stdout/stderr split.
    Console,
}

/// One demultiplexed payload frame from a container's log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    pub stream: OutputStream,
    pub bytes: Bytes,
}

impl LogChunk {
    pub fn stdout(bytes: impl Into<Bytes>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            bytes: bytes.into(),
        }
    }

    pub fn stderr(bytes: impl Into<Bytes>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            bytes: bytes.into(),
        }
    }
}

/// Container lifecycle event kinds the scanner reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleKind {
    Start,
    Die,
    Destroy,
    /// Any other action; ignored by the registry.
    Other(String),
}

impl LifecycleKind {
    pub fn from_action(action: &str) -> Self {
        match action {
            "start" => Self::Start,
            "die" => Self::Die,
            "destroy" => Self::Destroy,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// A container lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub container_id: String,
    pub container_name: String,
}

impl LifecycleEvent {
    pub fn new(
        kind: LifecycleKind,
        container_id: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            container_id: container_id.into(),
            container_name: container_name.into(),
        }
    }
}

/// Stream of log chunks for one streaming session.
pub type LogStream = BoxStream<'static, Result<LogChunk, ScannerError>>;

/// Stream of lifecycle events.
pub type EventStream = BoxStream<'static, Result<LifecycleEvent, ScannerError>>;

/// Trait abstracting Docker API operations.
///
/// The trait is `Send + Sync + 'static`, allowing it to be shared across
/// scanner tasks behind an `Arc`.
///
/// # Implementations
///
/// - [`BollardDockerClient`]: Production implementation using the `bollard` library
/// - `MockDockerClient`: Scripted test implementation (available in tests only)
pub trait DockerClient: Send + Sync + 'static {
    /// Lists running containers.
    ///
    /// Exited and created containers are not returned.
    ///
    /// # Errors
    ///
    /// Returns `ScannerError::DockerApi` if the Docker API call fails.
    fn list_running(
        &self,
    ) -> impl Future<Output = Result<Vec<ContainerIdentity>, ScannerError>> + Send;

    /// Resolves full metadata for one container.
    ///
    /// # Errors
    ///
    /// - `ScannerError::ContainerNotFound`: Container does not exist (404)
    /// - `ScannerError::DockerApi`: Other API errors
    fn inspect(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ContainerIdentity, ScannerError>> + Send;

    /// Follows combined stdout/stderr of a container starting at `since`.
    ///
    /// Connection failures surface as the first stream item. The stream ends
    /// when the container stops writing (container exit).
    fn stream_logs(&self, id: &str, since: SystemTime) -> LogStream;

    /// Subscribes to container `start`, `die` and `destroy` events.
    fn events(&self) -> EventStream;

    /// Checks Docker daemon connectivity.
    ///
    /// # Errors
    ///
    /// Returns `ScannerError::DockerConnection` if the daemon is unreachable.
    fn ping(&self) -> impl Future<Output = Result<(), ScannerError>> + Send;
}

/// Converts a watermark to the whole-second `since` value the Docker API accepts.
///
/// Truncates partial seconds, so a fresh stream may repeat output from the
/// second it was opened in. Resumed streams pass a watermark already rounded
/// up by [`round_up_to_secs`].
pub fn since_unix_secs(since: SystemTime) -> i64 {
    match since.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(_) => 0,
    }
}

/// Rounds a watermark up to the next whole second.
///
/// A resumed stream opened from the result never starts before the watermark.
pub fn round_up_to_secs(since: SystemTime) -> SystemTime {
    match since.duration_since(UNIX_EPOCH) {
        Ok(d) if d.subsec_nanos() > 0 => {
            UNIX_EPOCH + Duration::from_secs(d.as_secs().saturating_add(1))
        }
        _ => since,
    }
}

fn labels_from(map: Option<HashMap<String, String>>) -> std::collections::BTreeMap<String, String> {
    map.unwrap_or_default().into_iter().collect()
}

/// Production Docker client implementation using `bollard`.
///
/// Internally uses `Arc<bollard::Docker>` for sharing across scanner tasks.
///
/// # Examples
///
/// ```ignore
/// use rattle_log_scanner::BollardDockerClient;
///
/// let client = BollardDockerClient::connect_local()?;
/// let client = BollardDockerClient::connect_with_socket("/run/docker.sock", 120)?;
/// # Ok::<(), rattle_log_scanner::ScannerError>(())
/// ```
pub struct BollardDockerClient {
    docker: Arc<bollard::Docker>,
}

impl BollardDockerClient {
    /// Connects to Docker using the default local socket.
    ///
    /// # Errors
    ///
    /// Returns `ScannerError::DockerConnection` if the client cannot be created.
    pub fn connect_local() -> Result<Self, ScannerError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            ScannerError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to Docker using a specific socket path.
    ///
    /// # Errors
    ///
    /// Returns `ScannerError::DockerConnection` if the client cannot be created.
    pub fn connect_with_socket(socket_path: &str, timeout_secs: u64) -> Result<Self, ScannerError> {
        let docker = bollard::Docker::connect_with_socket(
            socket_path,
            timeout_secs,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| {
            ScannerError::DockerConnection(format!(
                "failed to connect to docker at {socket_path}: {e}"
            ))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects using the configured socket, or the local defaults when it is empty.
    pub fn connect(config: &rattle_core::config::DockerConfig) -> Result<Self, ScannerError> {
        if config.socket.is_empty() {
            Self::connect_local()
        } else {
            Self::connect_with_socket(&config.socket, config.connect_timeout_secs)
        }
    }
}

impl DockerClient for BollardDockerClient {
    async fn list_running(&self) -> Result<Vec<ContainerIdentity>, ScannerError> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| ScannerError::DockerApi(format!("list containers failed: {e}")))?;

        let result = containers
            .into_iter()
            .map(|c| {
                let name = c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_owned())
                    .unwrap_or_default();
                ContainerIdentity {
                    id: c.id.unwrap_or_default(),
                    name,
                    image: c.image.unwrap_or_default(),
                    image_id: c.image_id.unwrap_or_default(),
                    labels: labels_from(c.labels),
                }
            })
            .collect();

        Ok(result)
    }

    async fn inspect(&self, id: &str) -> Result<ContainerIdentity, ScannerError> {
        let details = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => ScannerError::ContainerNotFound(id.to_owned()),
                other => ScannerError::DockerApi(format!("inspect container failed: {other}")),
            })?;

        let (image, labels) = match details.config {
            Some(config) => (config.image.unwrap_or_default(), labels_from(config.labels)),
            None => (String::new(), Default::default()),
        };

        Ok(ContainerIdentity {
            id: details.id.unwrap_or_else(|| id.to_owned()),
            name: details
                .name
                .map(|n| n.trim_start_matches('/').to_owned())
                .unwrap_or_default(),
            image,
            image_id: details.image.unwrap_or_default(),
            labels,
        })
    }

    fn stream_logs(&self, id: &str, since: SystemTime) -> LogStream {
        use bollard::container::{LogOutput, LogsOptions};

        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            since: since_unix_secs(since),
            ..Default::default()
        };

        let container_id = id.to_owned();
        self.docker
            .logs(id, Some(options))
            .filter_map(move |item| {
                let mapped = match item {
                    Ok(LogOutput::StdOut { message }) => Some(Ok(LogChunk {
                        stream: OutputStream::Stdout,
                        bytes: message,
                    })),
                    Ok(LogOutput::StdErr { message }) => Some(Ok(LogChunk {
                        stream: OutputStream::Stderr,
                        bytes: message,
                    })),
                    Ok(LogOutput::Console { message }) => Some(Ok(LogChunk {
                        stream: OutputStream::Console,
                        bytes: message,
                    })),
                    Ok(LogOutput::StdIn { .. }) => None,
                    Err(e) => Some(Err(ScannerError::Stream {
                        container_id: container_id.clone(),
                        reason: e.to_string(),
                    })),
                };
                std::future::ready(mapped)
            })
            .boxed()
    }

    fn events(&self) -> EventStream {
        use bollard::system::EventsOptions;

        let mut filters = HashMap::new();
        filters.insert("type".to_owned(), vec!["container".to_owned()]);
        filters.insert(
            "event".to_owned(),
            vec!["start".to_owned(), "die".to_owned(), "destroy".to_owned()],
        );
        let options = EventsOptions::<String> {
            filters,
            ..Default::default()
        };

        self.docker
            .events(Some(options))
            .map(|item| {
                let msg = item.map_err(|e| {
                    ScannerError::DockerApi(format!("event stream failed: {e}"))
                })?;
                let action = msg.action.unwrap_or_default();
                let (container_id, container_name) = match msg.actor {
                    Some(actor) => {
                        let name = actor
                            .attributes
                            .and_then(|mut attrs| attrs.remove("name"))
                            .unwrap_or_default();
                        (actor.id.unwrap_or_default(), name)
                    }
                    None => (String::new(), String::new()),
                };
                Ok(LifecycleEvent {
                    kind: LifecycleKind::from_action(&action),
                    container_id,
                    container_name,
                })
            })
            .boxed()
    }

    async fn ping(&self) -> Result<(), ScannerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ScannerError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
pub use mock::MockDockerClient;


#[cfg(test)]
mod tests {
    use super::*;

    fn web() -> ContainerIdentity {
        ContainerIdentity::new("abc123def456", "web-1", "app:latest")
    }

    #[test]
    fn since_truncates_partial_seconds() {
        let t = UNIX_EPOCH + Duration::from_millis(10_500);
        assert_eq!(since_unix_secs(t), 10);
    }

    #[test]
    fn since_keeps_whole_seconds() {
        let t = UNIX_EPOCH + Duration::from_secs(42);
        assert_eq!(since_unix_secs(t), 42);
    }

    #[test]
    fn round_up_moves_partial_seconds_forward() {
        let t = UNIX_EPOCH + Duration::from_millis(10_300);
        let rounded = round_up_to_secs(t);
        assert_eq!(rounded, UNIX_EPOCH + Duration::from_secs(11));
        assert_eq!(since_unix_secs(rounded), 11);
        assert!(rounded >= t);
    }

    #[test]
    fn round_up_keeps_whole_seconds() {
        let t = UNIX_EPOCH + Duration::from_secs(42);
        assert_eq!(round_up_to_secs(t), t);
    }

    #[test]
    fn since_before_epoch_is_zero() {
        let t = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(since_unix_secs(t), 0);
    }

    #[test]
    fn lifecycle_kind_from_action() {
        assert_eq!(LifecycleKind::from_action("start"), LifecycleKind::Start);
        assert_eq!(LifecycleKind::from_action("die"), LifecycleKind::Die);
        assert_eq!(LifecycleKind::from_action("destroy"), LifecycleKind::Destroy);
        assert_eq!(
            LifecycleKind::from_action("pause"),
            LifecycleKind::Other("pause".to_owned())
        );
    }

    #[tokio::test]
    async fn mock_client_lists_and_inspects() {
        let client = MockDockerClient::new().with_containers(vec![web()]);
        assert_eq!(client.list_running().await.unwrap().len(), 1);
        assert_eq!(client.inspect("abc123def456").await.unwrap().name, "web-1");
        assert!(matches!(
            client.inspect("missing").await.unwrap_err(),
            ScannerError::ContainerNotFound(_)
        ));
    }

    #[tokio::test]
    async fn mock_client_replays_scripted_session() {
        let client = MockDockerClient::new();
        client.push_session("abc", vec![Ok(LogChunk::stdout("one\n"))]);
        let items: Vec<_> = client.stream_logs("abc", SystemTime::now()).collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(client.log_requests().len(), 1);
    }

    #[tokio::test]
    async fn mock_client_live_session_ends_when_sender_dropped() {
        let client = MockDockerClient::new();
        let tx = client.live_session("abc");
        tx.send(Ok(LogChunk::stderr("two\n"))).unwrap();
        drop(tx);
        let items: Vec<_> = client.stream_logs("abc", SystemTime::now()).collect().await;
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn docker_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<MockDockerClient>();
        assert_send_sync::<BollardDockerClient>();
    }
}
