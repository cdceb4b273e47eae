// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod proto;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use proto::runtime_service_client::RuntimeServiceClient;
use proto::{ContainerStatus, ContainerStatusRequest, VersionRequest};

/// CRI API version sent in the startup handshake.
pub const CRI_VERSION: &str = "0.1.0";

/// Container status as reported by the runtime.
#[async_trait]
pub trait RuntimeService: Send + Sync {
    /// Fetches the status of one container. The call is abandoned with
    /// `RuntimeUnavailable` once `timeout` elapses; it is never retried.
    async fn container_status(&self, container_id: &str, timeout: Duration)
    -> Result<ContainerStatus>;
}

/// gRPC client of a CRI runtime listening on a unix socket.
#[derive(Debug, Clone)]
pub struct CriClient {
    client: RuntimeServiceClient<Channel>,
}

impl CriClient {
    /// Dials the runtime socket and performs the version handshake.
    ///
    /// `endpoint` is a socket path, optionally prefixed with `unix://`.
    pub async fn connect(
        endpoint: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let socket = socket_path(endpoint);
        // The URI is ignored by the connector; the channel only needs a valid one.
        let endpoint = Endpoint::from_static("http://[::]:50051").connect_timeout(connect_timeout);
        let connector = {
            let socket = socket.clone();
            service_fn(move |_: Uri| {
                let socket = socket.clone();
                async move {
                    let stream = UnixStream::connect(socket).await?;
                    Ok::<_, std::io::Error>(TokioIo::new(stream))
                }
            })
        };
        let dial = endpoint.connect_with_connector(connector);
        let channel = tokio::time::timeout(connect_timeout, dial)
            .await
            .map_err(|_| {
                Error::RuntimeUnavailable(tonic::Status::deadline_exceeded(format!(
                    "timed out dialing {}",
                    socket.display()
                )))
            })?
            .map_err(|e| {
                Error::RuntimeUnavailable(tonic::Status::unavailable(format!(
                    "can't dial {}: {e}",
                    socket.display()
                )))
            })?;

        let mut client = RuntimeServiceClient::new(channel);
        let mut request = tonic::Request::new(VersionRequest {
            version: CRI_VERSION.to_string(),
        });
        request.set_timeout(request_timeout);
        let version = tokio::time::timeout(request_timeout, client.version(request))
            .await
            .map_err(|_| Error::RuntimeUnavailable(deadline_exceeded(request_timeout)))?
            .map_err(Error::RuntimeUnavailable)?
            .into_inner();

        debug!(
            runtime = %version.runtime_name,
            runtime_version = %version.runtime_version,
            api_version = %version.runtime_api_version,
            "Container runtime is {}",
            version.runtime_name
        );
        Ok(Self { client })
    }
}

#[async_trait]
impl RuntimeService for CriClient {
    async fn container_status(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<ContainerStatus> {
        let mut client = self.client.clone();
        let mut request = tonic::Request::new(ContainerStatusRequest {
            container_id: container_id.to_string(),
            verbose: false,
        });
        request.set_timeout(timeout);

        let response = match tokio::time::timeout(timeout, client.container_status(request)).await {
            Ok(Ok(response)) => response.into_inner(),
            Ok(Err(status)) => {
                warn!(container_id, error = %status, "Can't get container status");
                return Err(status_error(container_id, status));
            }
            Err(_) => return Err(Error::RuntimeUnavailable(deadline_exceeded(timeout))),
        };

        response.status.ok_or_else(|| Error::ContainerNotFound {
            container_id: container_id.to_string(),
        })
    }
}

/// Maps a failed status call onto the error taxonomy.
pub fn status_error(container_id: &str, status: tonic::Status) -> Error {
    match status.code() {
        tonic::Code::NotFound => Error::ContainerNotFound {
            container_id: container_id.to_string(),
        },
        _ => Error::RuntimeUnavailable(status),
    }
}

fn deadline_exceeded(timeout: Duration) -> tonic::Status {
    tonic::Status::deadline_exceeded(format!("no answer from the runtime within {timeout:?}"))
}

fn socket_path(endpoint: &str) -> PathBuf {
    PathBuf::from(endpoint.strip_prefix("unix://").unwrap_or(endpoint))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proto::runtime_service_server::{self, RuntimeServiceServer};
    use proto::{ContainerStatusResponse, VersionResponse};
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Instant;
    use tokio::net::UnixListener;
    use tokio_stream::wrappers::UnixListenerStream;
    use tonic::transport::Server;
    use tonic::{Request, Response, Status};

    const HANGING_CONTAINER: &str = "hangs";

    /// Runtime serving one container; `HANGING_CONTAINER` never answers.
    struct StubRuntime;

    #[tonic::async_trait]
    impl runtime_service_server::RuntimeService for StubRuntime {
        async fn version(
            &self,
            request: Request<VersionRequest>,
        ) -> std::result::Result<Response<VersionResponse>, Status> {
            Ok(Response::new(VersionResponse {
                version: request.into_inner().version,
                runtime_name: "cri-o".to_string(),
                runtime_version: "1.29.1".to_string(),
                runtime_api_version: "v1".to_string(),
            }))
        }

        async fn container_status(
            &self,
            request: Request<ContainerStatusRequest>,
        ) -> std::result::Result<Response<ContainerStatusResponse>, Status> {
            match request.into_inner().container_id.as_str() {
                "abc123" => Ok(Response::new(ContainerStatusResponse {
                    status: Some(ContainerStatus {
                        id: "abc123".to_string(),
                        labels: HashMap::from([(
                            "io.kubernetes.pod.name".to_string(),
                            "trainer-0".to_string(),
                        )]),
                        image_id: "sha256:0123".to_string(),
                        ..Default::default()
                    }),
                    info: HashMap::new(),
                })),
                HANGING_CONTAINER => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(Status::internal("answered too late"))
                }
                _ => Err(Status::not_found("container not found")),
            }
        }
    }

    fn serve(dir: &Path) -> PathBuf {
        let socket = dir.join("crio.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        tokio::spawn(
            Server::builder()
                .add_service(RuntimeServiceServer::new(StubRuntime))
                .serve_with_incoming(UnixListenerStream::new(listener)),
        );
        socket
    }

    async fn connect(socket: &Path) -> CriClient {
        CriClient::connect(
            &format!("unix://{}", socket.display()),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_socket_path() {
        assert_eq!(
            socket_path("unix:///var/run/crio/crio.sock"),
            PathBuf::from("/var/run/crio/crio.sock")
        );
        assert_eq!(
            socket_path("/run/containerd/containerd.sock"),
            PathBuf::from("/run/containerd/containerd.sock")
        );
    }

    #[test]
    fn test_not_found_status_maps_to_container_not_found() {
        let err = status_error("abc", tonic::Status::not_found("no such container"));
        assert!(matches!(err, Error::ContainerNotFound { container_id } if container_id == "abc"));

        let err = status_error("abc", tonic::Status::unavailable("socket closed"));
        assert!(matches!(err, Error::RuntimeUnavailable(s) if s.code() == tonic::Code::Unavailable));
    }

    #[tokio::test]
    async fn test_connect_to_missing_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("crio.sock");
        let result = CriClient::connect(
            &format!("unix://{}", socket.display()),
            Duration::from_millis(500),
            Duration::from_millis(500),
        )
        .await;
        assert!(matches!(result, Err(Error::RuntimeUnavailable(_))));
    }

    #[tokio::test]
    async fn test_container_status_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let client = connect(&serve(dir.path())).await;

        let status = client
            .container_status("abc123", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status.id, "abc123");
        assert_eq!(status.image_id, "sha256:0123");
        assert_eq!(
            status.labels.get("io.kubernetes.pod.name").map(String::as_str),
            Some("trainer-0")
        );
    }

    #[tokio::test]
    async fn test_unknown_container_over_socket_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let client = connect(&serve(dir.path())).await;

        let err = client
            .container_status("deadbeef", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ContainerNotFound { container_id } if container_id == "deadbeef"));
    }

    #[tokio::test]
    async fn test_container_status_gives_up_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let client = connect(&serve(dir.path())).await;

        let started = Instant::now();
        let err = client
            .container_status(HANGING_CONTAINER, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RuntimeUnavailable(_)), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
