// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Resolves a runtime container ID to the PIDs running in its cgroup.
//!
//! A lookup asks the runtime for the container status, finds the owning pod
//! through the labels the kubelet sets on every container, derives the pod's
//! cgroup from its QoS class and UID, and reads every `cgroup.procs` file
//! under the container's cgroup.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, warn};

use crate::cgroup::CgroupLayout;
use crate::config::Config;
use crate::cri::proto::ContainerStatus;
use crate::cri::{CriClient, RuntimeService};
use crate::errors::{Error, Result};
use crate::pod_cache::{PodCache, PodLookup};
use crate::procs;
use crate::qos;

/// Label holding the namespace of the pod owning a container.
pub const POD_NAMESPACE_LABEL_KEY: &str = "io.kubernetes.pod.namespace";
/// Label holding the name of the pod owning a container.
pub const POD_NAME_LABEL_KEY: &str = "io.kubernetes.pod.name";

pub struct ContainerInfoManager {
    runtime: Arc<dyn RuntimeService>,
    pods: Arc<dyn PodLookup>,
    layout: CgroupLayout,
    request_timeout: Duration,
}

impl ContainerInfoManager {
    pub fn new(
        runtime: Arc<dyn RuntimeService>,
        pods: Arc<dyn PodLookup>,
        layout: CgroupLayout,
        request_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            pods,
            layout,
            request_timeout,
        }
    }

    /// Connects to the runtime and the API server and waits for the pod cache
    /// to hold the node's pods.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let runtime = CriClient::connect(
            &config.runtime_endpoint,
            config.connect_timeout(),
            config.request_timeout(),
        )
        .await
        .with_context(|| format!("failed to connect to runtime at {}", config.runtime_endpoint))?;

        let client = kube::Client::try_default()
            .await
            .context("failed to create Kubernetes client")?;
        let pods = PodCache::start(client, config.pod_cache_options())
            .await
            .context("failed to start pod cache")?;

        Ok(Self::new(
            Arc::new(runtime),
            Arc::new(pods),
            config.cgroup_layout(),
            config.request_timeout(),
        ))
    }

    /// Returns the PIDs of every process in the container's cgroup subtree,
    /// in walk order.
    ///
    /// A cgroup that does not exist (yet, or anymore) holds no PIDs.
    /// Unreadable `cgroup.procs` files are logged and skipped.
    pub async fn list_container_pids(&self, container_id: &str) -> Result<Vec<i32>> {
        let result = self.resolve_pids(container_id).await;
        if let Err(e) = &result {
            warn!(container_id, error = %e, "Can't list container PIDs");
        }
        result
    }

    /// Returns the container status as the runtime reported it.
    pub async fn inspect_container(&self, container_id: &str) -> Result<ContainerStatus> {
        self.runtime
            .container_status(container_id, self.request_timeout)
            .await
    }

    async fn resolve_pids(&self, container_id: &str) -> Result<Vec<i32>> {
        let status = self.inspect_container(container_id).await?;

        let (namespace, name) = pod_identity(&status).ok_or_else(|| Error::MissingPodIdentity {
            container_id: container_id.to_string(),
        })?;
        let pod = self
            .pods
            .get_pod(namespace, name)
            .map_err(|source| Error::PodLookup {
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })?;

        let qos = qos::pod_qos_class(&pod)?;
        let uid = pod
            .metadata
            .uid
            .as_deref()
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| Error::MissingPodUid {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        let dir = self.layout.container_dir(qos, uid, container_id)?;
        debug!(container_id, %qos, pod_uid = uid, cgroup = %dir.display(), "Resolved container cgroup");

        // The walk does blocking filesystem I/O.
        let id = container_id.to_string();
        let walk_root = dir.clone();
        tokio::task::spawn_blocking(move || collect_pids(&walk_root, &id))
            .await
            .map_err(|e| Error::CgroupRead {
                path: dir,
                source: io::Error::other(e),
            })
    }
}

/// Aggregates the PIDs of every readable `cgroup.procs` file under `dir`.
fn collect_pids(dir: &Path, container_id: &str) -> Vec<i32> {
    let mut pids = Vec::new();
    for entry in procs::cgroup_procs(dir) {
        match entry {
            Ok(found) => pids.extend(found),
            Err(e) => warn!(container_id, error = %e, "Skipping unreadable cgroup"),
        }
    }
    pids
}

/// Namespace and name of the owning pod, when both labels are set.
fn pod_identity(status: &ContainerStatus) -> Option<(&str, &str)> {
    let label = |key: &str| {
        status
            .labels
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    };
    Some((label(POD_NAMESPACE_LABEL_KEY)?, label(POD_NAME_LABEL_KEY)?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn status(labels: &[(&str, &str)]) -> ContainerStatus {
        ContainerStatus {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            ..Default::default()
        }
    }

    #[test]
    fn test_collect_pids_in_walk_order() {
        let dir = tempfile::tempdir().unwrap();
        let scope = dir.path().join("crio-conmon-abc123.scope");
        std::fs::create_dir_all(scope.join("init.scope")).unwrap();
        std::fs::write(scope.join(procs::CGROUP_PROCS), "10\n11\n").unwrap();
        std::fs::write(scope.join("init.scope").join(procs::CGROUP_PROCS), "1\n").unwrap();

        assert_eq!(collect_pids(&scope, "abc123"), vec![10, 11, 1]);
        assert!(collect_pids(&dir.path().join("gone"), "abc123").is_empty());
    }

    #[test]
    fn test_pod_identity() {
        let s = status(&[
            (POD_NAMESPACE_LABEL_KEY, "ml"),
            (POD_NAME_LABEL_KEY, "trainer-0"),
            ("io.kubernetes.container.name", "trainer"),
        ]);
        assert_eq!(pod_identity(&s), Some(("ml", "trainer-0")));
    }

    #[test]
    fn test_pod_identity_needs_both_labels() {
        assert_eq!(pod_identity(&status(&[(POD_NAMESPACE_LABEL_KEY, "ml")])), None);
        assert_eq!(pod_identity(&status(&[(POD_NAME_LABEL_KEY, "trainer-0")])), None);
        assert_eq!(
            pod_identity(&status(&[(POD_NAMESPACE_LABEL_KEY, ""), (POD_NAME_LABEL_KEY, "x")])),
            None
        );
    }
}
