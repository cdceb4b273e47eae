// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Node-local mirror of the pods scheduled on this node.
//!
//! The mirror is a `kube` reflector store fed by a field-selected pod watch.
//! The watch runs on its own task for the lifetime of the cache and is
//! restarted every resync interval, which swaps in a fresh full listing.

use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use kube::api::Api;
use kube::runtime::WatchStreamExt;
use kube::runtime::reflector::{self, ObjectRef, Store, store::Writer};
use kube::runtime::watcher::{self, Event};
use kube::Client;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Error, PodCacheError, Result};
use crate::quantity;

/// Field used to select the pods bound to a node.
const POD_HOST_FIELD: &str = "spec.nodeName";

/// Resource names treated as accelerators when none are configured.
pub const DEFAULT_ACCELERATOR_RESOURCES: [&str; 2] = ["nvidia.com/gpu", "dana.894/gpu"];

/// Looks pods up by namespace and name.
pub trait PodLookup: Send + Sync {
    fn get_pod(&self, namespace: &str, name: &str) -> Result<Arc<Pod>, PodCacheError>;
}

#[derive(Debug, Clone)]
pub struct PodCacheOptions {
    pub node_name: String,
    pub resync_interval: Duration,
    pub sync_timeout: Duration,
    pub accelerators: AcceleratorFilter,
}

/// Matches extended resource names against a set of glob patterns.
#[derive(Debug, Clone)]
pub struct AcceleratorFilter {
    patterns: Vec<String>,
}

impl Default for AcceleratorFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ACCELERATOR_RESOURCES)
    }
}

impl AcceleratorFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, resource: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, resource))
    }

    /// Total accelerator units in the limits of the pod's containers.
    pub fn requested(&self, pod: &Pod) -> i64 {
        let Some(spec) = pod.spec.as_ref() else {
            return 0;
        };
        spec.containers
            .iter()
            .filter_map(|c| c.resources.as_ref()?.limits.as_ref())
            .flatten()
            .filter(|(name, _)| self.matches(name))
            .filter_map(|(_, amount)| quantity::value(amount))
            .fold(0, i64::saturating_add)
    }

    pub fn requested_by(&self, pod: &Pod) -> bool {
        self.requested(pod) > 0
    }
}

/// Whether a pod is done for good: it failed or succeeded, or its deletion
/// was requested and none of its containers is still running.
pub fn is_terminated(pod: &Pod) -> bool {
    let status = pod.status.as_ref();
    if matches!(
        status.and_then(|s| s.phase.as_deref()),
        Some("Failed" | "Succeeded")
    ) {
        return true;
    }

    pod.metadata.deletion_timestamp.is_some()
        && !status
            .and_then(|s| s.container_statuses.as_ref())
            .is_some_and(|statuses| statuses.iter().any(is_running))
}

/// A container with neither a terminated nor a waiting state is running.
fn is_running(status: &ContainerStatus) -> bool {
    status
        .state
        .as_ref()
        .is_none_or(|state| state.terminated.is_none() && state.waiting.is_none())
}

pub struct PodCache {
    store: Store<Pod>,
    accelerators: AcceleratorFilter,
    watch: Option<JoinHandle<()>>,
}

impl PodCache {
    /// Starts watching the pods of `options.node_name` and waits until the
    /// first full listing is mirrored.
    pub async fn start(client: Client, options: PodCacheOptions) -> Result<Self> {
        let api: Api<Pod> = Api::all(client);
        let config = watcher::Config::default()
            .fields(&format!("{POD_HOST_FIELD}={}", options.node_name));

        let (store, writer) = reflector::store();
        let watch = tokio::spawn(watch_pods(api, config, writer, options.resync_interval));

        let cache = Self {
            store,
            accelerators: options.accelerators,
            watch: Some(watch),
        };
        cache.wait_synced(options.sync_timeout).await?;

        info!(node = %options.node_name, pods = cache.len(), "Pod cache is running");
        Ok(cache)
    }

    /// Serves lookups from an existing store. Nothing keeps the store
    /// current unless its writer is driven elsewhere.
    pub fn from_store(store: Store<Pod>, accelerators: AcceleratorFilter) -> Self {
        Self {
            store,
            accelerators,
            watch: None,
        }
    }

    /// Waits for the first complete listing to land in the store.
    pub async fn wait_synced(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.store.wait_until_ready()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::CacheSync(
                "pod watcher stopped before the initial listing".to_string(),
            )),
            Err(_) => Err(Error::CacheSync(format!(
                "no initial pod listing within {timeout:?}"
            ))),
        }
    }

    /// Whether the first complete listing has been mirrored.
    pub fn is_ready(&self) -> bool {
        self.store
            .wait_until_ready()
            .now_or_never()
            .is_some_and(|ready| ready.is_ok())
    }

    /// Number of mirrored pods, filtered or not.
    pub fn len(&self) -> usize {
        self.store.state().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PodLookup for PodCache {
    fn get_pod(&self, namespace: &str, name: &str) -> Result<Arc<Pod>, PodCacheError> {
        let pod = self
            .store
            .get(&ObjectRef::new(name).within(namespace))
            .ok_or(PodCacheError::NotFound)?;

        if is_terminated(&pod) {
            return Err(PodCacheError::Terminated);
        }
        if !self.accelerators.requested_by(&pod) {
            debug!(namespace, pod = name, "Pod does not request an accelerator");
            return Err(PodCacheError::NotAcceleratorWorkload);
        }
        Ok(pod)
    }
}

impl Drop for PodCache {
    fn drop(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.abort();
        }
    }
}

async fn watch_pods(
    api: Api<Pod>,
    config: watcher::Config,
    mut writer: Writer<Pod>,
    resync_interval: Duration,
) {
    let reader = writer.as_reader();
    loop {
        let stream = watcher::watcher(api.clone(), config.clone()).default_backoff();
        tokio::pin!(stream);
        let resync = tokio::time::sleep(resync_interval);
        tokio::pin!(resync);

        loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(Ok(event)) => {
                        log_event(&reader, &event);
                        writer.apply_watcher_event(&event);
                    }
                    Some(Err(e)) => warn!(error = %e, "Pod watch error, backing off"),
                    None => {
                        info!("Pod watch stream ended, restarting");
                        break;
                    }
                },
                _ = &mut resync => {
                    debug!("Resyncing pod cache");
                    break;
                }
            }
        }
    }
}

fn log_event(reader: &Store<Pod>, event: &Event<Pod>) {
    match event {
        Event::Apply(pod) => {
            let known = reader.get(&ObjectRef::from_obj(pod)).is_some();
            debug!(
                namespace = pod.metadata.namespace.as_deref().unwrap_or_default(),
                pod = pod.metadata.name.as_deref().unwrap_or_default(),
                "{}",
                if known { "Pod updated" } else { "Pod added" }
            );
        }
        Event::Delete(pod) => {
            debug!(
                namespace = pod.metadata.namespace.as_deref().unwrap_or_default(),
                pod = pod.metadata.name.as_deref().unwrap_or_default(),
                "Pod deleted"
            );
        }
        Event::Init => debug!("Pod listing started"),
        Event::InitApply(_) => {}
        Event::InitDone => debug!("Pod listing done"),
    }
}
