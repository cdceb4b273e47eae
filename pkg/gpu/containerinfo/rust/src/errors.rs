// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(#[source] tonic::Status),

    #[error("container {container_id} not found in the runtime")]
    ContainerNotFound { container_id: String },

    #[error("container {container_id} has no pod namespace/name labels")]
    MissingPodIdentity { container_id: String },

    #[error("can't get pod {namespace}/{name}")]
    PodLookup {
        namespace: String,
        name: String,
        #[source]
        source: PodCacheError,
    },

    #[error("pod {namespace}/{name} has no UID")]
    MissingPodUid { namespace: String, name: String },

    #[error("unknown QoS class {0:?}")]
    UnknownQosClass(String),

    #[error("invalid character in component {0:?} of cgroup name")]
    InvalidCgroupSegment(String),

    #[error("invalid slice name: {0}")]
    InvalidSliceName(String),

    #[error("can't read {}: {source}", path.display())]
    CgroupRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pod cache did not sync: {0}")]
    CacheSync(String),
}

/// Reasons the pod cache refuses to hand out a pod.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodCacheError {
    #[error("pod not found")]
    NotFound,
    #[error("terminated pod")]
    Terminated,
    #[error("pod does not request an accelerator")]
    NotAcceleratorWorkload,
}
