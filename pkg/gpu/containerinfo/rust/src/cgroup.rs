// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Where the kubelet puts a pod's containers in the cgroup hierarchy.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cgroup_name::CgroupName;
use crate::errors::{Error, Result};
use crate::qos::QosClass;

/// Top-level cgroup of all pods.
pub const CONTAINER_ROOT: &str = "kubepods";
pub const POD_CGROUP_NAME_PREFIX: &str = "pod";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CgroupDriver {
    #[default]
    Systemd,
    Cgroupfs,
}

/// Resolves container cgroup directories under a mounted cgroup hierarchy.
#[derive(Debug, Clone)]
pub struct CgroupLayout {
    pub driver: CgroupDriver,
    /// Mount point of the hierarchy, e.g. `/sys/fs/cgroup/memory`.
    pub root: PathBuf,
    /// Prefix of the runtime's container scope, e.g. `crio-conmon`.
    pub scope_prefix: String,
}

impl CgroupLayout {
    pub fn new(driver: CgroupDriver, root: impl Into<PathBuf>, scope_prefix: impl Into<String>) -> Self {
        Self {
            driver,
            root: root.into(),
            scope_prefix: scope_prefix.into(),
        }
    }

    /// Path of the container cgroup relative to the hierarchy root.
    pub fn container_path(&self, qos: QosClass, pod_uid: &str, container_id: &str) -> Result<String> {
        if container_id.is_empty() || container_id.contains('/') || container_id.starts_with('.') {
            return Err(Error::InvalidCgroupSegment(container_id.to_string()));
        }
        let pod = pod_cgroup_name(qos, pod_uid)?;
        Ok(match self.driver {
            CgroupDriver::Systemd => format!(
                "{}/{}-{}.scope",
                pod.to_systemd()?,
                self.scope_prefix,
                container_id
            ),
            CgroupDriver::Cgroupfs => format!("{}/{}", pod.to_cgroupfs(), container_id),
        })
    }

    /// Absolute directory of the container cgroup.
    pub fn container_dir(&self, qos: QosClass, pod_uid: &str, container_id: &str) -> Result<PathBuf> {
        let relative = self.container_path(qos, pod_uid, container_id)?;
        Ok(join_under(&self.root, &relative))
    }
}

/// Returns the cgroup name of a pod: its QoS parent followed by `pod<uid>`.
pub fn pod_cgroup_name(qos: QosClass, pod_uid: &str) -> Result<CgroupName> {
    let container_root = CgroupName::compose(&CgroupName::root(), [CONTAINER_ROOT])?;
    let parent = match qos {
        QosClass::Guaranteed => container_root,
        QosClass::Burstable => CgroupName::compose(&container_root, ["burstable"])?,
        QosClass::BestEffort => CgroupName::compose(&container_root, ["besteffort"])?,
    };
    CgroupName::compose(&parent, [format!("{POD_CGROUP_NAME_PREFIX}{pod_uid}")])
}

fn join_under(root: &Path, relative: &str) -> PathBuf {
    root.join(relative.trim_start_matches('/'))
}
