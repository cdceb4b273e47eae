// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::cgroup::{CgroupDriver, CgroupLayout};
use crate::pod_cache::{AcceleratorFilter, DEFAULT_ACCELERATOR_RESOURCES, PodCacheOptions};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/datadog-agent/gpu-containerinfo.yaml";
const NODE_NAME_ENV: &str = "NODE_NAME";

fn default_runtime_endpoint() -> String {
    "/var/run/crio/crio.sock".to_string()
}

fn default_request_timeout_secs() -> u64 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_cgroup_root() -> PathBuf {
    PathBuf::from("/sys/fs/cgroup/memory")
}

fn default_scope_prefix() -> String {
    "crio-conmon".to_string()
}

fn default_accelerator_resources() -> Vec<String> {
    DEFAULT_ACCELERATOR_RESOURCES.map(String::from).to_vec()
}

fn default_resync_interval_secs() -> u64 {
    60
}

fn default_sync_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// CRI socket, with or without a `unix://` scheme.
    #[serde(default = "default_runtime_endpoint")]
    pub runtime_endpoint: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub cgroup_driver: CgroupDriver,
    #[serde(default = "default_cgroup_root")]
    pub cgroup_root: PathBuf,
    #[serde(default = "default_scope_prefix")]
    pub scope_prefix: String,
    /// Node whose pods are mirrored. Empty means the host name.
    #[serde(default)]
    pub node_name: String,
    #[serde(default = "default_accelerator_resources")]
    pub accelerator_resources: Vec<String>,
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime_endpoint: default_runtime_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            cgroup_driver: CgroupDriver::default(),
            cgroup_root: default_cgroup_root(),
            scope_prefix: default_scope_prefix(),
            node_name: String::new(),
            accelerator_resources: default_accelerator_resources(),
            resync_interval_secs: default_resync_interval_secs(),
            sync_timeout_secs: default_sync_timeout_secs(),
        }
    }
}

impl Config {
    /// Reads the configuration file at `path`, if any. A missing file means
    /// defaults. `NODE_NAME` overrides the configured node name.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => parse_config(path)?,
            Some(path) => {
                debug!("no config at {}, using defaults", path.display());
                Config::default()
            }
            None => Config::default(),
        };
        config.resolve_node_name(std::env::var(NODE_NAME_ENV).ok());
        Ok(config)
    }

    fn resolve_node_name(&mut self, from_env: Option<String>) {
        if let Some(name) = from_env.filter(|name| !name.is_empty()) {
            self.node_name = name;
        } else if self.node_name.is_empty() {
            self.node_name = hostname::get()
                .ok()
                .and_then(|name| name.into_string().ok())
                .unwrap_or_default();
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn cgroup_layout(&self) -> CgroupLayout {
        CgroupLayout::new(self.cgroup_driver, &self.cgroup_root, &self.scope_prefix)
    }

    pub fn pod_cache_options(&self) -> PodCacheOptions {
        PodCacheOptions {
            node_name: self.node_name.clone(),
            resync_interval: Duration::from_secs(self.resync_interval_secs),
            sync_timeout: Duration::from_secs(self.sync_timeout_secs),
            accelerators: AcceleratorFilter::new(self.accelerator_resources.iter().cloned()),
        }
    }
}

fn parse_config(path: &Path) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("containerinfo.yaml");
        let yaml = r#"
runtime_endpoint: unix:///run/containerd/containerd.sock
request_timeout_secs: 3
connect_timeout_secs: 1
cgroup_driver: cgroupfs
cgroup_root: /host/sys/fs/cgroup/memory
scope_prefix: cri-containerd
node_name: gpu-node-1
accelerator_resources:
  - "*/gpu"
resync_interval_secs: 30
sync_timeout_secs: 10
"#;
        fs::write(&path, yaml).unwrap();

        let cfg = parse_config(&path).unwrap();
        assert_eq!(cfg.runtime_endpoint, "unix:///run/containerd/containerd.sock");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.cgroup_driver, CgroupDriver::Cgroupfs);
        assert_eq!(cfg.node_name, "gpu-node-1");

        let layout = cfg.cgroup_layout();
        assert_eq!(layout.root, PathBuf::from("/host/sys/fs/cgroup/memory"));
        assert_eq!(layout.scope_prefix, "cri-containerd");

        let options = cfg.pod_cache_options();
        assert_eq!(options.resync_interval, Duration::from_secs(30));
        assert_eq!(options.sync_timeout, Duration::from_secs(10));
        assert!(options.accelerators.matches("amd.com/gpu"));
    }

    #[test]
    fn test_parse_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("containerinfo.yaml");
        fs::write(&path, "node_name: gpu-node-2\n").unwrap();

        let cfg = parse_config(&path).unwrap();
        assert_eq!(cfg.node_name, "gpu-node-2");
        assert_eq!(cfg.runtime_endpoint, "/var/run/crio/crio.sock");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.cgroup_driver, CgroupDriver::Systemd);
        assert_eq!(cfg.cgroup_root, PathBuf::from("/sys/fs/cgroup/memory"));
        assert_eq!(cfg.scope_prefix, "crio-conmon");
        assert_eq!(cfg.accelerator_resources, vec!["nvidia.com/gpu", "dana.894/gpu"]);
        assert_eq!(cfg.resync_interval_secs, 60);
        assert_eq!(cfg.sync_timeout_secs, 120);
    }

    #[test]
    fn test_invalid_driver_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("containerinfo.yaml");
        fs::write(&path, "cgroup_driver: cgroupv3\n").unwrap();

        let err = parse_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(cfg.runtime_endpoint, "/var/run/crio/crio.sock");
        assert_eq!(cfg.scope_prefix, "crio-conmon");
    }

    #[test]
    fn test_node_name_resolution() {
        let mut cfg = Config {
            node_name: "from-file".to_string(),
            ..Default::default()
        };
        cfg.resolve_node_name(Some("from-env".to_string()));
        assert_eq!(cfg.node_name, "from-env");

        cfg.resolve_node_name(Some(String::new()));
        assert_eq!(cfg.node_name, "from-env");

        let mut cfg = Config::default();
        cfg.resolve_node_name(None);
        let host = hostname::get().unwrap().into_string().unwrap();
        assert_eq!(cfg.node_name, host);
    }

    #[test]
    fn test_node_name_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("containerinfo.yaml");
        fs::write(&path, "node_name: from-file\n").unwrap();

        temp_env::with_var(NODE_NAME_ENV, Some("from-env"), || {
            assert_eq!(Config::load(Some(&path)).unwrap().node_name, "from-env");
        });
        temp_env::with_var_unset(NODE_NAME_ENV, || {
            assert_eq!(Config::load(Some(&path)).unwrap().node_name, "from-file");
        });
    }
}
