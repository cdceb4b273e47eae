// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Diagnostic front end: resolves one container and prints the result as JSON.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use dd_gpu_containerinfo::cri::proto::ContainerStatus;
use dd_gpu_containerinfo::{Config, ContainerInfoManager, config::DEFAULT_CONFIG_PATH};

/// GPU container to PID resolution
#[derive(Parser, Debug)]
#[command(name = "dd-gpu-containerinfo")]
#[command(about = "Resolve GPU workload containers to their processes")]
struct Args {
    /// Configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Node whose pods are watched
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the PIDs running in a container's cgroup
    Pids { container_id: String },
    /// Print the runtime status of a container
    Inspect { container_id: String },
}

#[derive(Serialize)]
struct PidsOutput<'a> {
    container_id: &'a str,
    pids: Vec<i32>,
}

#[derive(Serialize)]
struct InspectOutput {
    id: String,
    name: Option<String>,
    state: &'static str,
    image: Option<String>,
    image_ref: String,
    image_id: String,
    created_at: i64,
    started_at: i64,
    finished_at: i64,
    exit_code: i32,
    reason: String,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl From<ContainerStatus> for InspectOutput {
    fn from(status: ContainerStatus) -> Self {
        Self {
            state: status.state().as_str_name(),
            id: status.id,
            name: status.metadata.map(|m| m.name),
            image: status.image.map(|i| i.image),
            image_ref: status.image_ref,
            image_id: status.image_id,
            created_at: status.created_at,
            started_at: status.started_at,
            finished_at: status.finished_at,
            exit_code: status.exit_code,
            reason: status.reason,
            labels: status.labels.into_iter().collect(),
            annotations: status.annotations.into_iter().collect(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG takes precedence, fallback to info. Logs go to stderr so
    // stdout only carries the JSON result.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(Some(&args.config))?;
    if let Some(node_name) = args.node_name.filter(|n| !n.is_empty()) {
        config.node_name = node_name;
    }
    tracing::info!(
        node = %config.node_name,
        runtime = %config.runtime_endpoint,
        cgroup_root = %config.cgroup_root.display(),
        "Starting container info manager"
    );

    let manager = ContainerInfoManager::connect(&config).await?;

    let output = match &args.command {
        Command::Pids { container_id } => {
            let pids = manager
                .list_container_pids(container_id)
                .await
                .with_context(|| format!("failed to list PIDs of container {container_id}"))?;
            serde_json::to_string_pretty(&PidsOutput { container_id, pids })?
        }
        Command::Inspect { container_id } => {
            let status = manager
                .inspect_container(container_id)
                .await
                .with_context(|| format!("failed to inspect container {container_id}"))?;
            serde_json::to_string_pretty(&InspectOutput::from(status))?
        }
    };
    println!("{output}");
    Ok(())
}
