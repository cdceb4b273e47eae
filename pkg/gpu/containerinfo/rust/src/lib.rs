// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Maps GPU workload containers to the processes running in them.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod cgroup;
pub mod cgroup_name;
pub mod config;
pub mod cri;
mod errors;
pub mod manager;
pub mod pod_cache;
pub mod procs;
pub mod qos;
mod quantity;

pub use cgroup::{CgroupDriver, CgroupLayout};
pub use config::Config;
pub use errors::{Error, PodCacheError, Result};
pub use manager::ContainerInfoManager;
pub use pod_cache::{AcceleratorFilter, PodCache, PodLookup};
pub use qos::QosClass;
