// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Reading member PIDs out of a cgroup subtree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;
use walkdir::WalkDir;

use crate::errors::Error;

/// Name of the per-cgroup file listing member processes.
pub const CGROUP_PROCS: &str = "cgroup.procs";

/// Reads a `cgroup.procs` style file.
///
/// One PID per line; blank and non-numeric lines are skipped. A file that
/// does not exist holds no PIDs.
pub fn read_procs_file(path: &Path) -> io::Result<Vec<i32>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let pids: Vec<i32> = contents
        .lines()
        .filter_map(|line| line.trim().parse::<i32>().ok())
        .filter(|pid| *pid > 0)
        .collect();

    trace!(path = %path.display(), ?pids, "read cgroup procs");
    Ok(pids)
}

/// Walks the cgroup subtree at `root` and yields the PIDs of every
/// `cgroup.procs` file in it, one item per file, in lexical walk order.
///
/// A missing `root` yields nothing. Unreadable entries yield an error item
/// and the walk carries on.
pub fn cgroup_procs(root: &Path) -> impl Iterator<Item = Result<Vec<i32>, Error>> + '_ {
    let walk = root.exists().then(|| {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => (entry.file_type().is_file() && entry.file_name() == CGROUP_PROCS)
                    .then(|| read_entry(entry.path())),
                Err(e) => Some(Err(walk_error(root, e))),
            })
    });
    walk.into_iter().flatten()
}

fn read_entry(path: &Path) -> Result<Vec<i32>, Error> {
    read_procs_file(path).map_err(|source| Error::CgroupRead {
        path: path.to_path_buf(),
        source,
    })
}

fn walk_error(root: &Path, e: walkdir::Error) -> Error {
    let path = e
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(root));
    let source = e
        .into_io_error()
        .unwrap_or_else(|| io::Error::other("filesystem loop in cgroup tree"));
    Error::CgroupRead { path, source }
}
