// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Driver-independent cgroup names and their systemd/cgroupfs renderings.

use std::fmt;

use crate::errors::{Error, Result};

const SYSTEMD_SUFFIX: &str = ".slice";

/// An ordered, root-relative list of cgroup path components.
///
/// Components never contain `/` or `_`. The systemd rendering maps `-` to `_`,
/// so forbidding `_` keeps that mapping reversible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CgroupName(Vec<String>);

impl CgroupName {
    /// The name of the cgroup root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Composes a new name from `base` followed by `components`.
    ///
    /// The base components are copied, so the result never shares storage
    /// with `base`.
    pub fn compose<I, S>(base: &CgroupName, components: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = base.0.clone();
        for component in components {
            let component = component.into();
            if component.contains('/') || component.contains('_') {
                return Err(Error::InvalidCgroupSegment(component));
            }
            parts.push(component);
        }
        Ok(Self(parts))
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// Renders the name as the expanded systemd slice path.
    ///
    /// `["kubepods", "burstable", "pod1234-abcd"]` becomes
    /// `/kubepods.slice/kubepods-burstable.slice/kubepods-burstable-pod1234_abcd.slice`.
    pub fn to_systemd(&self) -> Result<String> {
        if self.is_root() {
            return Ok("/".to_string());
        }
        let escaped: Vec<String> = self.0.iter().map(|part| escape_systemd(part)).collect();
        expand_slice(&format!("{}{SYSTEMD_SUFFIX}", escaped.join("-")))
    }

    /// Renders the name as a plain cgroupfs path, e.g. `/kubepods/burstable/pod1234-abcd`.
    pub fn to_cgroupfs(&self) -> String {
        format!("/{}", self.0.join("/"))
    }

    fn is_root(&self) -> bool {
        match self.0.as_slice() {
            [] => true,
            [only] => only.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for CgroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

fn escape_systemd(part: &str) -> String {
    part.replace('-', "_")
}

/// Expands a systemd slice name into the path of nested slices.
///
/// `a-b-c.slice` lives at `/a.slice/a-b.slice/a-b-c.slice`; `-.slice` is the
/// root slice.
pub fn expand_slice(slice: &str) -> Result<String> {
    let invalid = || Error::InvalidSliceName(slice.to_string());

    let name = slice.strip_suffix(SYSTEMD_SUFFIX).ok_or_else(invalid)?;
    if slice.contains('/') {
        return Err(invalid());
    }
    if name == "-" {
        return Ok("/".to_string());
    }

    let mut path = String::new();
    let mut prefix = String::new();
    for component in name.split('-') {
        // Neither "a--b.slice" nor "-a.slice" name a real slice.
        if component.is_empty() {
            return Err(invalid());
        }
        path.push('/');
        path.push_str(&prefix);
        path.push_str(component);
        path.push_str(SYSTEMD_SUFFIX);
        prefix.push_str(component);
        prefix.push('-');
    }
    Ok(path)
}
