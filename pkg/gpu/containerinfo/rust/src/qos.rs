// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::errors::Error;
use crate::quantity;

/// Only these resources take part in QoS classification.
const QOS_RESOURCES: [&str; 2] = ["cpu", "memory"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QosClass {
    Guaranteed,
    Burstable,
    BestEffort,
}

impl QosClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            QosClass::Guaranteed => "Guaranteed",
            QosClass::Burstable => "Burstable",
            QosClass::BestEffort => "BestEffort",
        }
    }
}

impl fmt::Display for QosClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QosClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Guaranteed" => Ok(QosClass::Guaranteed),
            "Burstable" => Ok(QosClass::Burstable),
            "BestEffort" => Ok(QosClass::BestEffort),
            other => Err(Error::UnknownQosClass(other.to_string())),
        }
    }
}

/// Returns the QoS class of a pod.
///
/// The class the API server recorded in the pod status wins; pods that were
/// never classified are classified from their container resources.
pub fn pod_qos_class(pod: &Pod) -> Result<QosClass, Error> {
    match pod.status.as_ref().and_then(|s| s.qos_class.as_deref()) {
        Some(class) if !class.is_empty() => class.parse(),
        _ => Ok(compute_qos_class(pod)),
    }
}

/// Classifies a pod from the cpu/memory requests and limits of its
/// containers and init containers.
pub fn compute_qos_class(pod: &Pod) -> QosClass {
    let Some(spec) = pod.spec.as_ref() else {
        return QosClass::BestEffort;
    };

    let mut requests: BTreeMap<&str, i128> = BTreeMap::new();
    let mut limits: BTreeMap<&str, i128> = BTreeMap::new();
    let mut guaranteed = true;

    let containers = spec
        .containers
        .iter()
        .chain(spec.init_containers.iter().flatten());
    for container in containers {
        let resources = container.resources.as_ref();
        for (name, amount) in positive_amounts(resources.and_then(|r| r.requests.as_ref())) {
            *requests.entry(name).or_default() += amount;
        }

        let mut limited = Vec::with_capacity(QOS_RESOURCES.len());
        for (name, amount) in positive_amounts(resources.and_then(|r| r.limits.as_ref())) {
            limited.push(name);
            *limits.entry(name).or_default() += amount;
        }
        if !QOS_RESOURCES.iter().all(|r| limited.contains(r)) {
            guaranteed = false;
        }
    }

    if requests.is_empty() && limits.is_empty() {
        return QosClass::BestEffort;
    }

    if guaranteed && requests.len() == limits.len() {
        let matching = requests
            .iter()
            .all(|(name, amount)| limits.get(name) == Some(amount));
        if matching {
            return QosClass::Guaranteed;
        }
    }
    QosClass::Burstable
}

fn positive_amounts(values: Option<&BTreeMap<String, Quantity>>) -> Vec<(&'static str, i128)> {
    let Some(values) = values else {
        return Vec::new();
    };
    QOS_RESOURCES
        .iter()
        .filter_map(|name| {
            let amount = quantity::nanos(values.get(*name)?)?;
            (amount > 0).then_some((*name, amount))
        })
        .collect()
}
