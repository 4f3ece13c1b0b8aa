//! Test utilities for unit testing the controller
//!
//! This module provides helpers for creating pods, snapshots and for
//! inspecting the mock cluster client.

use crate::pod::{ObjectKey, PodSnapshot};
use cluster_client::{MockClusterClient, Operation};
use k8s_openapi::api::core::v1::Pod;

/// Opt-in annotation key used throughout the tests
pub const TEST_ANNOTATION: &str = "srcd.host/create-headless-service";

/// Helper to create a pod snapshot
pub fn snapshot(namespace: &str, name: &str, annotations: &[(&str, &str)], address: Option<&str>) -> PodSnapshot {
    PodSnapshot {
        key: ObjectKey::new(namespace, name),
        annotations: annotations
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        address: address.map(str::to_string),
    }
}

/// Helper to create an opted-in pod snapshot in the `default` namespace
pub fn opted_in(name: &str, address: &str) -> PodSnapshot {
    snapshot("default", name, &[(TEST_ANNOTATION, "true")], Some(address))
}

/// Helper to create a Pod object as the watcher would deliver it
pub fn pod_object(namespace: &str, name: Option<&str>, annotations: &[(&str, &str)], pod_ip: Option<&str>) -> Pod {
    let annotations: serde_json::Map<String, serde_json::Value> = annotations
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
        .collect();

    let mut pod = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "namespace": namespace,
            "annotations": annotations,
        },
        "spec": {
            "containers": [{ "name": "app", "image": "nginx" }],
        },
        "status": {},
    });
    if let Some(name) = name {
        pod["metadata"]["name"] = name.into();
    }
    if let Some(ip) = pod_ip {
        pod["status"]["podIP"] = ip.into();
    }

    serde_json::from_value(pod).unwrap()
}

/// Operations of the writes recorded by the mock, in order
pub fn operations(mock: &MockClusterClient) -> Vec<Operation> {
    mock.writes().into_iter().map(|write| write.operation).collect()
}
