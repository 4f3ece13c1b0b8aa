//! Pod snapshots and lifecycle events.
//!
//! The watcher hands out full `Pod` objects; reconciliation only ever needs
//! the key, the annotations and the assigned address, so events are reduced
//! to a `PodSnapshot` as soon as they arrive.

use crate::error::ControllerError;
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;
use std::fmt;

/// Namespace and name shared by a pod and its derived Service and Endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Read-only view of a pod at the time an event was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSnapshot {
    pub key: ObjectKey,
    pub annotations: BTreeMap<String, String>,
    /// Assigned pod IP; `None` until the pod has been scheduled and networked
    pub address: Option<String>,
}

impl TryFrom<&Pod> for PodSnapshot {
    type Error = ControllerError;

    fn try_from(pod: &Pod) -> Result<Self, Self::Error> {
        let name = pod.metadata.name.clone()
            .ok_or_else(|| ControllerError::InvalidPod("Pod missing name".to_string()))?;
        let namespace = pod.metadata.namespace.clone()
            .ok_or_else(|| ControllerError::InvalidPod(format!("Pod {} missing namespace", name)))?;

        let address = pod.status.as_ref()
            .and_then(|status| status.pod_ip.clone())
            .filter(|ip| !ip.is_empty());

        Ok(Self {
            key: ObjectKey::new(namespace, name),
            annotations: pod.metadata.annotations.clone().unwrap_or_default(),
            address,
        })
    }
}

/// A delivered pod lifecycle notification.
///
/// Added and Updated share all reconciliation logic; Deleted forces the
/// derived objects to be removed regardless of what the snapshot says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodEvent {
    Added(PodSnapshot),
    Updated(PodSnapshot),
    Deleted(PodSnapshot),
}

impl PodEvent {
    pub fn pod(&self) -> &PodSnapshot {
        match self {
            Self::Added(pod) | Self::Updated(pod) | Self::Deleted(pod) => pod,
        }
    }

    pub fn key(&self) -> &ObjectKey {
        &self.pod().key
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }

    /// Short label for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Updated(_) => "updated",
            Self::Deleted(_) => "deleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::pod_object;

    #[test]
    fn test_snapshot_from_pod() {
        let pod = pod_object("default", Some("web-0"), &[("opt-in", "true")], Some("10.0.0.1"));
        let snapshot = PodSnapshot::try_from(&pod).unwrap();

        assert_eq!(snapshot.key, ObjectKey::new("default", "web-0"));
        assert_eq!(snapshot.annotations.get("opt-in").map(String::as_str), Some("true"));
        assert_eq!(snapshot.address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_empty_pod_ip_is_no_address() {
        let pod = pod_object("default", Some("web-0"), &[], Some(""));
        let snapshot = PodSnapshot::try_from(&pod).unwrap();
        assert_eq!(snapshot.address, None);
    }

    #[test]
    fn test_pod_without_name_is_invalid() {
        let pod = pod_object("default", None, &[], Some("10.0.0.1"));
        let err = PodSnapshot::try_from(&pod).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidPod(_)));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ObjectKey::new("default", "web-0").to_string(), "default/web-0");
    }
}
