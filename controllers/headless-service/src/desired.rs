//! Desired Service and Endpoints for an eligible pod.
//!
//! Both objects are named after the pod and carry its annotations verbatim so
//! that external tooling can correlate them with their source. The Service is
//! headless (`clusterIP: None`), which makes cluster DNS answer with the
//! Endpoints addresses directly instead of a proxied virtual IP.

use crate::pod::{ObjectKey, PodSnapshot};
use k8s_openapi::api::core::v1::{EndpointAddress, EndpointSubset, Endpoints, Service, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// `spec.clusterIP` value that marks a Service as headless.
pub const HEADLESS_CLUSTER_IP: &str = "None";

/// Desired Service for a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub key: ObjectKey,
    pub annotations: BTreeMap<String, String>,
}

/// Desired Endpoints for a pod: one subset holding one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressListDescriptor {
    pub key: ObjectKey,
    pub annotations: BTreeMap<String, String>,
    pub address: String,
}

/// Everything that should exist for one eligible pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub service: ServiceDescriptor,
    pub endpoints: AddressListDescriptor,
}

/// Builds the desired objects; `None` if the pod has no address yet.
pub fn build(pod: &PodSnapshot) -> Option<DesiredState> {
    let address = pod.address.clone().filter(|ip| !ip.is_empty())?;
    Some(DesiredState {
        service: ServiceDescriptor {
            key: pod.key.clone(),
            annotations: pod.annotations.clone(),
        },
        endpoints: AddressListDescriptor {
            key: pod.key.clone(),
            annotations: pod.annotations.clone(),
            address,
        },
    })
}

fn metadata(key: &ObjectKey, annotations: &BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(key.name.clone()),
        namespace: Some(key.namespace.clone()),
        annotations: (!annotations.is_empty()).then(|| annotations.clone()),
        ..Default::default()
    }
}

// The API server drops empty maps, so absent and empty compare equal.
fn annotations_match(live: Option<&BTreeMap<String, String>>, desired: &BTreeMap<String, String>) -> bool {
    live.map_or(desired.is_empty(), |annotations| annotations == desired)
}

pub(crate) fn is_headless(service: &Service) -> bool {
    service.spec.as_ref()
        .and_then(|spec| spec.cluster_ip.as_deref())
        == Some(HEADLESS_CLUSTER_IP)
}

/// The single ready address of an Endpoints object, if it has exactly that shape.
fn single_address(endpoints: &Endpoints) -> Option<&str> {
    let [subset] = endpoints.subsets.as_deref()? else {
        return None;
    };
    if subset.not_ready_addresses.as_ref().is_some_and(|addresses| !addresses.is_empty()) {
        return None;
    }
    match subset.addresses.as_deref()? {
        [address] => Some(address.ip.as_str()),
        _ => None,
    }
}

impl ServiceDescriptor {
    /// Fresh object for creation.
    pub fn to_service(&self) -> Service {
        Service {
            metadata: metadata(&self.key, &self.annotations),
            spec: Some(ServiceSpec {
                cluster_ip: Some(HEADLESS_CLUSTER_IP.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn matches(&self, live: &Service) -> bool {
        annotations_match(live.metadata.annotations.as_ref(), &self.annotations) && is_headless(live)
    }

    /// In-place update of `live`; keeps its identity and resourceVersion.
    pub fn apply_to(&self, live: &Service) -> Service {
        let mut updated = live.clone();
        updated.metadata.annotations = (!self.annotations.is_empty()).then(|| self.annotations.clone());
        if !is_headless(live) {
            let spec = updated.spec.get_or_insert_with(ServiceSpec::default);
            spec.cluster_ip = Some(HEADLESS_CLUSTER_IP.to_string());
            spec.cluster_ips = Some(vec![HEADLESS_CLUSTER_IP.to_string()]);
        }
        updated.status = None;
        updated
    }
}

impl AddressListDescriptor {
    fn subsets(&self) -> Vec<EndpointSubset> {
        vec![EndpointSubset {
            addresses: Some(vec![EndpointAddress {
                ip: self.address.clone(),
                ..Default::default()
            }]),
            ..Default::default()
        }]
    }

    /// Fresh object for creation.
    pub fn to_endpoints(&self) -> Endpoints {
        Endpoints {
            metadata: metadata(&self.key, &self.annotations),
            subsets: Some(self.subsets()),
        }
    }

    pub fn matches(&self, live: &Endpoints) -> bool {
        annotations_match(live.metadata.annotations.as_ref(), &self.annotations)
            && single_address(live) == Some(self.address.as_str())
    }

    /// In-place update of `live`; keeps its identity and resourceVersion.
    pub fn apply_to(&self, live: &Endpoints) -> Endpoints {
        let mut updated = live.clone();
        updated.metadata.annotations = (!self.annotations.is_empty()).then(|| self.annotations.clone());
        updated.subsets = Some(self.subsets());
        updated
    }
}
