//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of `ClusterClient` that
//! can be used in unit tests without requiring a running API server.
//!
//! Besides storing objects, the mock records every successful write in a
//! journal and can be told to fail the next call of a given operation, which
//! is how partial failures and concurrent edits are simulated.

mod store;

use crate::cluster_trait::ClusterClient;
use crate::error::ClusterError;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use store::Store;

/// Operations of the `ClusterClient` trait, used for fault injection and the write journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListServices,
    GetService,
    CreateService,
    ReplaceService,
    DeleteService,
    ListEndpoints,
    GetEndpoints,
    CreateEndpoints,
    ReplaceEndpoints,
    DeleteEndpoints,
}

/// A successful write recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub operation: Operation,
    pub namespace: String,
    pub name: String,
}

/// Mock ClusterClient for testing
///
/// Clones share the same underlying state, so a test can keep one handle
/// for assertions while the reconciler owns another.
#[derive(Clone)]
pub struct MockClusterClient {
    services: Arc<Mutex<Store<Service>>>,
    endpoints: Arc<Mutex<Store<Endpoints>>>,
    // Counter for generating resource versions
    next_version: Arc<Mutex<u64>>,
    writes: Arc<Mutex<Vec<Write>>>,
    failures: Arc<Mutex<HashMap<Operation, VecDeque<ClusterError>>>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient")
            .field("services", &lock(&self.services).len())
            .field("endpoints", &lock(&self.endpoints).len())
            .finish_non_exhaustive()
    }
}

impl Default for MockClusterClient {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockClusterClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self {
            services: Arc::new(Mutex::new(Store::new("Service"))),
            endpoints: Arc::new(Mutex::new(Store::new("Endpoints"))),
            next_version: Arc::new(Mutex::new(1)),
            writes: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a service to the mock store (for test setup, not journaled)
    pub fn add_service(&self, service: Service) -> Service {
        let version = self.next_version();
        lock(&self.services)
            .put(&service, version)
            .unwrap_or(service)
    }

    /// Add an endpoints object to the mock store (for test setup, not journaled)
    pub fn add_endpoints(&self, endpoints: Endpoints) -> Endpoints {
        let version = self.next_version();
        lock(&self.endpoints)
            .put(&endpoints, version)
            .unwrap_or(endpoints)
    }

    /// Current stored service, if any
    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        lock(&self.services).get(namespace, name)
    }

    /// Current stored endpoints, if any
    pub fn endpoints(&self, namespace: &str, name: &str) -> Option<Endpoints> {
        lock(&self.endpoints).get(namespace, name)
    }

    /// Simulate another actor editing a stored service, bumping its resourceVersion
    pub fn modify_service(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut Service)) {
        let version = self.next_version();
        let mut services = lock(&self.services);
        if let Some(mut service) = services.get(namespace, name) {
            edit(&mut service);
            let _ = services.put(&service, version);
        }
    }

    /// Make the next call of `operation` fail with `error`
    ///
    /// Calls queue up: registering two failures fails the next two calls.
    pub fn fail_next(&self, operation: Operation, error: ClusterError) {
        lock(&self.failures)
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// All successful writes so far, in order
    pub fn writes(&self) -> Vec<Write> {
        lock(&self.writes).clone()
    }

    /// Forget the recorded writes
    pub fn clear_writes(&self) {
        lock(&self.writes).clear();
    }

    fn next_version(&self) -> u64 {
        let mut version = lock(&self.next_version);
        let current = *version;
        *version += 1;
        current
    }

    fn injected(&self, operation: Operation) -> Result<(), ClusterError> {
        match lock(&self.failures).get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn record(&self, operation: Operation, namespace: &str, name: &str) {
        lock(&self.writes).push(Write {
            operation,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }
}

fn key_of(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> (String, String) {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

#[async_trait::async_trait]
impl ClusterClient for MockClusterClient {
    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>, ClusterError> {
        self.injected(Operation::ListServices)?;
        Ok(lock(&self.services).list(namespace))
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ClusterError> {
        self.injected(Operation::GetService)?;
        Ok(lock(&self.services).get(namespace, name))
    }

    async fn create_service(&self, service: &Service) -> Result<Service, ClusterError> {
        self.injected(Operation::CreateService)?;
        let version = self.next_version();
        let created = lock(&self.services).create(service, version)?;
        let (namespace, name) = key_of(&created.metadata);
        self.record(Operation::CreateService, &namespace, &name);
        Ok(created)
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, ClusterError> {
        self.injected(Operation::ReplaceService)?;
        let version = self.next_version();
        let replaced = lock(&self.services).replace(service, version)?;
        let (namespace, name) = key_of(&replaced.metadata);
        self.record(Operation::ReplaceService, &namespace, &name);
        Ok(replaced)
    }

    async fn delete_service(&self, namespace: &str, name: &str, resource_version: Option<&str>) -> Result<(), ClusterError> {
        self.injected(Operation::DeleteService)?;
        lock(&self.services).delete(namespace, name, resource_version)?;
        self.record(Operation::DeleteService, namespace, name);
        Ok(())
    }

    async fn list_endpoints(&self, namespace: Option<&str>) -> Result<Vec<Endpoints>, ClusterError> {
        self.injected(Operation::ListEndpoints)?;
        Ok(lock(&self.endpoints).list(namespace))
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>, ClusterError> {
        self.injected(Operation::GetEndpoints)?;
        Ok(lock(&self.endpoints).get(namespace, name))
    }

    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints, ClusterError> {
        self.injected(Operation::CreateEndpoints)?;
        let version = self.next_version();
        let created = lock(&self.endpoints).create(endpoints, version)?;
        let (namespace, name) = key_of(&created.metadata);
        self.record(Operation::CreateEndpoints, &namespace, &name);
        Ok(created)
    }

    async fn replace_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints, ClusterError> {
        self.injected(Operation::ReplaceEndpoints)?;
        let version = self.next_version();
        let replaced = lock(&self.endpoints).replace(endpoints, version)?;
        let (namespace, name) = key_of(&replaced.metadata);
        self.record(Operation::ReplaceEndpoints, &namespace, &name);
        Ok(replaced)
    }

    async fn delete_endpoints(&self, namespace: &str, name: &str, resource_version: Option<&str>) -> Result<(), ClusterError> {
        self.injected(Operation::DeleteEndpoints)?;
        lock(&self.endpoints).delete(namespace, name, resource_version)?;
        self.record(Operation::DeleteEndpoints, namespace, name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn service(name: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_assigns_resource_version_and_journals() {
        let client = MockClusterClient::new();
        let created = client.create_service(&service("web-0")).await.unwrap();

        assert!(created.metadata.resource_version.is_some());
        assert_eq!(client.writes(), vec![Write {
            operation: Operation::CreateService,
            namespace: "default".to_string(),
            name: "web-0".to_string(),
        }]);
    }

    #[tokio::test]
    async fn test_create_existing_is_conflict() {
        let client = MockClusterClient::new();
        client.add_service(service("web-0"));

        let err = client.create_service(&service("web-0")).await.unwrap_err();
        assert!(matches!(err, ClusterError::Conflict(_)));
        assert!(client.writes().is_empty());
    }

    #[tokio::test]
    async fn test_replace_with_stale_version_is_conflict() {
        let client = MockClusterClient::new();
        let stored = client.add_service(service("web-0"));
        client.modify_service("default", "web-0", |svc| {
            svc.metadata.labels = Some([("edited".to_string(), "yes".to_string())].into());
        });

        let err = client.replace_service(&stored).await.unwrap_err();
        assert!(matches!(err, ClusterError::Conflict(_)));

        let current = client.service("default", "web-0").unwrap();
        assert!(current.metadata.labels.is_some(), "concurrent edit must survive");
    }

    #[tokio::test]
    async fn test_delete_absent_is_not_found() {
        let client = MockClusterClient::new();
        let err = client.delete_endpoints("default", "web-0", None).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace() {
        let client = MockClusterClient::new();
        client.add_service(service("web-1"));
        client.add_service(service("web-0"));
        client.add_service(Service {
            metadata: ObjectMeta {
                name: Some("web-0".to_string()),
                namespace: Some("other".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });

        let names = |services: Vec<Service>| -> Vec<String> {
            services.into_iter().filter_map(|svc| svc.metadata.name).collect()
        };
        assert_eq!(names(client.list_services(Some("default")).await.unwrap()), vec!["web-0", "web-1"]);
        assert_eq!(client.list_services(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let client = MockClusterClient::new();
        client.fail_next(Operation::GetService, ClusterError::Transient("timeout".into()));

        assert!(client.get_service("default", "web-0").await.is_err());
        assert_eq!(client.get_service("default", "web-0").await.unwrap(), None);
    }
}
