//! ClusterClient trait for mocking
//!
//! This trait abstracts the Service and Endpoints operations the reconciler
//! performs so that reconciliation passes can run against an in-memory
//! implementation in unit tests.

use crate::error::ClusterError;
use k8s_openapi::api::core::v1::{Endpoints, Service};

/// Trait for cluster API operations on the derived objects
///
/// Reads always go to the API server; implementations must not cache.
/// Writes of existing objects are conditional on the `resourceVersion`
/// carried in the object metadata.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    // Services
    /// All Services in `namespace`, or in every namespace for `None`
    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>, ClusterError>;
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ClusterError>;
    async fn create_service(&self, service: &Service) -> Result<Service, ClusterError>;
    async fn replace_service(&self, service: &Service) -> Result<Service, ClusterError>;
    async fn delete_service(&self, namespace: &str, name: &str, resource_version: Option<&str>) -> Result<(), ClusterError>;

    // Endpoints
    async fn list_endpoints(&self, namespace: Option<&str>) -> Result<Vec<Endpoints>, ClusterError>;
    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>, ClusterError>;
    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints, ClusterError>;
    async fn replace_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints, ClusterError>;
    async fn delete_endpoints(&self, namespace: &str, name: &str, resource_version: Option<&str>) -> Result<(), ClusterError>;
}
