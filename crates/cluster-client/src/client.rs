//! `ClusterClient` backed by the Kubernetes API server

use crate::error::ClusterError;
use crate::cluster_trait::ClusterClient;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::api::{Api, DeleteParams, ListParams, PostParams, Preconditions};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Cluster API client for Services and Endpoints
///
/// Holds a shared `kube::Client`; `Api` handles are built per call because
/// every operation is namespaced by the pod it serves.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Create a new client from an existing Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn list<K>(&self, namespace: Option<&str>) -> Result<Vec<K>, ClusterError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        debug!("LIST {} in {}", K::kind(&K::DynamicType::default()), namespace.unwrap_or("all namespaces"));
        let api: Api<K> = match namespace {
            Some(namespace) => self.api(namespace),
            None => Api::all(self.client.clone()),
        };
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, ClusterError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        debug!("GET {} {}/{}", K::kind(&K::DynamicType::default()), namespace, name);
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create<K>(&self, object: &K) -> Result<K, ClusterError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
    {
        let (namespace, name) = object_key(object)?;
        debug!("CREATE {} {}/{}", K::kind(&K::DynamicType::default()), namespace, name);
        Ok(self.api::<K>(namespace).create(&PostParams::default(), object).await?)
    }

    async fn replace<K>(&self, object: &K) -> Result<K, ClusterError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
    {
        let (namespace, name) = object_key(object)?;
        debug!(
            "REPLACE {} {}/{} at resourceVersion {}",
            K::kind(&K::DynamicType::default()),
            namespace,
            name,
            object.meta().resource_version.as_deref().unwrap_or("<none>")
        );
        Ok(self.api::<K>(namespace).replace(name, &PostParams::default(), object).await?)
    }

    async fn delete<K>(&self, namespace: &str, name: &str, resource_version: Option<&str>) -> Result<(), ClusterError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        debug!("DELETE {} {}/{}", K::kind(&K::DynamicType::default()), namespace, name);
        let params = DeleteParams {
            preconditions: resource_version.map(|version| Preconditions {
                resource_version: Some(version.to_string()),
                uid: None,
            }),
            ..DeleteParams::default()
        };
        self.api::<K>(namespace).delete(name, &params).await?;
        Ok(())
    }
}

/// Namespace and name of an object about to be written
fn object_key<K: Resource>(object: &K) -> Result<(&str, &str), ClusterError> {
    let meta = object.meta();
    match (meta.namespace.as_deref(), meta.name.as_deref()) {
        (Some(namespace), Some(name)) => Ok((namespace, name)),
        _ => Err(ClusterError::Invalid("object is missing namespace or name".to_string())),
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>, ClusterError> {
        self.list(namespace).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ClusterError> {
        self.get(namespace, name).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service, ClusterError> {
        self.create(service).await
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, ClusterError> {
        self.replace(service).await
    }

    async fn delete_service(&self, namespace: &str, name: &str, resource_version: Option<&str>) -> Result<(), ClusterError> {
        self.delete::<Service>(namespace, name, resource_version).await
    }

    async fn list_endpoints(&self, namespace: Option<&str>) -> Result<Vec<Endpoints>, ClusterError> {
        self.list(namespace).await
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>, ClusterError> {
        self.get(namespace, name).await
    }

    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints, ClusterError> {
        self.create(endpoints).await
    }

    async fn replace_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints, ClusterError> {
        self.replace(endpoints).await
    }

    async fn delete_endpoints(&self, namespace: &str, name: &str, resource_version: Option<&str>) -> Result<(), ClusterError> {
        self.delete::<Endpoints>(namespace, name, resource_version).await
    }
}
