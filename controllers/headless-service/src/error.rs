//! Controller-specific error types.
//!
//! This module defines error types specific to the Pod Headless Service
//! Controller that are not covered by upstream library errors.

use cluster_client::ClusterError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the Pod Headless Service Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client setup error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Service or Endpoints read/write failed
    #[error("Cluster API error: {0}")]
    Cluster(#[from] ClusterError),

    /// Pod snapshot could not be used
    #[error("Invalid pod: {0}")]
    InvalidPod(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transient failures kept happening until the retry budget ran out
    #[error("Retries exhausted after {retries} retries: {source}")]
    RetriesExhausted {
        retries: u32,
        #[source]
        source: ClusterError,
    },

    /// A Service with a cluster IP sits under the pod's name; the API server
    /// never lets `spec.clusterIP` change, so it can not be made headless
    #[error("Service {service} has a cluster IP and spec.clusterIP is immutable; delete it to let a headless Service take its place: {source}")]
    ClusterIpImmutable {
        service: String,
        #[source]
        source: ClusterError,
    },

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// How the work queue treats a failed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry soon with backoff
    Transient,
    /// Drop this event; later events for the key are unaffected
    Validation,
    /// Surface loudly and retry on the long delay
    Permanent,
}

impl ControllerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            // An update racing a delete reports NotFound; the next read sorts it out.
            Self::Cluster(ClusterError::NotFound(_)) => ErrorClass::Transient,
            Self::Cluster(err) if err.is_transient() => ErrorClass::Transient,
            Self::InvalidPod(_) => ErrorClass::Validation,
            Self::Cluster(_)
            | Self::RetriesExhausted { .. }
            | Self::ClusterIpImmutable { .. }
            | Self::Kube(_)
            | Self::InvalidConfig(_)
            | Self::Watch(_) => ErrorClass::Permanent,
        }
    }
}
