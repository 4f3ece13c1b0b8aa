//! Cluster API errors

use thiserror::Error;

/// Errors that can occur when reading or writing Services and Endpoints
///
/// The variants follow the outcome classes the reconciler cares about rather
/// than the transport that produced them, so a mock can produce the exact
/// same errors as the real API server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write rejected because the object changed since it was read,
    /// or because it already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network failure, timeout, throttling or server-side error
    #[error("Transient API error: {0}")]
    Transient(String),

    /// Credentials rejected or RBAC denied the request
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Request rejected as malformed by the API server
    #[error("Invalid request: {0}")]
    Invalid(String),
}

impl ClusterError {
    /// Returns true if retrying the same pass may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Transient(_))
    }

    /// Classifies an HTTP status code returned by the API server.
    pub fn from_status(code: u16, message: String) -> Self {
        match code {
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            401 | 403 => Self::Unauthorized(message),
            400 | 405 | 406 | 413 | 415 | 422 => Self::Invalid(message),
            _ => Self::Transient(message),
        }
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        let message = err.to_string();
        match &err {
            kube::Error::Api(response) => Self::from_status(response.code, message),
            kube::Error::SerdeError(_) => Self::Invalid(message),
            kube::Error::Auth(_) => Self::Unauthorized(message),
            _ => Self::Transient(message),
        }
    }
}
