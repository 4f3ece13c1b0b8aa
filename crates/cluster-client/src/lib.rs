//! Cluster API Client
//!
//! Read and write access to the Services and Endpoints that the pod
//! headless-service controller derives from annotated pods.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClient, KubeClusterClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::new(kube::Client::try_default().await?);
//!
//! // Reads are never cached; an absent object is `None`
//! if let Some(service) = client.get_service("default", "web-0").await? {
//!     println!("{:?}", service.spec);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Error classification**: API failures are mapped to
//!   `ClusterError` variants (not found, conflict, transient, unauthorized, invalid)
//! - **Conditional writes**: replace and delete carry the resourceVersion
//!   that was read, so concurrent edits surface as `ClusterError::Conflict`
//! - **Mocking**: `MockClusterClient` (feature `test-util`) for unit tests

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClient;
pub use error::ClusterError;
#[cfg(feature = "test-util")]
pub use mock::{MockClusterClient, Operation, Write};
