//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! client, the reconciler, the work queue and the Pod watcher together.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::{EventDispatcher, PodWatcher};
use crate::workqueue::WorkQueue;
use cluster_client::{ClusterClient, KubeClusterClient};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for per-pod headless Services.
pub struct Controller {
    pod_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts watching Pods.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Pod Headless Service Controller");

        let kube_client = Client::try_default().await?;

        let pod_api: Api<Pod> = match &config.namespace {
            Some(ns) => Api::namespaced(kube_client.clone(), ns),
            None => Api::all(kube_client.clone()),
        };

        let cluster_client: Arc<dyn ClusterClient> = Arc::new(KubeClusterClient::new(kube_client));
        let reconciler = Reconciler::new(cluster_client.clone(), config.annotation_key.clone());
        let queue = WorkQueue::new(Arc::new(reconciler), config.queue.clone());

        let dispatcher = EventDispatcher::new(
            queue,
            cluster_client,
            config.annotation_key,
            config.namespace,
            config.queue,
        );
        let watcher = PodWatcher::new(pod_api, dispatcher);
        let pod_watcher = tokio::spawn(async move { watcher.watch_pods().await });

        Ok(Self { pod_watcher })
    }

    /// Runs the controller until the watcher exits or the process is interrupted.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Pod Headless Service Controller running");

        tokio::select! {
            result = &mut self.pod_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Pod watcher panicked: {}", e)))??;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| ControllerError::Watch(format!("Failed to listen for shutdown signal: {}", e)))?;
                info!("Shutdown signal received, stopping");
                self.pod_watcher.abort();
            }
        }

        Ok(())
    }
}
