//! Pod Headless Service Controller
//!
//! Gives every pod that opts in through an annotation its own headless
//! Service and a single-address Endpoints object of the same name, so the
//! pod is reachable at a stable DNS name. The derived objects follow the
//! pod's address and annotations and are removed when the pod goes away or
//! stops qualifying.

mod backoff;
mod config;
mod controller;
mod desired;
mod eligibility;
mod error;
mod plan;
mod pod;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;
mod workqueue;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // kube's rustls-tls needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Pod Headless Service Controller");

    let config = ControllerConfig::from_env().inspect_err(|e| error!("{}", e))?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Annotation: {}", config.annotation_key);
    info!("  Max concurrent reconciles: {}", config.queue.max_concurrent_reconciles);
    info!(
        "  Retry: {:?} initial, {:?} max, {} retries, {:?} after permanent failures",
        config.queue.retry_initial_delay,
        config.queue.retry_max_delay,
        config.queue.max_retries,
        config.queue.permanent_retry_delay
    );

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
