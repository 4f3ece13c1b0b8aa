//! Reconciliation logic for annotated pods.
//!
//! One pass per delivered event: evaluate the pod, build the desired
//! Service/Endpoints, read what the cluster holds right now, diff, and apply
//! the resulting steps in order. Nothing is remembered between passes, so
//! re-running a pass after a crash or a failure is always safe.

use crate::desired::{self, DesiredState};
use crate::eligibility::evaluate;
use crate::error::ControllerError;
use crate::plan::{plan, ActualState, Step, StepKind};
use crate::pod::{ObjectKey, PodEvent};
use crate::workqueue::PassToken;
use cluster_client::{ClusterClient, ClusterError};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a pass that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Actual state already matched; nothing written
    InSync,
    /// Steps applied, in order
    Applied(Vec<StepKind>),
    /// A newer event for the key arrived before the first write
    Abandoned,
}

/// Reconciles the derived Service and Endpoints of pods.
pub struct Reconciler {
    pub(crate) cluster_client: Arc<dyn ClusterClient>,
    annotation_key: String,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("annotation_key", &self.annotation_key)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(cluster_client: Arc<dyn ClusterClient>, annotation_key: impl Into<String>) -> Self {
        Self {
            cluster_client,
            annotation_key: annotation_key.into(),
        }
    }

    /// Runs one reconciliation pass for the event's key.
    ///
    /// This method:
    /// 1. Decides the desired state (a delete event always means "absent")
    /// 2. Reads the live Service and Endpoints
    /// 3. Plans the writes and applies them unless the pass was superseded
    ///
    /// Writes of existing objects are conditional on the resourceVersion read
    /// in step 2; a concurrent edit fails the pass with a conflict instead of
    /// being overwritten.
    pub async fn reconcile(&self, event: &PodEvent, token: &PassToken) -> Result<PassOutcome, ControllerError> {
        let key = event.key();
        if key.namespace.is_empty() || key.name.is_empty() {
            return Err(ControllerError::InvalidPod(format!("Pod {:?} has an empty namespace or name", key)));
        }

        debug!("Reconciling Pod {} ({})", key, event.kind());

        let desired = self.desired_state(event);
        let actual = self.read_actual(key).await?;
        let adopts_cluster_ip = actual.service.as_ref().is_some_and(|svc| !desired::is_headless(svc));
        let steps = plan(desired.as_ref(), &actual);

        if steps.is_empty() {
            debug!("Pod {} already in sync", key);
            return Ok(PassOutcome::InSync);
        }

        if token.is_superseded() {
            debug!("Pass for Pod {} superseded by a newer event, abandoning before writes", key);
            return Ok(PassOutcome::Abandoned);
        }

        let mut applied = Vec::with_capacity(steps.len());
        for step in steps {
            let kind = step.kind();
            match self.apply(key, step).await {
                Err(ControllerError::Cluster(source @ ClusterError::Invalid(_)))
                    if kind == StepKind::UpdateService && adopts_cluster_ip =>
                {
                    return Err(ControllerError::ClusterIpImmutable {
                        service: key.to_string(),
                        source,
                    });
                }
                result => result?,
            }
            applied.push(kind);
        }

        Ok(PassOutcome::Applied(applied))
    }

    fn desired_state(&self, event: &PodEvent) -> Option<DesiredState> {
        if event.is_delete() {
            return None;
        }
        let pod = event.pod();
        let verdict = evaluate(pod, &self.annotation_key);
        if !verdict.is_eligible() {
            debug!("Pod {} not eligible: {}", pod.key, verdict.reason());
            return None;
        }
        desired::build(pod)
    }

    async fn read_actual(&self, key: &ObjectKey) -> Result<ActualState, ControllerError> {
        let (service, endpoints) = tokio::try_join!(
            self.cluster_client.get_service(&key.namespace, &key.name),
            self.cluster_client.get_endpoints(&key.namespace, &key.name),
        )?;
        Ok(ActualState { service, endpoints })
    }

    async fn apply(&self, key: &ObjectKey, step: Step) -> Result<(), ControllerError> {
        let client = &self.cluster_client;
        match step {
            Step::CreateService(service) => {
                client.create_service(&service).await?;
                info!("Created headless Service {}", key);
            }
            Step::UpdateService(service) => {
                client.replace_service(&service).await?;
                info!("Updated Service {}", key);
            }
            Step::CreateEndpoints(endpoints) => {
                client.create_endpoints(&endpoints).await?;
                info!("Created Endpoints {}", key);
            }
            Step::UpdateEndpoints(endpoints) => {
                client.replace_endpoints(&endpoints).await?;
                info!("Updated Endpoints {}", key);
            }
            Step::DeleteEndpoints(version) => {
                match client.delete_endpoints(&key.namespace, &key.name, version.as_deref()).await {
                    Ok(()) => info!("Deleted Endpoints {}", key),
                    Err(ClusterError::NotFound(_)) => debug!("Endpoints {} already absent", key),
                    Err(e) => return Err(e.into()),
                }
            }
            Step::DeleteService(version) => {
                match client.delete_service(&key.namespace, &key.name, version.as_deref()).await {
                    Ok(()) => info!("Deleted Service {}", key),
                    Err(ClusterError::NotFound(_)) => debug!("Service {} already absent", key),
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}
