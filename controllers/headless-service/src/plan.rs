//! Pure diff between desired and actual state.
//!
//! There is no stored per-key state machine: the case (create, update,
//! delete, no-op) falls out of comparing an optional desired state with the
//! objects just read from the cluster.

use crate::desired::DesiredState;
use k8s_openapi::api::core::v1::{Endpoints, Service};

/// Objects currently stored under a key, as read in this pass.
#[derive(Debug, Clone, Default)]
pub struct ActualState {
    pub service: Option<Service>,
    pub endpoints: Option<Endpoints>,
}

/// One write against the cluster.
#[derive(Debug, Clone)]
pub enum Step {
    CreateService(Service),
    UpdateService(Service),
    CreateEndpoints(Endpoints),
    UpdateEndpoints(Endpoints),
    /// Carries the resourceVersion that was read, used as delete precondition
    DeleteEndpoints(Option<String>),
    DeleteService(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    CreateService,
    UpdateService,
    CreateEndpoints,
    UpdateEndpoints,
    DeleteEndpoints,
    DeleteService,
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::CreateService(_) => StepKind::CreateService,
            Self::UpdateService(_) => StepKind::UpdateService,
            Self::CreateEndpoints(_) => StepKind::CreateEndpoints,
            Self::UpdateEndpoints(_) => StepKind::UpdateEndpoints,
            Self::DeleteEndpoints(_) => StepKind::DeleteEndpoints,
            Self::DeleteService(_) => StepKind::DeleteService,
        }
    }
}

/// Computes the ordered writes that converge `actual` onto `desired`.
///
/// With a desired state, the Service is written before the Endpoints so a
/// visible address list always has a resolvable name. Without one, the
/// Endpoints go first and the Service last.
pub fn plan(desired: Option<&DesiredState>, actual: &ActualState) -> Vec<Step> {
    let mut steps = Vec::new();

    match desired {
        Some(desired) => {
            match &actual.service {
                None => steps.push(Step::CreateService(desired.service.to_service())),
                Some(live) if !desired.service.matches(live) => {
                    steps.push(Step::UpdateService(desired.service.apply_to(live)));
                }
                Some(_) => {}
            }
            match &actual.endpoints {
                None => steps.push(Step::CreateEndpoints(desired.endpoints.to_endpoints())),
                Some(live) if !desired.endpoints.matches(live) => {
                    steps.push(Step::UpdateEndpoints(desired.endpoints.apply_to(live)));
                }
                Some(_) => {}
            }
        }
        None => {
            if let Some(live) = &actual.endpoints {
                steps.push(Step::DeleteEndpoints(live.metadata.resource_version.clone()));
            }
            if let Some(live) = &actual.service {
                steps.push(Step::DeleteService(live.metadata.resource_version.clone()));
            }
        }
    }

    steps
}
