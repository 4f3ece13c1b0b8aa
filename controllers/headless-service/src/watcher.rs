//! Pod watcher.
//!
//! This module watches Pods and turns every watch event into a `PodEvent`
//! on the work queue. Objects listed during (re)initialization are
//! delivered as `Added`, live changes as `Updated` and removals as
//! `Deleted`, so a restart or a relist simply replays the current cluster
//! state through the same reconciliation path.
//!
//! A relist carries no deletions for pods that disappeared while the watch
//! was down. After every listing the derived Services and Endpoints are
//! listed too, and each one that still carries the opt-in annotation but
//! belongs to no listed pod gets a `Deleted` event of its own.

use crate::backoff::ExponentialBackoff;
use crate::error::ControllerError;
use crate::pod::{ObjectKey, PodEvent, PodSnapshot};
use crate::workqueue::{QueueSettings, WorkQueue};
use cluster_client::{ClusterClient, ClusterError};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Api;
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Watches Pods and feeds the work queue.
pub struct PodWatcher {
    pod_api: Api<Pod>,
    dispatcher: EventDispatcher,
}

impl PodWatcher {
    pub fn new(pod_api: Api<Pod>, dispatcher: EventDispatcher) -> Self {
        Self { pod_api, dispatcher }
    }

    /// Runs until the watch stream ends, which it only does on shutdown of the client.
    ///
    /// Watch errors are logged; the stream reconnects with backoff on its own.
    pub async fn watch_pods(mut self) -> Result<(), ControllerError> {
        info!("Starting Pod watcher");

        let mut stream = Box::pin(watcher(self.pod_api.clone(), watcher::Config::default()).default_backoff());

        while let Some(result) = stream.next().await {
            match result {
                // The queue owns the passes from here on
                Ok(event) => drop(self.dispatcher.dispatch(event).await),
                Err(e) => warn!("Pod watch error, retrying: {}", e),
            }
        }

        Err(ControllerError::Watch("Pod watch stream ended".to_string()))
    }
}

/// Routes watch events to the work queue and tracks which pods a listing returned.
pub struct EventDispatcher {
    queue: WorkQueue,
    cluster_client: Arc<dyn ClusterClient>,
    annotation_key: String,
    namespace: Option<String>,
    retry: QueueSettings,
    /// Keys seen since the last `Init`; `None` outside a listing
    listed: Option<BTreeSet<ObjectKey>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("annotation_key", &self.annotation_key)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    pub fn new(
        queue: WorkQueue,
        cluster_client: Arc<dyn ClusterClient>,
        annotation_key: impl Into<String>,
        namespace: Option<String>,
        retry: QueueSettings,
    ) -> Self {
        Self {
            queue,
            cluster_client,
            annotation_key: annotation_key.into(),
            namespace,
            retry,
            listed: None,
        }
    }

    /// Handles one watch event and returns the passes it queued.
    ///
    /// The orphan sweep on `InitDone` runs before the next event is taken
    /// from the stream, so its deletions are always queued ahead of any
    /// later event for the same key.
    pub async fn dispatch(&mut self, event: watcher::Event<Pod>) -> Vec<JoinHandle<()>> {
        match event {
            watcher::Event::Init => {
                info!("Pod watcher listing");
                self.listed = Some(BTreeSet::new());
                Vec::new()
            }
            watcher::Event::InitDone => {
                info!("Pod watcher listing complete");
                match self.listed.take() {
                    Some(listed) => self.sweep(&listed).await,
                    None => Vec::new(),
                }
            }
            event => {
                let Some(event) = to_pod_event(event) else {
                    return Vec::new();
                };
                if let (PodEvent::Added(pod), Some(listed)) = (&event, self.listed.as_mut()) {
                    listed.insert(pod.key.clone());
                }
                debug!("Pod {} {}", event.key(), event.kind());
                vec![self.queue.enqueue(event)]
            }
        }
    }

    /// Queues a `Deleted` event for every derived object without a listed pod.
    async fn sweep(&self, listed: &BTreeSet<ObjectKey>) -> Vec<JoinHandle<()>> {
        let (services, endpoints) = match self.list_derived().await {
            Ok(found) => found,
            Err(e) => {
                error!("Orphan sweep failed, objects of pods deleted while unwatched stay until the next listing: {}", e);
                return Vec::new();
            }
        };

        orphaned_keys(listed, &services, &endpoints, &self.annotation_key)
            .into_iter()
            .map(|key| {
                info!("Pod {} is gone, removing its Service and Endpoints", key);
                self.queue.enqueue(PodEvent::Deleted(PodSnapshot {
                    key,
                    annotations: BTreeMap::new(),
                    address: None,
                }))
            })
            .collect()
    }

    async fn list_derived(&self) -> Result<(Vec<Service>, Vec<Endpoints>), ClusterError> {
        let namespace = self.namespace.as_deref();
        let mut backoff = ExponentialBackoff::new(self.retry.retry_initial_delay, self.retry.retry_max_delay);
        let mut retries = 0;

        loop {
            let listed = tokio::try_join!(
                self.cluster_client.list_services(namespace),
                self.cluster_client.list_endpoints(namespace),
            );
            match listed {
                Ok(found) => return Ok(found),
                Err(e) if e.is_transient() && retries < self.retry.max_retries => {
                    retries += 1;
                    let delay = backoff.next_backoff();
                    warn!("Listing Services and Endpoints failed (retry {}), retrying in {:?}: {}", retries, delay, e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Maps a raw watch event to a pod lifecycle event.
///
/// Returns `None` for the init markers and for pods that can not be keyed.
fn to_pod_event(event: watcher::Event<Pod>) -> Option<PodEvent> {
    let (pod, wrap): (Pod, fn(PodSnapshot) -> PodEvent) = match event {
        watcher::Event::InitApply(pod) => (pod, PodEvent::Added),
        watcher::Event::Apply(pod) => (pod, PodEvent::Updated),
        watcher::Event::Delete(pod) => (pod, PodEvent::Deleted),
        watcher::Event::Init | watcher::Event::InitDone => return None,
    };

    match PodSnapshot::try_from(&pod) {
        Ok(snapshot) => Some(wrap(snapshot)),
        Err(e) => {
            warn!("Ignoring Pod event: {}", e);
            None
        }
    }
}

fn carries_opt_in(meta: &ObjectMeta, annotation_key: &str) -> bool {
    meta.annotations
        .as_ref()
        .and_then(|annotations| annotations.get(annotation_key))
        .is_some_and(|value| value == "true")
}

fn key_of(meta: &ObjectMeta) -> Option<ObjectKey> {
    Some(ObjectKey::new(meta.namespace.clone()?, meta.name.clone()?))
}

/// Keys of opted-in Services or Endpoints whose pod was not in the listing.
fn orphaned_keys(
    listed: &BTreeSet<ObjectKey>,
    services: &[Service],
    endpoints: &[Endpoints],
    annotation_key: &str,
) -> BTreeSet<ObjectKey> {
    services
        .iter()
        .map(|service| &service.metadata)
        .chain(endpoints.iter().map(|endpoints| &endpoints.metadata))
        .filter(|meta| carries_opt_in(meta, annotation_key))
        .filter_map(key_of)
        .filter(|key| !listed.contains(key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::Reconciler;
    use crate::test_utils::{pod_object, TEST_ANNOTATION};
    use cluster_client::{MockClusterClient, Operation};
    use std::time::Duration;

    fn settings() -> QueueSettings {
        QueueSettings {
            max_concurrent_reconciles: 4,
            retry_initial_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(4),
            max_retries: 2,
            permanent_retry_delay: Duration::from_millis(5),
        }
    }

    fn dispatcher(mock: &MockClusterClient) -> EventDispatcher {
        let client: Arc<dyn ClusterClient> = Arc::new(mock.clone());
        let reconciler = Reconciler::new(client.clone(), TEST_ANNOTATION);
        let queue = WorkQueue::new(Arc::new(reconciler), settings());
        EventDispatcher::new(queue, client, TEST_ANNOTATION, None, settings())
    }

    fn opted_in_pod(name: &str, ip: &str) -> Pod {
        pod_object("default", Some(name), &[(TEST_ANNOTATION, "true")], Some(ip))
    }

    async fn feed(dispatcher: &mut EventDispatcher, events: Vec<watcher::Event<Pod>>) {
        for event in events {
            for handle in dispatcher.dispatch(event).await {
                handle.await.unwrap();
            }
        }
    }

    fn derived(name: &str, annotations: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            annotations: Some(annotations.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn test_event_mapping() {
        let pod = || pod_object("default", Some("web-0"), &[], Some("10.0.0.1"));

        let added = to_pod_event(watcher::Event::InitApply(pod())).unwrap();
        assert!(matches!(added, PodEvent::Added(_)));

        let updated = to_pod_event(watcher::Event::Apply(pod())).unwrap();
        assert!(matches!(updated, PodEvent::Updated(_)));

        let deleted = to_pod_event(watcher::Event::Delete(pod())).unwrap();
        assert!(deleted.is_delete());
        assert_eq!(deleted.key(), &ObjectKey::new("default", "web-0"));
    }

    #[test]
    fn test_init_markers_are_skipped() {
        assert!(to_pod_event(watcher::Event::Init).is_none());
        assert!(to_pod_event(watcher::Event::InitDone).is_none());
    }

    #[test]
    fn test_unkeyable_pod_is_skipped() {
        let nameless = pod_object("default", None, &[], None);
        assert!(to_pod_event(watcher::Event::Apply(nameless)).is_none());
    }

    #[test]
    fn test_orphaned_keys() {
        let listed = BTreeSet::from([ObjectKey::new("default", "web-1")]);
        let services = vec![
            Service { metadata: derived("web-0", &[(TEST_ANNOTATION, "true")]), ..Default::default() },
            Service { metadata: derived("web-1", &[(TEST_ANNOTATION, "true")]), ..Default::default() },
            // not derived from a pod
            Service { metadata: derived("api", &[]), ..Default::default() },
        ];
        let endpoints = vec![Endpoints {
            metadata: derived("web-2", &[(TEST_ANNOTATION, "true")]),
            ..Default::default()
        }];

        let orphans = orphaned_keys(&listed, &services, &endpoints, TEST_ANNOTATION);
        assert_eq!(orphans, BTreeSet::from([ObjectKey::new("default", "web-0"), ObjectKey::new("default", "web-2")]));
    }

    #[tokio::test]
    async fn test_relist_removes_objects_of_vanished_pods() {
        let mock = MockClusterClient::new();
        let mut dispatcher = dispatcher(&mock);

        feed(&mut dispatcher, vec![
            watcher::Event::Init,
            watcher::Event::InitApply(opted_in_pod("web-0", "10.0.0.1")),
            watcher::Event::InitDone,
        ])
        .await;
        assert!(mock.service("default", "web-0").is_some());

        // web-0 was deleted while the watch was down; the relist only shows web-1
        feed(&mut dispatcher, vec![
            watcher::Event::Init,
            watcher::Event::InitApply(opted_in_pod("web-1", "10.0.0.2")),
            watcher::Event::InitDone,
        ])
        .await;

        assert!(mock.service("default", "web-0").is_none());
        assert!(mock.endpoints("default", "web-0").is_none());
        assert!(mock.service("default", "web-1").is_some());
        assert!(mock.endpoints("default", "web-1").is_some());
    }

    #[tokio::test]
    async fn test_relist_keeps_objects_it_did_not_derive() {
        let mock = MockClusterClient::new();
        mock.add_service(Service { metadata: derived("api", &[]), ..Default::default() });
        let mut dispatcher = dispatcher(&mock);

        feed(&mut dispatcher, vec![watcher::Event::Init, watcher::Event::InitDone]).await;

        assert!(mock.service("default", "api").is_some());
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_retries_transient_list_failures() {
        let mock = MockClusterClient::new();
        mock.add_service(Service {
            metadata: derived("web-0", &[(TEST_ANNOTATION, "true")]),
            ..Default::default()
        });
        mock.fail_next(Operation::ListServices, ClusterError::Transient("503".into()));
        let mut dispatcher = dispatcher(&mock);

        feed(&mut dispatcher, vec![watcher::Event::Init, watcher::Event::InitDone]).await;

        assert!(mock.service("default", "web-0").is_none());
    }
}
