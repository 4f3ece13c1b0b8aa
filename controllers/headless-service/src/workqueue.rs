//! Keyed work queue for reconciliation passes.
//!
//! Passes for different pods run concurrently, bounded by a semaphore.
//! Passes for the same pod never overlap: each key has its own async mutex,
//! and every enqueue stamps the key with a fresh sequence number so that a
//! pass for an older event is skipped (or abandoned before its first write)
//! once a newer event for the same key is waiting.
//!
//! Failed passes are retried here:
//! - transient errors with exponential backoff, up to `max_retries`
//! - permanent errors (and exhausted retries) on the long `permanent_retry_delay`
//! - validation errors are dropped for that event only

use crate::backoff::ExponentialBackoff;
use crate::error::{ControllerError, ErrorClass};
use crate::pod::{ObjectKey, PodEvent};
use crate::reconciler::{PassOutcome, Reconciler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Scheduling and retry parameters.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub max_concurrent_reconciles: usize,
    pub retry_initial_delay: Duration,
    pub retry_max_delay: Duration,
    pub max_retries: u32,
    pub permanent_retry_delay: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: 4,
            retry_initial_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(30),
            max_retries: 6,
            permanent_retry_delay: Duration::from_secs(300),
        }
    }
}

/// Per-key serialization lock and latest sequence number.
#[derive(Debug, Default)]
struct KeySlot {
    lock: tokio::sync::Mutex<()>,
    latest: AtomicU64,
}

/// Handed to a pass so it can tell whether a newer event has been queued for its key.
#[derive(Debug, Clone)]
pub struct PassToken {
    slot: Arc<KeySlot>,
    seq: u64,
}

impl PassToken {
    pub fn is_superseded(&self) -> bool {
        self.slot.latest.load(Ordering::SeqCst) != self.seq
    }

    /// Token for a pass outside the queue; never superseded.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            slot: Arc::new(KeySlot::default()),
            seq: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn superseded() -> Self {
        let slot = KeySlot::default();
        slot.latest.store(1, Ordering::SeqCst);
        Self {
            slot: Arc::new(slot),
            seq: 0,
        }
    }
}

struct Inner {
    reconciler: Arc<Reconciler>,
    settings: QueueSettings,
    permits: Arc<Semaphore>,
    slots: Mutex<HashMap<ObjectKey, Arc<KeySlot>>>,
    next_seq: AtomicU64,
}

/// Dispatches pod events to reconciliation passes.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkQueue {
    pub fn new(reconciler: Arc<Reconciler>, settings: QueueSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_reconciles.max(1)));
        Self {
            inner: Arc::new(Inner {
                reconciler,
                settings,
                permits,
                slots: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(1),
            }),
        }
    }

    /// Queues a pass for the event's key and returns the task running it.
    ///
    /// The task finishes when the pass succeeds, is superseded, or the event
    /// is dropped as invalid.
    pub fn enqueue(&self, event: PodEvent) -> JoinHandle<()> {
        let token = {
            let mut slots = lock(&self.inner.slots);
            let slot = slots.entry(event.key().clone()).or_default().clone();
            let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
            slot.latest.store(seq, Ordering::SeqCst);
            PassToken { slot, seq }
        };

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.process(&event, &token).await;
            let key = event.key().clone();
            drop(token);
            inner.release(&key);
        })
    }

    /// Number of keys with queued or running passes
    #[cfg(test)]
    pub(crate) fn tracked_keys(&self) -> usize {
        lock(&self.inner.slots).len()
    }
}

impl Inner {
    async fn process(&self, event: &PodEvent, token: &PassToken) {
        let key = event.key();
        let mut backoff = ExponentialBackoff::new(self.settings.retry_initial_delay, self.settings.retry_max_delay);
        let mut transient_failures: u32 = 0;
        let mut last_permanent: Option<String> = None;

        loop {
            let Some(result) = self.run_once(event, token).await else {
                debug!("Dropping {} event for Pod {}: superseded", event.kind(), key);
                return;
            };

            let err = match result {
                Ok(PassOutcome::Applied(steps)) => {
                    info!("Reconciled Pod {} ({} event): {:?}", key, event.kind(), steps);
                    return;
                }
                Ok(PassOutcome::InSync) => return,
                Ok(PassOutcome::Abandoned) => {
                    debug!("Pass for Pod {} abandoned for a newer event", key);
                    return;
                }
                Err(err) => err,
            };

            let delay = match err.class() {
                ErrorClass::Validation => {
                    warn!("Dropping {} event for Pod {}: {}", event.kind(), key, err);
                    return;
                }
                ErrorClass::Transient if transient_failures < self.settings.max_retries => {
                    transient_failures += 1;
                    let delay = backoff.next_backoff();
                    warn!(
                        "Reconciliation of Pod {} failed (attempt {}), retrying in {:?}: {}",
                        key, transient_failures, delay, err
                    );
                    delay
                }
                ErrorClass::Transient => {
                    let err = exhausted(err, transient_failures);
                    self.report_permanent(key, &err, &mut last_permanent);
                    transient_failures = 0;
                    backoff.reset();
                    self.settings.permanent_retry_delay
                }
                ErrorClass::Permanent => {
                    self.report_permanent(key, &err, &mut last_permanent);
                    self.settings.permanent_retry_delay
                }
            };

            tokio::time::sleep(delay).await;
        }
    }

    /// Logs a permanent failure at error level the first time it is seen for
    /// this event; identical repeats on later retries go out at warn.
    fn report_permanent(&self, key: &ObjectKey, err: &ControllerError, last: &mut Option<String>) {
        let message = err.to_string();
        if last.as_deref() == Some(message.as_str()) {
            warn!(
                "Pod {} still failing, retrying in {:?}: {}",
                key, self.settings.permanent_retry_delay, message
            );
            return;
        }
        error!(
            "Reconciliation of Pod {} failed permanently, retrying in {:?}: {}",
            key, self.settings.permanent_retry_delay, message
        );
        *last = Some(message);
    }

    /// One pass under the key lock and a worker permit; `None` if superseded.
    async fn run_once(&self, event: &PodEvent, token: &PassToken) -> Option<Result<PassOutcome, ControllerError>> {
        if token.is_superseded() {
            return None;
        }
        let _key_guard = token.slot.lock.lock().await;
        if token.is_superseded() {
            return None;
        }
        let Ok(_permit) = self.permits.clone().acquire_owned().await else {
            warn!("Worker pool closed, dropping event for Pod {}", event.key());
            return None;
        };
        Some(self.reconciler.reconcile(event, token).await)
    }

    /// Forgets the key once no pass holds its slot.
    fn release(&self, key: &ObjectKey) {
        let mut slots = lock(&self.slots);
        if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(key);
        }
    }
}

/// Wraps the last transient failure once the retry budget is spent.
fn exhausted(err: ControllerError, retries: u32) -> ControllerError {
    match err {
        ControllerError::Cluster(source) => ControllerError::RetriesExhausted { retries, source },
        other => other,
    }
}
