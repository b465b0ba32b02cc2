//! Work queue feeding identities to the reconciler
//!
//! Identities arrive from the watch as a stream. The queue coalesces repeats,
//! runs at most one pass per identity at a time and bounds the number of
//! concurrent passes. Failed passes are redelivered through a [`DelayQueue`]
//! according to [`error_policy`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, Stream, StreamExt};
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, error, info};

use kyma_common::backoff::BackoffConfig;
use kyma_common::{Error, ObjectKey};

use crate::controller::{error_policy, Reconcile, ReconcileAction};

/// Default number of identities reconciled concurrently
pub const DEFAULT_WORKERS: usize = 4;

/// Default deadline for a single reconciliation pass
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(60);

/// Dispatcher tuning
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Maximum concurrent passes across identities
    pub workers: usize,
    /// Deadline for one pass; exceeding it cancels the pass
    pub reconcile_timeout: Duration,
    /// Redelivery schedule for retryable failures
    pub backoff: BackoffConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Bookkeeping for queued, running and scheduled identities
struct WorkQueue {
    ready: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    running: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    attempts: HashMap<ObjectKey, u32>,
    scheduled: HashMap<ObjectKey, delay_queue::Key>,
    retries: DelayQueue<ObjectKey>,
}

impl WorkQueue {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            queued: HashSet::new(),
            running: HashSet::new(),
            dirty: HashSet::new(),
            attempts: HashMap::new(),
            scheduled: HashMap::new(),
            retries: DelayQueue::new(),
        }
    }

    /// Queue `key` now; a pending delayed redelivery is superseded
    fn enqueue(&mut self, key: ObjectKey) {
        if self.running.contains(&key) {
            self.dirty.insert(key);
            return;
        }
        if let Some(delay_key) = self.scheduled.remove(&key) {
            self.retries.remove(&delay_key);
        }
        if self.queued.insert(key.clone()) {
            self.ready.push_back(key);
        }
    }

    /// Queue `key` after `delay` unless it is already queued
    fn schedule(&mut self, key: ObjectKey, delay: Duration) {
        if self.queued.contains(&key) {
            return;
        }
        match self.scheduled.get(&key) {
            Some(delay_key) => self.retries.reset(delay_key, delay),
            None => {
                let delay_key = self.retries.insert(key.clone(), delay);
                self.scheduled.insert(key, delay_key);
            }
        }
    }

    /// A delayed redelivery came due
    fn retry_due(&mut self, key: ObjectKey) {
        self.scheduled.remove(&key);
        self.enqueue(key);
    }

    /// Take the next queued identity and mark it running
    fn start_next(&mut self) -> Option<ObjectKey> {
        let key = self.ready.pop_front()?;
        self.queued.remove(&key);
        self.running.insert(key.clone());
        Some(key)
    }

    /// Record that the pass for `key` ended; `reschedule` is its redelivery delay
    fn finish(&mut self, key: ObjectKey, reschedule: Option<Duration>) {
        self.running.remove(&key);
        if self.dirty.remove(&key) {
            self.enqueue(key);
        } else if let Some(delay) = reschedule {
            self.schedule(key, delay);
        }
    }

    /// Consecutive failure count for `key` after one more failure
    fn record_failure(&mut self, key: &ObjectKey) -> u32 {
        let attempt = self.attempts.entry(key.clone()).or_default();
        *attempt += 1;
        *attempt
    }

    fn record_success(&mut self, key: &ObjectKey) {
        self.attempts.remove(key);
    }

    fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.running.is_empty() && self.retries.is_empty()
    }
}

/// Drives a [`Reconcile`] implementation from a stream of identities
pub struct Dispatcher<R> {
    reconciler: Arc<R>,
    config: DispatchConfig,
}

impl<R: Reconcile> Dispatcher<R> {
    /// Dispatcher with the given reconciler and tuning
    pub fn new(reconciler: Arc<R>, config: DispatchConfig) -> Self {
        Self { reconciler, config }
    }

    /// Run until `shutdown` fires, or until `triggers` ends and all work is done
    ///
    /// On shutdown every in-flight pass is cancelled and awaited before returning.
    pub async fn run<S>(self, triggers: S, shutdown: CancellationToken)
    where
        S: Stream<Item = ObjectKey> + Send,
    {
        let mut triggers = pin!(triggers.fuse());
        let mut triggers_done = false;
        let mut queue = WorkQueue::new();
        let mut in_flight: JoinSet<Result<ReconcileAction, Error>> = JoinSet::new();
        let mut in_flight_keys: HashMap<task::Id, ObjectKey> = HashMap::new();
        let workers = self.config.workers.max(1);

        info!(
            workers,
            timeout_secs = self.config.reconcile_timeout.as_secs(),
            "dispatcher started"
        );

        loop {
            while in_flight.len() < workers {
                let Some(key) = queue.start_next() else {
                    break;
                };
                let reconciler = Arc::clone(&self.reconciler);
                let cancel = shutdown.child_token();
                let timeout = self.config.reconcile_timeout;
                let pass_key = key.clone();
                let handle = in_flight.spawn(async move {
                    run_pass(reconciler.as_ref(), &pass_key, cancel, timeout).await
                });
                in_flight_keys.insert(handle.id(), key);
            }

            if triggers_done && queue.is_idle() && in_flight.is_empty() {
                info!("trigger stream ended and queue drained, dispatcher stopping");
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(in_flight = in_flight.len(), "shutdown requested, draining in-flight passes");
                    break;
                }
                next = triggers.next(), if !triggers_done => match next {
                    Some(key) => {
                        queue.enqueue(key);
                        // Take everything already buffered so bursts coalesce
                        loop {
                            match triggers.next().now_or_never() {
                                Some(Some(key)) => queue.enqueue(key),
                                Some(None) => {
                                    triggers_done = true;
                                    break;
                                }
                                None => break,
                            }
                        }
                    }
                    None => {
                        debug!("trigger stream ended");
                        triggers_done = true;
                    }
                },
                Some(expired) = queue.retries.next(), if !queue.retries.is_empty() => {
                    queue.retry_due(expired.into_inner());
                }
                Some(joined) = in_flight.join_next_with_id(), if !in_flight.is_empty() => {
                    if let Some((key, result)) = settle(&mut in_flight_keys, joined) {
                        self.complete(&mut queue, key, result);
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next_with_id().await {
            if let Some((key, result)) = settle(&mut in_flight_keys, joined) {
                debug!(kyma = %key, ?result, "in-flight pass finished during shutdown");
            }
        }
        info!("dispatcher stopped");
    }

    fn complete(&self, queue: &mut WorkQueue, key: ObjectKey, result: Result<ReconcileAction, Error>) {
        let reschedule = match result {
            Ok(ReconcileAction::AwaitChange) => {
                debug!(kyma = %key, "reconciliation completed");
                queue.record_success(&key);
                None
            }
            Ok(ReconcileAction::RequeueAfter(delay)) => {
                debug!(kyma = %key, requeue_ms = delay.as_millis() as u64, "reconciliation requested requeue");
                queue.record_success(&key);
                Some(delay)
            }
            Err(e) => {
                let attempt = queue.record_failure(&key);
                error_policy(&key, &e, attempt, &self.config.backoff)
            }
        };
        queue.finish(key, reschedule);
    }
}

/// Pair a finished task with the identity it ran for
///
/// A task that failed to join still releases its identity, with an internal
/// error as its result.
fn settle(
    keys: &mut HashMap<task::Id, ObjectKey>,
    joined: Result<(task::Id, Result<ReconcileAction, Error>), JoinError>,
) -> Option<(ObjectKey, Result<ReconcileAction, Error>)> {
    match joined {
        Ok((id, result)) => keys.remove(&id).map(|key| (key, result)),
        Err(e) => {
            let key = keys.remove(&e.id())?;
            error!(kyma = %key, error = %e, "reconcile task failed to join");
            let result = Err(Error::internal_with_context(
                key.to_string(),
                format!("reconcile task failed to join: {e}"),
            ));
            Some((key, result))
        }
    }
}

/// One pass under a deadline; panics and timeouts come back as errors
async fn run_pass<R: Reconcile>(
    reconciler: &R,
    key: &ObjectKey,
    cancel: CancellationToken,
    timeout: Duration,
) -> Result<ReconcileAction, Error> {
    let pass = AssertUnwindSafe(reconciler.reconcile(key, &cancel)).catch_unwind();
    match tokio::time::timeout(timeout, pass).await {
        Ok(Ok(result)) => result,
        Ok(Err(_panic)) => Err(Error::internal_with_context(
            key.to_string(),
            "reconciler panicked",
        )),
        Err(_elapsed) => {
            cancel.cancel();
            Err(Error::cancelled(format!(
                "reconcile of {key} exceeded {}s deadline",
                timeout.as_secs()
            )))
        }
    }
}
