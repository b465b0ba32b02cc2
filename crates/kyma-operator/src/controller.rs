//! Kyma reconciler
//!
//! Level-triggered: every pass reads the Kyma by identity and either converges
//! the dependent table towards it or, when the Kyma is gone, removes every
//! dependent it could have produced. The reconciler keeps no state between
//! passes and never retries; the dispatcher owns redelivery via [`error_policy`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use kyma_common::backoff::BackoffConfig;
use kyma_common::crd::Kyma;
use kyma_common::{Error, ObjectKey};

use crate::dependents::{Convergence, DependentTable, Removal};
use crate::store::Stores;

/// What the dispatcher should do with an identity after a successful pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Converged; wait for the next change event
    AwaitChange,
    /// Run again after the given delay
    RequeueAfter(Duration),
}

/// Anything the dispatcher can hand an identity to
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    /// Run one pass for `key`; must return promptly once `cancel` fires
    async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileAction, Error>;
}

/// Reconciler for Kyma resources
pub struct Reconciler {
    stores: Stores,
    dependents: DependentTable,
}

impl Reconciler {
    /// Reconciler over the given stores and dependent table
    pub fn new(stores: Stores, dependents: DependentTable) -> Self {
        Self { stores, dependents }
    }

    /// Delete every dependent of `key`, enabled or not, in table order
    async fn remove_dependents(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileAction, Error> {
        info!("Kyma not found, removing dependents");

        for dependent in self.dependents.all() {
            let kind = dependent.kind();
            let removal = guarded(
                cancel,
                format!("remove {kind}"),
                dependent.remove(key, &self.stores),
            )
            .await??;

            match removal {
                Removal::Deleted => info!(dependent = kind, "deleted dependent"),
                Removal::AlreadyAbsent => debug!(dependent = kind, "dependent already absent"),
            }
        }
        Ok(ReconcileAction::AwaitChange)
    }

    /// Upsert every enabled dependent of `kyma` in table order
    async fn converge(
        &self,
        key: &ObjectKey,
        kyma: &Kyma,
        cancel: &CancellationToken,
    ) -> Result<ReconcileAction, Error> {
        if let Err(e) = kyma.spec.validate(key) {
            warn!(error = %e, "Kyma validation failed");
            return Err(e);
        }

        for dependent in self.dependents.enabled() {
            let kind = dependent.kind();
            let outcome = guarded(
                cancel,
                format!("ensure {kind}"),
                dependent.ensure(kyma, &self.stores),
            )
            .await??;

            match outcome {
                Convergence::Unchanged => debug!(dependent = kind, "dependent up to date"),
                changed => info!(dependent = kind, outcome = %changed, "converged dependent"),
            }
        }
        Ok(ReconcileAction::AwaitChange)
    }
}

#[async_trait]
impl Reconcile for Reconciler {
    #[instrument(skip(self, cancel), fields(kyma = %key))]
    async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileAction, Error> {
        debug!("reconciling Kyma");

        let fetched = guarded(cancel, "get Kyma", self.stores.typed.get_kyma(key)).await?;
        match fetched {
            Ok(kyma) => self.converge(key, &kyma, cancel).await,
            Err(e) if e.is_not_found() => self.remove_dependents(key, cancel).await,
            Err(e) => Err(Error::store("get Kyma", e)),
        }
    }
}

/// Race `fut` against cancellation; an already-cancelled token wins
async fn guarded<F: Future>(
    cancel: &CancellationToken,
    context: impl Into<String>,
    fut: F,
) -> Result<F::Output, Error> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(context)),
        out = fut => Ok(out),
    }
}

/// Decide redelivery for a failed pass
///
/// Returns the delay before the identity is handed back to a worker, or `None`
/// when the error needs a change to the Kyma (or the cluster) to resolve.
pub fn error_policy(
    key: &ObjectKey,
    error: &Error,
    attempt: u32,
    backoff: &BackoffConfig,
) -> Option<Duration> {
    if error.is_retryable() {
        let delay = backoff.delay_for(attempt);
        warn!(
            kyma = %key,
            %error,
            attempt,
            retry_in_ms = delay.as_millis() as u64,
            "reconciliation failed, will retry"
        );
        Some(delay)
    } else {
        error!(kyma = %key, %error, "reconciliation failed permanently");
        None
    }
}
