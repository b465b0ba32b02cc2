//! Watch binding: Kyma lifecycle events as a stream of identities

use std::time::Duration;

use futures::{future, Stream, StreamExt};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::Api;
use tracing::{debug, warn};

use kyma_common::crd::Kyma;
use kyma_common::ObjectKey;

/// Server-side watch timeout; kept below the client read timeout
pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(25);

/// Longest watch timeout the API server accepts; kube rejects 295s and above
pub const MAX_WATCH_TIMEOUT: Duration = Duration::from_secs(294);

/// Identity to reconcile for a watch event, if any
///
/// Creates, updates, deletes and initial-list objects all map to the object's
/// identity. List boundary markers carry no object.
pub fn trigger_for(event: &Event<Kyma>) -> Option<ObjectKey> {
    match event {
        Event::Apply(kyma) | Event::InitApply(kyma) | Event::Delete(kyma) => {
            ObjectKey::from_resource(kyma)
        }
        Event::Init | Event::InitDone => None,
    }
}

/// Every Kyma event visible through `api`, reduced to identities
///
/// Watch errors are logged and skipped; the watcher re-establishes itself with
/// its default backoff.
pub fn kyma_triggers(
    api: Api<Kyma>,
    watch_timeout: Duration,
) -> impl Stream<Item = ObjectKey> + Send {
    let timeout = u32::try_from(watch_timeout.as_secs()).unwrap_or(u32::MAX);
    let config = watcher::Config::default().timeout(timeout);

    watcher::watcher(api, config)
        .default_backoff()
        .filter_map(|event| {
            let key = match event {
                Ok(event) => {
                    let key = trigger_for(&event);
                    if let Some(key) = &key {
                        debug!(kyma = %key, "Kyma event");
                    }
                    key
                }
                Err(e) => {
                    warn!(error = %e, "Kyma watch error, retrying");
                    None
                }
            };
            future::ready(key)
        })
}
