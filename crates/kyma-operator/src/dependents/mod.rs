//! Dependent resource kinds derived from a Kyma
//!
//! Each kind implements [`Dependent`]: it knows the identity it derives from the
//! primary, how to project its desired state, and how to upsert and remove it.
//! The reconciler walks a [`DependentTable`] in order, so adding or disabling a
//! kind is a table change, not a control-flow change.

mod istio;
mod serverless;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use kyma_common::crd::Kyma;
use kyma_common::{Error, ObjectKey, MANAGED_BY_LABEL, OPERATOR_NAME};

use crate::store::Stores;

pub use istio::{project_istio, IstioDependent};
pub use serverless::{project_serverless, ServerlessDependent, ServerlessSettings};

/// Identity of the primary a projection starts from
pub(crate) fn primary_key(kyma: &Kyma) -> Result<ObjectKey, Error> {
    ObjectKey::from_resource(kyma).ok_or_else(|| {
        Error::validation("Kyma is missing metadata.name or metadata.namespace")
    })
}

/// Labels stamped on every dependent this operator writes
pub(crate) fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string())])
}

/// What an upsert did to a dependent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Convergence {
    /// The dependent did not exist and was created
    Created,
    /// The dependent existed with drifted fields and was replaced
    Updated,
    /// The dependent already matched its projection
    Unchanged,
}

impl fmt::Display for Convergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// What a removal did to a dependent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Removal {
    /// The dependent existed and was deleted
    Deleted,
    /// The dependent was already gone
    AlreadyAbsent,
}

/// A resource kind whose existence follows the existence of a Kyma
#[async_trait]
pub trait Dependent: Send + Sync {
    /// Kind name used in logs and errors
    fn kind(&self) -> &'static str;

    /// Identity of this dependent for the primary at `primary`
    fn key_for(&self, primary: &ObjectKey) -> ObjectKey;

    /// Make the dependent exist with the fields projected from `kyma`
    async fn ensure(&self, kyma: &Kyma, stores: &Stores) -> Result<Convergence, Error>;

    /// Delete the dependent of the primary at `primary`; absence is success
    async fn remove(&self, primary: &ObjectKey, stores: &Stores) -> Result<Removal, Error>;
}

/// One row of the dependent table
#[derive(Clone)]
pub struct DependentEntry {
    /// The dependent kind
    pub dependent: Arc<dyn Dependent>,
    /// Whether the converge path creates this kind
    pub enabled: bool,
}

impl DependentEntry {
    /// An entry created on converge
    pub fn enabled(dependent: Arc<dyn Dependent>) -> Self {
        Self {
            dependent,
            enabled: true,
        }
    }

    /// An entry only cleaned up on deletion
    pub fn disabled(dependent: Arc<dyn Dependent>) -> Self {
        Self {
            dependent,
            enabled: false,
        }
    }
}

impl fmt::Debug for DependentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependentEntry")
            .field("kind", &self.dependent.kind())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Ordered list of dependent kinds
#[derive(Clone, Debug, Default)]
pub struct DependentTable {
    entries: Vec<DependentEntry>,
}

impl DependentTable {
    /// Table with the given entries, visited in order
    pub fn new(entries: Vec<DependentEntry>) -> Self {
        Self { entries }
    }

    /// The operator's dependent kinds: IstioConfiguration, then ServerlessConfiguration
    pub fn from_config(config: &DependentsConfig) -> Self {
        let istio: Arc<dyn Dependent> = Arc::new(IstioDependent);
        let serverless: Arc<dyn Dependent> =
            Arc::new(ServerlessDependent::new(config.serverless.clone()));

        let entry = |dependent: Arc<dyn Dependent>, enabled: bool| {
            if enabled {
                DependentEntry::enabled(dependent)
            } else {
                DependentEntry::disabled(dependent)
            }
        };

        Self::new(vec![
            entry(istio, config.istio_enabled),
            entry(serverless, config.serverless_enabled),
        ])
    }

    /// Entries created on converge, in table order
    pub fn enabled(&self) -> impl Iterator<Item = &dyn Dependent> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.dependent.as_ref())
    }

    /// Every entry, in table order; deletion visits all of them
    pub fn all(&self) -> impl Iterator<Item = &dyn Dependent> {
        self.entries.iter().map(|e| e.dependent.as_ref())
    }
}

/// Which dependents are enabled and how they are parameterized
#[derive(Clone, Debug)]
pub struct DependentsConfig {
    /// Create IstioConfiguration on converge
    pub istio_enabled: bool,
    /// Create ServerlessConfiguration on converge
    pub serverless_enabled: bool,
    /// Repository settings projected into ServerlessConfiguration
    pub serverless: ServerlessSettings,
}
