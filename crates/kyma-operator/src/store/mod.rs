//! Object stores the reconciler reads from and writes to
//!
//! The reconciler only sees these traits. Production wires the kube-rs backed
//! implementations from [`kubernetes`]; tests substitute mocks or an in-memory store.
//! Every method returns a [`StoreError`] so callers branch on the closed
//! [`kyma_common::ErrorKind`] instead of a backend error type.

mod kubernetes;

use std::sync::Arc;

use async_trait::async_trait;
use kube::core::{ApiResource, DynamicObject};
use kube::Client;

#[cfg(test)]
use mockall::automock;

use kyma_common::crd::{IstioConfiguration, Kyma};
use kyma_common::{ObjectKey, StoreError};

pub use kubernetes::{KubeDynamicStore, KubeTypedStore};

// =============================================================================
// Traits for dependency injection and testability
// =============================================================================

/// CRUD for strongly-schemed objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TypedStore: Send + Sync {
    /// Read the primary resource
    async fn get_kyma(&self, key: &ObjectKey) -> Result<Kyma, StoreError>;

    /// Read an IstioConfiguration
    async fn get_istio_configuration(
        &self,
        key: &ObjectKey,
    ) -> Result<IstioConfiguration, StoreError>;

    /// Create an IstioConfiguration
    async fn create_istio_configuration(
        &self,
        obj: &IstioConfiguration,
    ) -> Result<(), StoreError>;

    /// Replace an IstioConfiguration; `metadata.resourceVersion` guards the write
    async fn replace_istio_configuration(
        &self,
        obj: &IstioConfiguration,
    ) -> Result<(), StoreError>;

    /// Delete an IstioConfiguration
    async fn delete_istio_configuration(&self, key: &ObjectKey) -> Result<(), StoreError>;
}

/// CRUD for schema-less objects addressed by group/version/resource
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DynamicStore: Send + Sync {
    /// Read an object
    async fn get(&self, ar: &ApiResource, key: &ObjectKey) -> Result<DynamicObject, StoreError>;

    /// Create an object; its namespace and name come from `obj.metadata`
    async fn create(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<(), StoreError>;

    /// Replace an object; `metadata.resourceVersion` guards the write
    async fn replace(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<(), StoreError>;

    /// Delete an object
    async fn delete(&self, ar: &ApiResource, key: &ObjectKey) -> Result<(), StoreError>;
}

/// The pair of stores handed to the reconciler and to each dependent
#[derive(Clone)]
pub struct Stores {
    /// Store for strongly-schemed kinds
    pub typed: Arc<dyn TypedStore>,
    /// Store for schema-less kinds
    pub dynamic: Arc<dyn DynamicStore>,
}

impl Stores {
    /// Bundle explicit store implementations
    pub fn new(typed: Arc<dyn TypedStore>, dynamic: Arc<dyn DynamicStore>) -> Self {
        Self { typed, dynamic }
    }

    /// Stores backed by the Kubernetes API
    pub fn from_client(client: Client) -> Self {
        Self {
            typed: Arc::new(KubeTypedStore::new(client.clone())),
            dynamic: Arc::new(KubeDynamicStore::new(client)),
        }
    }
}
