//! Kubernetes API implementations of the store traits

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, PostParams};
use kube::core::{ApiResource, DynamicObject};
use kube::{Client, Resource};
use tracing::debug;

use kyma_common::crd::{IstioConfiguration, Kyma};
use kyma_common::{ObjectKey, StoreError, OPERATOR_NAME};

use super::{DynamicStore, TypedStore};

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..Default::default()
    }
}

fn key_of<K: Resource>(kind: &str, obj: &K) -> Result<ObjectKey, StoreError> {
    ObjectKey::from_resource(obj).ok_or_else(|| {
        let meta = obj.meta();
        let partial = ObjectKey::new(
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        );
        StoreError::fatal(kind, &partial, "object is missing metadata.name or metadata.namespace")
    })
}

/// Typed store backed by the Kubernetes API
pub struct KubeTypedStore {
    client: Client,
}

impl KubeTypedStore {
    /// Create a new KubeTypedStore wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn kymas(&self, namespace: &str) -> Api<Kyma> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn istio_configurations(&self, namespace: &str) -> Api<IstioConfiguration> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl TypedStore for KubeTypedStore {
    async fn get_kyma(&self, key: &ObjectKey) -> Result<Kyma, StoreError> {
        self.kymas(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| StoreError::from_kube("Kyma", key, e))
    }

    async fn get_istio_configuration(
        &self,
        key: &ObjectKey,
    ) -> Result<IstioConfiguration, StoreError> {
        self.istio_configurations(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| StoreError::from_kube("IstioConfiguration", key, e))
    }

    async fn create_istio_configuration(
        &self,
        obj: &IstioConfiguration,
    ) -> Result<(), StoreError> {
        let key = key_of("IstioConfiguration", obj)?;
        self.istio_configurations(&key.namespace)
            .create(&post_params(), obj)
            .await
            .map_err(|e| StoreError::from_kube("IstioConfiguration", &key, e))?;
        debug!(%key, "created IstioConfiguration");
        Ok(())
    }

    async fn replace_istio_configuration(
        &self,
        obj: &IstioConfiguration,
    ) -> Result<(), StoreError> {
        let key = key_of("IstioConfiguration", obj)?;
        self.istio_configurations(&key.namespace)
            .replace(&key.name, &post_params(), obj)
            .await
            .map_err(|e| StoreError::from_kube("IstioConfiguration", &key, e))?;
        debug!(%key, "replaced IstioConfiguration");
        Ok(())
    }

    async fn delete_istio_configuration(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.istio_configurations(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
            .map_err(|e| StoreError::from_kube("IstioConfiguration", key, e))?;
        debug!(%key, "deleted IstioConfiguration");
        Ok(())
    }
}

/// Dynamic store backed by the Kubernetes API
pub struct KubeDynamicStore {
    client: Client,
}

impl KubeDynamicStore {
    /// Create a new KubeDynamicStore wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, ar: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, ar)
    }
}

#[async_trait]
impl DynamicStore for KubeDynamicStore {
    async fn get(&self, ar: &ApiResource, key: &ObjectKey) -> Result<DynamicObject, StoreError> {
        self.api(ar, &key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| StoreError::from_kube(&ar.kind, key, e))
    }

    async fn create(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<(), StoreError> {
        let key = key_of(&ar.kind, obj)?;
        self.api(ar, &key.namespace)
            .create(&post_params(), obj)
            .await
            .map_err(|e| StoreError::from_kube(&ar.kind, &key, e))?;
        debug!(%key, kind = %ar.kind, "created dynamic object");
        Ok(())
    }

    async fn replace(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<(), StoreError> {
        let key = key_of(&ar.kind, obj)?;
        self.api(ar, &key.namespace)
            .replace(&key.name, &post_params(), obj)
            .await
            .map_err(|e| StoreError::from_kube(&ar.kind, &key, e))?;
        debug!(%key, kind = %ar.kind, "replaced dynamic object");
        Ok(())
    }

    async fn delete(&self, ar: &ApiResource, key: &ObjectKey) -> Result<(), StoreError> {
        self.api(ar, &key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
            .map_err(|e| StoreError::from_kube(&ar.kind, key, e))?;
        debug!(%key, kind = %ar.kind, "deleted dynamic object");
        Ok(())
    }
}
