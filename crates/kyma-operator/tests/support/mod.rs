//! In-memory cluster implementing both store traits
//!
//! Tracks objects by kind and identity, stamps resource versions, rejects stale
//! replaces, records every call, and can be told to fail the next matching call.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::api::ObjectMeta;
use kube::core::{ApiResource, DynamicObject};

use kyma_common::crd::{IstioConfiguration, Kyma, KymaSpec};
use kyma_common::{ErrorKind, ObjectKey, StoreError};
use kyma_operator::store::{DynamicStore, Stores, TypedStore};

/// Store operation, as recorded in the call log
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Get,
    Create,
    Replace,
    Delete,
}

/// One store call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub kind: String,
    pub key: ObjectKey,
}

struct Injected {
    op: Op,
    kind: String,
    error: ErrorKind,
}

#[derive(Default)]
struct State {
    kymas: BTreeMap<ObjectKey, Kyma>,
    istio: BTreeMap<ObjectKey, IstioConfiguration>,
    dynamic: BTreeMap<(String, ObjectKey), DynamicObject>,
    calls: Vec<Call>,
    failures: VecDeque<Injected>,
    resource_version: u64,
}

impl State {
    fn record(&mut self, op: Op, kind: &str, key: &ObjectKey) -> Result<(), StoreError> {
        self.calls.push(Call {
            op,
            kind: kind.to_string(),
            key: key.clone(),
        });

        let pos = self
            .failures
            .iter()
            .position(|f| f.op == op && f.kind == kind);
        match pos.and_then(|i| self.failures.remove(i)) {
            None => Ok(()),
            Some(f) => Err(match f.error {
                ErrorKind::NotFound => StoreError::not_found(kind, key),
                ErrorKind::AlreadyExists => StoreError::already_exists(kind, key),
                ErrorKind::Transient => StoreError::transient(kind, key, "injected failure"),
                ErrorKind::Fatal => StoreError::fatal(kind, key, "injected failure"),
            }),
        }
    }

    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

fn key_of(kind: &str, meta: &ObjectMeta) -> Result<ObjectKey, StoreError> {
    match (&meta.namespace, &meta.name) {
        (Some(ns), Some(name)) => Ok(ObjectKey::new(ns, name)),
        _ => Err(StoreError::fatal(
            kind,
            &ObjectKey::new("", ""),
            "object is missing name or namespace",
        )),
    }
}

fn check_version(
    kind: &str,
    key: &ObjectKey,
    live: &ObjectMeta,
    incoming: &ObjectMeta,
) -> Result<(), StoreError> {
    if live.resource_version != incoming.resource_version {
        return Err(StoreError::transient(
            kind,
            key,
            "the object has been modified; please apply your changes to the latest version",
        ));
    }
    Ok(())
}

/// A fake API server
#[derive(Default)]
pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl InMemoryCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores::new(self.clone(), self.clone())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn put_kyma(&self, namespace: &str, name: &str, seed: &str) -> ObjectKey {
        let key = ObjectKey::new(namespace, name);
        let mut state = self.state();
        let version = state.next_version();
        state.kymas.insert(
            key.clone(),
            Kyma {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(namespace.to_string()),
                    resource_version: Some(version),
                    ..Default::default()
                },
                spec: KymaSpec {
                    foo: seed.to_string(),
                },
            },
        );
        key
    }

    pub fn delete_kyma(&self, key: &ObjectKey) {
        self.state().kymas.remove(key);
    }

    pub fn istio(&self, key: &ObjectKey) -> Option<IstioConfiguration> {
        self.state().istio.get(key).cloned()
    }

    pub fn dynamic_object(&self, plural: &str, key: &ObjectKey) -> Option<DynamicObject> {
        self.state()
            .dynamic
            .get(&(plural.to_string(), key.clone()))
            .cloned()
    }

    /// Change a dynamic object's spec out-of-band, bumping its resource version
    pub fn edit_dynamic_spec(
        &self,
        plural: &str,
        key: &ObjectKey,
        edit: impl FnOnce(&mut serde_json::Value),
    ) {
        let mut state = self.state();
        let version = state.next_version();
        if let Some(obj) = state.dynamic.get_mut(&(plural.to_string(), key.clone())) {
            edit(&mut obj.data["spec"]);
            obj.metadata.resource_version = Some(version);
        }
    }

    pub fn object_count(&self) -> usize {
        let state = self.state();
        state.istio.len() + state.dynamic.len()
    }

    /// Fail the next `op` on `kind` with `error`
    pub fn fail_next(&self, op: Op, kind: &str, error: ErrorKind) {
        self.state().failures.push_back(Injected {
            op,
            kind: kind.to_string(),
            error,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Calls that change state
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.op != Op::Get)
            .collect()
    }

    pub fn count(&self, op: Op, kind: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.op == op && c.kind == kind)
            .count()
    }
}

#[async_trait]
impl TypedStore for InMemoryCluster {
    async fn get_kyma(&self, key: &ObjectKey) -> Result<Kyma, StoreError> {
        let mut state = self.state();
        state.record(Op::Get, "Kyma", key)?;
        state
            .kymas
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Kyma", key))
    }

    async fn get_istio_configuration(
        &self,
        key: &ObjectKey,
    ) -> Result<IstioConfiguration, StoreError> {
        let mut state = self.state();
        state.record(Op::Get, "IstioConfiguration", key)?;
        state
            .istio
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found("IstioConfiguration", key))
    }

    async fn create_istio_configuration(
        &self,
        obj: &IstioConfiguration,
    ) -> Result<(), StoreError> {
        let key = key_of("IstioConfiguration", &obj.metadata)?;
        let mut state = self.state();
        state.record(Op::Create, "IstioConfiguration", &key)?;
        if state.istio.contains_key(&key) {
            return Err(StoreError::already_exists("IstioConfiguration", &key));
        }
        let mut obj = obj.clone();
        obj.metadata.resource_version = Some(state.next_version());
        state.istio.insert(key, obj);
        Ok(())
    }

    async fn replace_istio_configuration(
        &self,
        obj: &IstioConfiguration,
    ) -> Result<(), StoreError> {
        let key = key_of("IstioConfiguration", &obj.metadata)?;
        let mut state = self.state();
        state.record(Op::Replace, "IstioConfiguration", &key)?;
        let live = state
            .istio
            .get(&key)
            .ok_or_else(|| StoreError::not_found("IstioConfiguration", &key))?;
        check_version("IstioConfiguration", &key, &live.metadata, &obj.metadata)?;
        let mut obj = obj.clone();
        obj.metadata.resource_version = Some(state.next_version());
        state.istio.insert(key, obj);
        Ok(())
    }

    async fn delete_istio_configuration(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut state = self.state();
        state.record(Op::Delete, "IstioConfiguration", key)?;
        state
            .istio
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("IstioConfiguration", key))
    }
}

#[async_trait]
impl DynamicStore for InMemoryCluster {
    async fn get(&self, ar: &ApiResource, key: &ObjectKey) -> Result<DynamicObject, StoreError> {
        let mut state = self.state();
        state.record(Op::Get, &ar.kind, key)?;
        state
            .dynamic
            .get(&(ar.plural.clone(), key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(&ar.kind, key))
    }

    async fn create(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<(), StoreError> {
        let key = key_of(&ar.kind, &obj.metadata)?;
        let mut state = self.state();
        state.record(Op::Create, &ar.kind, &key)?;
        let slot = (ar.plural.clone(), key.clone());
        if state.dynamic.contains_key(&slot) {
            return Err(StoreError::already_exists(&ar.kind, &key));
        }
        let mut obj = obj.clone();
        obj.metadata.resource_version = Some(state.next_version());
        state.dynamic.insert(slot, obj);
        Ok(())
    }

    async fn replace(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<(), StoreError> {
        let key = key_of(&ar.kind, &obj.metadata)?;
        let mut state = self.state();
        state.record(Op::Replace, &ar.kind, &key)?;
        let slot = (ar.plural.clone(), key.clone());
        let live = state
            .dynamic
            .get(&slot)
            .ok_or_else(|| StoreError::not_found(&ar.kind, &key))?;
        check_version(&ar.kind, &key, &live.metadata, &obj.metadata)?;
        let mut obj = obj.clone();
        obj.metadata.resource_version = Some(state.next_version());
        state.dynamic.insert(slot, obj);
        Ok(())
    }

    async fn delete(&self, ar: &ApiResource, key: &ObjectKey) -> Result<(), StoreError> {
        let mut state = self.state();
        state.record(Op::Delete, &ar.kind, key)?;
        state
            .dynamic
            .remove(&(ar.plural.clone(), key.clone()))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(&ar.kind, key))
    }
}
