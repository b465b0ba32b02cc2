//! ServerlessConfiguration dependent (dynamic store)
//!
//! The kind belongs to another component, so it is written as a [`DynamicObject`]
//! and drift is judged on `data.spec` only. Fields the API server defaults into
//! the spec are ignored: the live spec matches when it contains every projected field.

use std::fmt;

use async_trait::async_trait;
use kube::core::{ApiResource, DynamicObject};
use serde_json::{json, Value};
use tracing::debug;

use kyma_common::crd::{
    serverless_api_resource, GithubRepository, Kyma, ServerlessConfigurationSpec,
    SERVERLESS_KIND, SERVERLESS_NAME_SUFFIX,
};
use kyma_common::{Error, ObjectKey, MANAGED_BY_LABEL, MAX_NAME_LEN, OPERATOR_NAME};

use super::{managed_labels, primary_key, Convergence, Dependent, Removal};
use crate::store::Stores;

/// Repository coordinates projected into every ServerlessConfiguration
#[derive(Clone, PartialEq, Eq)]
pub struct ServerlessSettings {
    /// Repository URL
    pub repository_url: String,
    auth_key: String,
}

impl ServerlessSettings {
    /// Settings for the given repository and credential
    pub fn new(repository_url: impl Into<String>, auth_key: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            auth_key: auth_key.into(),
        }
    }
}

impl fmt::Debug for ServerlessSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerlessSettings")
            .field("repository_url", &self.repository_url)
            .field("auth_key", &"<redacted>")
            .finish()
    }
}

/// Project the desired ServerlessConfiguration for `kyma`
///
/// Named `<kyma>-serverless` in the Kyma's namespace. A derived name longer than
/// the API server accepts is a validation error, not a store error.
pub fn project_serverless(
    kyma: &Kyma,
    settings: &ServerlessSettings,
) -> Result<DynamicObject, Error> {
    let primary = primary_key(kyma)?;
    let key = primary.with_suffix(SERVERLESS_NAME_SUFFIX);
    if key.name.len() > MAX_NAME_LEN {
        return Err(Error::validation_for_field(
            &primary,
            "metadata.name",
            format!(
                "derived {SERVERLESS_KIND} name is {} characters, limit is {MAX_NAME_LEN}",
                key.name.len()
            ),
        ));
    }

    let spec = ServerlessConfigurationSpec {
        common_prefix: kyma.spec.foo.clone(),
        github_repository: GithubRepository {
            auth_key: settings.auth_key.clone(),
            url: settings.repository_url.clone(),
        },
    };
    let spec = serde_json::to_value(&spec)
        .map_err(|e| Error::serialization_for_kind(SERVERLESS_KIND, e.to_string()))?;

    let mut obj = DynamicObject::new(&key.name, &serverless_api_resource())
        .within(&key.namespace)
        .data(json!({ "spec": spec }));
    obj.metadata.labels = Some(managed_labels());
    Ok(obj)
}

/// True when every field set in `desired` has the same value in `live`
fn contains(live: &Value, desired: &Value) -> bool {
    match (live, desired) {
        (Value::Object(live), Value::Object(desired)) => desired
            .iter()
            .all(|(k, v)| live.get(k).is_some_and(|l| contains(l, v))),
        (live, desired) => live == desired,
    }
}

/// Dependent entry for ServerlessConfiguration
#[derive(Clone, Debug)]
pub struct ServerlessDependent {
    settings: ServerlessSettings,
    api_resource: ApiResource,
}

impl ServerlessDependent {
    /// Dependent projecting the given repository settings
    pub fn new(settings: ServerlessSettings) -> Self {
        Self {
            settings,
            api_resource: serverless_api_resource(),
        }
    }

    async fn replace_if_drifted(
        &self,
        stores: &Stores,
        mut existing: DynamicObject,
        desired: DynamicObject,
    ) -> Result<Convergence, Error> {
        let desired_spec = desired.data.get("spec").cloned().unwrap_or(Value::Null);
        let live_spec = existing.data.get("spec").unwrap_or(&Value::Null);
        if contains(live_spec, &desired_spec) {
            return Ok(Convergence::Unchanged);
        }

        // resourceVersion rides along on `existing`
        match existing.data.as_object_mut() {
            Some(data) => {
                data.insert("spec".to_string(), desired_spec);
            }
            None => existing.data = json!({ "spec": desired_spec }),
        }
        existing
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string());

        stores
            .dynamic
            .replace(&self.api_resource, &existing)
            .await
            .map_err(|e| Error::store("replace ServerlessConfiguration", e))?;
        Ok(Convergence::Updated)
    }
}

#[async_trait]
impl Dependent for ServerlessDependent {
    fn kind(&self) -> &'static str {
        SERVERLESS_KIND
    }

    fn key_for(&self, primary: &ObjectKey) -> ObjectKey {
        primary.with_suffix(SERVERLESS_NAME_SUFFIX)
    }

    async fn ensure(&self, kyma: &Kyma, stores: &Stores) -> Result<Convergence, Error> {
        let desired = project_serverless(kyma, &self.settings)?;
        let key = self.key_for(&primary_key(kyma)?);
        let ar = &self.api_resource;

        match stores.dynamic.get(ar, &key).await {
            Ok(existing) => self.replace_if_drifted(stores, existing, desired).await,
            Err(e) if e.is_not_found() => match stores.dynamic.create(ar, &desired).await {
                Ok(()) => Ok(Convergence::Created),
                Err(e) if e.is_already_exists() => {
                    debug!(%key, "ServerlessConfiguration appeared concurrently, re-reading");
                    let existing = stores
                        .dynamic
                        .get(ar, &key)
                        .await
                        .map_err(|e| Error::store("get ServerlessConfiguration", e))?;
                    self.replace_if_drifted(stores, existing, desired).await
                }
                Err(e) => Err(Error::store("create ServerlessConfiguration", e)),
            },
            Err(e) => Err(Error::store("get ServerlessConfiguration", e)),
        }
    }

    async fn remove(&self, primary: &ObjectKey, stores: &Stores) -> Result<Removal, Error> {
        let key = self.key_for(primary);
        match stores.dynamic.delete(&self.api_resource, &key).await {
            Ok(()) => Ok(Removal::Deleted),
            Err(e) if e.is_not_found() => Ok(Removal::AlreadyAbsent),
            Err(e) => Err(Error::store("delete ServerlessConfiguration", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kube::api::ObjectMeta;
    use kyma_common::crd::KymaSpec;
    use kyma_common::StoreError;

    use crate::store::{MockDynamicStore, MockTypedStore};

    fn settings() -> ServerlessSettings {
        ServerlessSettings::new("https://example.com/functions.git", "s3cr3t")
    }

    fn kyma_named(name: &str, seed: &str) -> Kyma {
        Kyma {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("kyma-system".to_string()),
                ..Default::default()
            },
            spec: KymaSpec {
                foo: seed.to_string(),
            },
        }
    }

    fn kyma(seed: &str) -> Kyma {
        kyma_named("default", seed)
    }

    fn stores(dynamic: MockDynamicStore) -> Stores {
        Stores::new(Arc::new(MockTypedStore::new()), Arc::new(dynamic))
    }

    fn projected(seed: &str) -> DynamicObject {
        project_serverless(&kyma(seed), &settings()).unwrap()
    }

    #[test]
    fn projection_carries_seed_and_repository() {
        let obj = projected("alpha");

        assert_eq!(obj.metadata.name.as_deref(), Some("default-serverless"));
        assert_eq!(obj.metadata.namespace.as_deref(), Some("kyma-system"));
        let types = obj.types.as_ref().unwrap();
        assert_eq!(types.api_version, "kyma.kyma-project.io/v1alpha1");
        assert_eq!(types.kind, "ServerlessConfiguration");
        assert_eq!(obj.data["spec"]["commonPrefix"], "alpha");
        assert_eq!(obj.data["spec"]["githubRepository"]["url"], "https://example.com/functions.git");
        assert_eq!(obj.data["spec"]["githubRepository"]["authKey"], "s3cr3t");
    }

    #[test]
    fn overlong_derived_name_is_a_validation_error() {
        let name = "k".repeat(MAX_NAME_LEN - SERVERLESS_NAME_SUFFIX.len() + 1);
        let err = project_serverless(&kyma_named(&name, "alpha"), &settings()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(!err.is_retryable());

        let name = "k".repeat(MAX_NAME_LEN - SERVERLESS_NAME_SUFFIX.len());
        assert!(project_serverless(&kyma_named(&name, "alpha"), &settings()).is_ok());
    }

    #[test]
    fn settings_debug_hides_auth_key() {
        let debug = format!("{:?}", settings());
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("functions.git"));
    }

    #[test]
    fn server_defaulted_fields_do_not_count_as_drift() {
        let desired = json!({ "commonPrefix": "a", "githubRepository": { "url": "u" } });
        let live = json!({
            "commonPrefix": "a",
            "githubRepository": { "url": "u", "branch": "main" },
            "replicas": 1
        });
        assert!(contains(&live, &desired));
        assert!(!contains(&desired, &json!({ "commonPrefix": "b" })));
    }

    #[tokio::test]
    async fn absent_dependent_is_created() {
        let mut dynamic = MockDynamicStore::new();
        dynamic
            .expect_get()
            .returning(|_, k| Err(StoreError::not_found(SERVERLESS_KIND, k)));
        dynamic
            .expect_create()
            .withf(|ar, obj| {
                ar.plural == "serverlessconfigurations"
                    && obj.metadata.name.as_deref() == Some("default-serverless")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let dependent = ServerlessDependent::new(settings());
        let outcome = dependent.ensure(&kyma("alpha"), &stores(dynamic)).await;
        assert_eq!(outcome.unwrap(), Convergence::Created);
    }

    #[tokio::test]
    async fn drifted_dependent_keeps_resource_version_and_foreign_fields() {
        let mut dynamic = MockDynamicStore::new();
        dynamic.expect_get().returning(|_, _| {
            let mut live = projected("old");
            live.metadata.resource_version = Some("7".to_string());
            live.data["status"] = json!({ "phase": "Ready" });
            Ok(live)
        });
        dynamic
            .expect_replace()
            .withf(|_, obj| {
                obj.metadata.resource_version.as_deref() == Some("7")
                    && obj.data["spec"]["commonPrefix"] == "new"
                    && obj.data["status"]["phase"] == "Ready"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let dependent = ServerlessDependent::new(settings());
        let outcome = dependent.ensure(&kyma("new"), &stores(dynamic)).await;
        assert_eq!(outcome.unwrap(), Convergence::Updated);
    }

    #[tokio::test]
    async fn matching_dependent_is_left_alone() {
        let mut dynamic = MockDynamicStore::new();
        dynamic.expect_get().returning(|_, _| Ok(projected("alpha")));
        dynamic.expect_create().never();
        dynamic.expect_replace().never();

        let dependent = ServerlessDependent::new(settings());
        let outcome = dependent.ensure(&kyma("alpha"), &stores(dynamic)).await;
        assert_eq!(outcome.unwrap(), Convergence::Unchanged);
    }

    #[tokio::test]
    async fn fatal_create_is_not_retryable() {
        let mut dynamic = MockDynamicStore::new();
        dynamic
            .expect_get()
            .returning(|_, k| Err(StoreError::not_found(SERVERLESS_KIND, k)));
        dynamic
            .expect_create()
            .returning(|_, _| {
                let key = ObjectKey::new("kyma-system", "default-serverless");
                Err(StoreError::fatal(SERVERLESS_KIND, &key, "admission webhook denied"))
            });

        let dependent = ServerlessDependent::new(settings());
        let err = dependent.ensure(&kyma("alpha"), &stores(dynamic)).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn remove_uses_derived_identity() {
        let mut dynamic = MockDynamicStore::new();
        dynamic
            .expect_delete()
            .withf(|_, key| key.name == "default-serverless")
            .times(1)
            .returning(|_, _| Ok(()));

        let dependent = ServerlessDependent::new(settings());
        let primary = ObjectKey::new("kyma-system", "default");
        assert_eq!(
            dependent.remove(&primary, &stores(dynamic)).await.unwrap(),
            Removal::Deleted
        );
    }
}
