//! IstioConfiguration dependent (typed store)

use async_trait::async_trait;
use tracing::debug;

use kyma_common::crd::{IstioConfiguration, IstioConfigurationSpec, Kyma, ISTIO_SEED_SUFFIX};
use kyma_common::{Error, ObjectKey, MANAGED_BY_LABEL, OPERATOR_NAME};

use super::{managed_labels, primary_key, Convergence, Dependent, Removal};
use crate::store::Stores;

const KIND: &str = "IstioConfiguration";

/// Project the desired IstioConfiguration for `kyma`
///
/// Same identity as the Kyma; `spec.foo` is the seed with a fixed suffix.
pub fn project_istio(kyma: &Kyma) -> Result<IstioConfiguration, Error> {
    let primary = primary_key(kyma)?;

    let mut obj = IstioConfiguration::new(
        &primary.name,
        IstioConfigurationSpec {
            foo: format!("{}{}", kyma.spec.foo, ISTIO_SEED_SUFFIX),
        },
    );
    obj.metadata.namespace = Some(primary.namespace);
    obj.metadata.labels = Some(managed_labels());
    Ok(obj)
}

/// Dependent entry for IstioConfiguration
#[derive(Clone, Copy, Debug, Default)]
pub struct IstioDependent;

impl IstioDependent {
    async fn replace_if_drifted(
        &self,
        stores: &Stores,
        mut existing: IstioConfiguration,
        desired: IstioConfiguration,
    ) -> Result<Convergence, Error> {
        if existing.spec == desired.spec {
            return Ok(Convergence::Unchanged);
        }

        // Keep resourceVersion and foreign metadata; only the projection is ours
        existing.spec = desired.spec;
        existing
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string());

        stores
            .typed
            .replace_istio_configuration(&existing)
            .await
            .map_err(|e| Error::store("replace IstioConfiguration", e))?;
        Ok(Convergence::Updated)
    }
}

#[async_trait]
impl Dependent for IstioDependent {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn key_for(&self, primary: &ObjectKey) -> ObjectKey {
        primary.clone()
    }

    async fn ensure(&self, kyma: &Kyma, stores: &Stores) -> Result<Convergence, Error> {
        let desired = project_istio(kyma)?;
        let key = self.key_for(&primary_key(kyma)?);

        match stores.typed.get_istio_configuration(&key).await {
            Ok(existing) => self.replace_if_drifted(stores, existing, desired).await,
            Err(e) if e.is_not_found() => {
                match stores.typed.create_istio_configuration(&desired).await {
                    Ok(()) => Ok(Convergence::Created),
                    Err(e) if e.is_already_exists() => {
                        debug!(%key, "IstioConfiguration appeared concurrently, re-reading");
                        let existing = stores
                            .typed
                            .get_istio_configuration(&key)
                            .await
                            .map_err(|e| Error::store("get IstioConfiguration", e))?;
                        self.replace_if_drifted(stores, existing, desired).await
                    }
                    Err(e) => Err(Error::store("create IstioConfiguration", e)),
                }
            }
            Err(e) => Err(Error::store("get IstioConfiguration", e)),
        }
    }

    async fn remove(&self, primary: &ObjectKey, stores: &Stores) -> Result<Removal, Error> {
        let key = self.key_for(primary);
        match stores.typed.delete_istio_configuration(&key).await {
            Ok(()) => Ok(Removal::Deleted),
            Err(e) if e.is_not_found() => Ok(Removal::AlreadyAbsent),
            Err(e) => Err(Error::store("delete IstioConfiguration", e)),
        }
    }
}
