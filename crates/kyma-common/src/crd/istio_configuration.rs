//! IstioConfiguration CRD types
//!
//! Configuration resource consumed by the Istio component operator. It shares the
//! identity of the `Kyma` it was projected from.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Suffix appended to the Kyma seed when projecting `spec.foo`
pub const ISTIO_SEED_SUFFIX: &str = "_from_mothership";

/// Istio component configuration derived from a Kyma
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "istio.kyma-project.io",
    version = "v1alpha1",
    kind = "IstioConfiguration",
    plural = "istioconfigurations",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IstioConfigurationSpec {
    /// Value derived from the Kyma seed
    #[serde(default)]
    pub foo: String,
}
