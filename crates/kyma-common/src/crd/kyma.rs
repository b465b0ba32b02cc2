//! Kyma CRD types
//!
//! Defines `Kyma`, the desired installation state. Its spec carries a single
//! seed value from which dependent configurations are projected.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::key::ObjectKey;

// =============================================================================
// CRD
// =============================================================================

/// Desired installation state of a Kyma runtime
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "inventory.kyma-project.io",
    version = "v1alpha1",
    kind = "Kyma",
    plural = "kymas",
    namespaced,
    printcolumn = r#"{"name":"Foo","type":"string","jsonPath":".spec.foo"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KymaSpec {
    /// Seed value projected into every dependent configuration
    #[serde(default)]
    pub foo: String,
}

impl KymaSpec {
    /// Validate the spec before any dependent is projected from it
    ///
    /// The seed ends up in object fields of other resources, so control
    /// characters are rejected.
    pub fn validate(&self, kyma: &ObjectKey) -> Result<(), Error> {
        if self.foo.chars().any(char::is_control) {
            return Err(Error::validation_for_field(
                kyma,
                "spec.foo",
                "seed must not contain control characters",
            ));
        }
        Ok(())
    }
}
