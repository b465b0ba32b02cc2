//! Common types for the Kyma operator: CRDs, identities, errors, and utilities

#![deny(missing_docs)]

pub mod backoff;
pub mod crd;
pub mod error;
pub mod key;
pub mod telemetry;

pub use error::{Error, ErrorKind, StoreError};
pub use key::ObjectKey;

/// Field manager / controller name used for writes and labels
pub const OPERATOR_NAME: &str = "kyma-operator";

/// Label key marking dependents written by this operator
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Maximum length of a Kubernetes object name (DNS subdomain)
pub const MAX_NAME_LEN: usize = 253;
