//! Namespaced object identity
//!
//! Every resource the operator touches is addressed by `(namespace, name)`.
//! Dependent identities are derived from the primary's identity, so the
//! derivation helpers live here next to the type.

use std::fmt;

use kube::Resource;

/// The `(namespace, name)` pair that uniquely addresses a namespaced object
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
}

impl ObjectKey {
    /// Create a key from a namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build the key of a namespaced object from its metadata
    ///
    /// Returns `None` when the object has no name or no namespace.
    pub fn from_resource<K: Resource>(obj: &K) -> Option<Self> {
        let meta = obj.meta();
        Some(Self {
            namespace: meta.namespace.clone()?,
            name: meta.name.clone()?,
        })
    }

    /// Derive a sibling key in the same namespace with `suffix` appended to the name
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            namespace: self.namespace.clone(),
            name: format!("{}{}", self.name, suffix),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
