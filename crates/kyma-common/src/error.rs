//! Error types for the Kyma operator
//!
//! Two layers:
//! - [`StoreError`] is what the store collaborators return. It carries a closed
//!   [`ErrorKind`] so the reconciler can branch on "not found" / "already exists"
//!   without probing a backend-specific error value.
//! - [`Error`] is what a reconciliation returns. [`Error::is_retryable`] decides
//!   whether the dispatcher redelivers the identity.

use std::fmt;

use thiserror::Error;

use crate::key::ObjectKey;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Closed classification of store failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The addressed object does not exist
    NotFound,
    /// An object with the same identity already exists
    AlreadyExists,
    /// Network, timeout, conflict, throttling; retrying may succeed
    Transient,
    /// Malformed request or unsupported kind; retrying cannot succeed
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NotFound"),
            Self::AlreadyExists => write!(f, "AlreadyExists"),
            Self::Transient => write!(f, "Transient"),
            Self::Fatal => write!(f, "Fatal"),
        }
    }
}

/// Failure reported by a typed or dynamic store operation
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed object does not exist
    #[error("{resource} {key} not found")]
    NotFound {
        /// Kind of the addressed object
        resource: String,
        /// Identity of the addressed object
        key: ObjectKey,
    },

    /// Create collided with an existing object
    #[error("{resource} {key} already exists")]
    AlreadyExists {
        /// Kind of the addressed object
        resource: String,
        /// Identity of the addressed object
        key: ObjectKey,
    },

    /// Retryable failure
    #[error("transient error on {resource} {key}: {message}")]
    Transient {
        /// Kind of the addressed object
        resource: String,
        /// Identity of the addressed object
        key: ObjectKey,
        /// Description of what failed
        message: String,
    },

    /// Non-retryable failure
    #[error("{resource} {key} rejected: {message}")]
    Fatal {
        /// Kind of the addressed object
        resource: String,
        /// Identity of the addressed object
        key: ObjectKey,
        /// Description of what failed
        message: String,
    },
}

impl StoreError {
    /// Object does not exist
    pub fn not_found(resource: impl Into<String>, key: &ObjectKey) -> Self {
        Self::NotFound {
            resource: resource.into(),
            key: key.clone(),
        }
    }

    /// Object already exists
    pub fn already_exists(resource: impl Into<String>, key: &ObjectKey) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
            key: key.clone(),
        }
    }

    /// Retryable failure
    pub fn transient(
        resource: impl Into<String>,
        key: &ObjectKey,
        msg: impl Into<String>,
    ) -> Self {
        Self::Transient {
            resource: resource.into(),
            key: key.clone(),
            message: msg.into(),
        }
    }

    /// Non-retryable failure
    pub fn fatal(resource: impl Into<String>, key: &ObjectKey, msg: impl Into<String>) -> Self {
        Self::Fatal {
            resource: resource.into(),
            key: key.clone(),
            message: msg.into(),
        }
    }

    /// Classify a kube-rs error for the object `resource` at `key`
    ///
    /// 404 is NotFound; 409 is AlreadyExists when the API server says so and a
    /// transient write conflict otherwise. Request-shape errors (400, 405, 415, 422)
    /// and payload (de)serialization failures are fatal. Everything else, including
    /// auth errors, throttling, 5xx, and transport failures, is transient.
    pub fn from_kube(resource: impl Into<String>, key: &ObjectKey, err: kube::Error) -> Self {
        let resource = resource.into();
        match &err {
            kube::Error::Api(ae) => match ae.code {
                404 => Self::not_found(resource, key),
                409 if ae.reason == "AlreadyExists" => Self::already_exists(resource, key),
                400 | 405 | 415 | 422 => Self::fatal(resource, key, ae.message.clone()),
                _ => Self::transient(resource, key, ae.message.clone()),
            },
            kube::Error::SerdeError(e) => Self::fatal(resource, key, e.to_string()),
            _ => Self::transient(resource, key, err.to_string()),
        }
    }

    /// The closed classification of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Fatal { .. } => ErrorKind::Fatal,
        }
    }

    /// Whether the addressed object was absent
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether a create collided with an existing object
    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }
}

/// Error returned from a reconciliation attempt
#[derive(Debug, Error)]
pub enum Error {
    /// A store operation failed with a non-benign error
    #[error("{operation} failed: {source}")]
    Store {
        /// The operation being performed (e.g. "create ServerlessConfiguration")
        operation: String,
        /// The classified store failure
        #[source]
        source: StoreError,
    },

    /// The primary resource's spec cannot be projected
    #[error("validation error for {kyma}: {message}")]
    Validation {
        /// Identity of the invalid primary
        kyma: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.foo")
        field: Option<String>,
    },

    /// Building a dependent payload failed
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// The caller's cancellation token or deadline fired mid-reconcile
    #[error("reconciliation cancelled: {context}")]
    Cancelled {
        /// Where the cancellation was observed
        context: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "dispatcher", "watcher")
        context: String,
    },
}

impl Error {
    /// Wrap a store failure with the operation that produced it
    pub fn store(operation: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            operation: operation.into(),
            source,
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            kyma: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific primary
    pub fn validation_for(kyma: impl fmt::Display, msg: impl Into<String>) -> Self {
        Self::Validation {
            kyma: kyma.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific primary and field path
    pub fn validation_for_field(
        kyma: impl fmt::Display,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            kyma: kyma.to_string(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::Cancelled {
            context: context.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors need a spec change. Store errors are
    /// retryable unless the store classified them as fatal. NotFound or
    /// AlreadyExists surfacing here means the object changed under us between two
    /// calls, which a fresh pass resolves.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Store { source, .. } => source.kind() != ErrorKind::Fatal,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Cancelled { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// The store classification, if this error came from a store
    pub fn store_kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Store { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}
