//! Error types for the aws-auth operator

use thiserror::Error;

use crate::authmap::EntryKind;

/// Main error type for aws-auth synchronization
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The stored document could not be parsed
    #[error("decode error in '{key}': {message}")]
    Decode {
        /// ConfigMap data key that failed to decode (mapRoles / mapUsers)
        key: String,
        /// Parser message
        message: String,
    },

    /// A collection could not be serialized back to YAML
    #[error("encode error: {0}")]
    Encode(String),

    /// The ConfigMap could not be read, created or written
    #[error("store unavailable during {operation}: {source}")]
    StoreUnavailable {
        /// Store operation that failed (get, create, replace)
        operation: &'static str,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// A removal target is absent from the auth map
    #[error("{kind} with username '{username}' not found in auth map")]
    NotFound {
        /// Collection the lookup ran against
        kind: EntryKind,
        /// Username that was not found
        username: String,
    },

    /// The retry budget was spent without a successful cycle
    #[error("waiter timed out after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Error returned by the final attempt
        #[source]
        source: Box<Error>,
    },

    /// Invalid request or configuration
    #[error("validation error: {0}")]
    Validation(String),

    /// Kubernetes API error outside the auth map store (finalizer patches)
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl Error {
    /// Create a decode error for the given data key
    pub fn decode(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Decode {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create an encode error with the given message
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Wrap a kube error raised by the ConfigMap store
    pub fn store(operation: &'static str, source: kube::Error) -> Self {
        Self::StoreUnavailable { operation, source }
    }

    /// Create a not-found error for a removal target
    pub fn not_found(kind: EntryKind, username: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            username: username.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the retry driver should attempt the cycle again.
    ///
    /// Removal misses count as retryable: an absent entry is retried until the
    /// budget is spent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::StoreUnavailable { .. } | Error::NotFound { .. } | Error::Kube(_) => true,
            Error::Decode { .. }
            | Error::Encode(_)
            | Error::Validation(_)
            | Error::RetryExhausted { .. } => false,
        }
    }

    /// Whether this error (or the error it wraps) is a removal miss
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::RetryExhausted { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}
