//! Error types for cache operations.
//!
//! Every fallible cache operation returns [`CacheResult`]. Expected outcomes
//! such as a cache miss are ordinary values of [`CacheError`], not panics, so
//! callers branch on them the same way they branch on transport faults.

use std::fmt;

use serde::Serialize;

/// Error code reported when neither tier holds the key.
pub const CACHE_MISS_CODE: &str = "cache.miss";

/// Error code reported when a remote value cannot be decoded to the requested type.
pub const UNKNOWN_VALUE_CODE: &str = "cache.unknown_value";

/// Error code reported when the remote tier fails a call.
pub const REMOTE_FAULT_CODE: &str = "cache.remote_fault";

/// Error code reported when a cancellation signal aborts a remote call.
pub const CANCELLED_CODE: &str = "cache.cancelled";

/// Error code reported when a value cannot be encoded for the remote tier.
pub const SERIALIZATION_CODE: &str = "cache.serialization";

/// Error code reported when entry options are rejected.
pub const INVALID_OPTIONS_CODE: &str = "cache.invalid_options";

/// Errors that can occur during cache operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Neither tier holds a value for the key.
    #[error("Cache miss.")]
    Miss {
        /// The key that was looked up.
        key: String,
    },

    /// The remote tier returned bytes that do not decode to the requested type,
    /// or that decode to null.
    #[error("Unable to deserialize the cache value for key \"{key}\" to type \"{type_name}\".")]
    UnknownValue {
        /// The key that was looked up.
        key: String,
        /// The requested Rust type.
        type_name: &'static str,
        /// Decoder diagnostics, when the bytes were malformed rather than null.
        reason: Option<String>,
    },

    /// The remote tier reported a transport or server fault.
    #[error("Remote tier fault: {message}")]
    RemoteFault {
        /// The key of the failed call, if the call was key-scoped.
        key: Option<String>,
        /// Description of the fault.
        message: String,
    },

    /// A cancellation signal aborted an in-flight remote call.
    #[error("Cache operation was cancelled.")]
    Cancelled {
        /// The key of the aborted call.
        key: Option<String>,
    },

    /// The value could not be encoded for the remote tier.
    #[error("Unable to serialize the cache value for key \"{key}\": {message}")]
    Serialization {
        /// The key being written.
        key: String,
        /// Encoder diagnostics.
        message: String,
    },

    /// Entry options violate the expiration contract.
    #[error("Invalid cache entry options: {message}")]
    InvalidOptions {
        /// Which constraint was violated.
        message: String,
    },

    /// A failure raised outside the cache, typically by a fetch callback.
    #[error("{message}")]
    Custom {
        /// Caller-defined error code.
        code: String,
        /// Human-readable description.
        message: String,
        /// Optional target of the failure.
        context: Option<String>,
    },
}

impl CacheError {
    /// Creates a new `Miss` error.
    #[must_use]
    pub fn miss(key: impl Into<String>) -> Self {
        Self::Miss { key: key.into() }
    }

    /// Creates a new `UnknownValue` error for the target type `T`.
    #[must_use]
    pub fn unknown_value<T: ?Sized>(key: impl Into<String>, reason: Option<String>) -> Self {
        Self::UnknownValue {
            key: key.into(),
            type_name: std::any::type_name::<T>(),
            reason,
        }
    }

    /// Creates a new `RemoteFault` error scoped to a key.
    #[must_use]
    pub fn remote_fault(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteFault {
            key: Some(key.into()),
            message: message.into(),
        }
    }

    /// Creates a new `Cancelled` error scoped to a key.
    #[must_use]
    pub fn cancelled(key: impl Into<String>) -> Self {
        Self::Cancelled {
            key: Some(key.into()),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serialization {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidOptions` error.
    #[must_use]
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }

    /// Creates a caller-defined error with its own code.
    #[must_use]
    pub fn custom(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Custom {
            code: code.into(),
            message: message.into(),
            context: None,
        }
    }

    /// Attaches a context (usually the key) to a caller-defined error.
    ///
    /// Built-in variants already carry their key and are returned unchanged.
    #[must_use]
    pub fn with_context(self, target: impl Into<String>) -> Self {
        match self {
            Self::Custom { code, message, .. } => Self::Custom {
                code,
                message,
                context: Some(target.into()),
            },
            other => other,
        }
    }

    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Miss { .. } => CACHE_MISS_CODE,
            Self::UnknownValue { .. } => UNKNOWN_VALUE_CODE,
            Self::RemoteFault { .. } => REMOTE_FAULT_CODE,
            Self::Cancelled { .. } => CANCELLED_CODE,
            Self::Serialization { .. } => SERIALIZATION_CODE,
            Self::InvalidOptions { .. } => INVALID_OPTIONS_CODE,
            Self::Custom { code, .. } => code,
        }
    }

    /// Returns the context of the failure, usually the cache key.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Miss { key }
            | Self::UnknownValue { key, .. }
            | Self::Serialization { key, .. } => Some(key),
            Self::RemoteFault { key, .. } | Self::Cancelled { key } => key.as_deref(),
            Self::Custom { context, .. } => context.as_deref(),
            Self::InvalidOptions { .. } => None,
        }
    }

    /// Returns `true` if this is a cache miss.
    #[must_use]
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss { .. })
    }

    /// Returns `true` if this is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Miss { .. } => ErrorCategory::Miss,
            Self::UnknownValue { .. } => ErrorCategory::UnknownValue,
            Self::RemoteFault { .. } | Self::Serialization { .. } => ErrorCategory::Fault,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::InvalidOptions { .. } => ErrorCategory::Contract,
            Self::Custom { .. } => ErrorCategory::Caller,
        }
    }

    /// Returns the `{ code, message, context }` descriptor of this error.
    #[must_use]
    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor {
            code: self.code().to_string(),
            message: self.to_string(),
            context: self.context().map(str::to_string),
        }
    }
}

/// Serializable view of a [`CacheError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDescriptor {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Categories of cache errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// No value was found. Recoverable by fetching.
    Miss,
    /// A value was found but is unusable.
    UnknownValue,
    /// A tier or the codec failed.
    Fault,
    /// The caller cancelled the operation.
    Cancelled,
    /// The caller broke an API contract.
    Contract,
    /// Raised by caller code.
    Caller,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Miss => write!(f, "miss"),
            Self::UnknownValue => write!(f, "unknown_value"),
            Self::Fault => write!(f, "fault"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Contract => write!(f, "contract"),
            Self::Caller => write!(f, "caller"),
        }
    }
}

/// Type alias for a cache result.
pub type CacheResult<T> = Result<T, CacheError>;
