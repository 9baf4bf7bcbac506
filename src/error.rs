//! Error types for kyrostore.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! specific conditions (a missing key, a bad profile name) instead of parsing
//! messages.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading configuration or resolving a store profile.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No profile with this name.
    #[error("No configuration for object store named '{name}'. keys are: {}", .available.join(", "))]
    UnknownProfile {
        /// Requested profile.
        name: String,
        /// Profiles that do exist.
        available: Vec<String>,
    },

    /// A profile without `class_`.
    #[error("No `class_` specified for object store '{profile}'")]
    MissingClass {
        /// Offending profile.
        profile: String,
    },

    /// A `class_` naming no known backend.
    #[error("Unknown object store class '{class}'")]
    UnknownClass {
        /// The unknown class.
        class: String,
    },

    /// A backend parameter the chosen class needs is absent.
    #[error("Object store class '{class}' requires field '{field}'")]
    MissingField {
        /// Backend class.
        class: String,
        /// Missing parameter.
        field: String,
    },

    /// The backend client was compiled out.
    #[error("Object store class '{class}' needs the '{feature}' cargo feature")]
    FeatureDisabled {
        /// Backend class.
        class: String,
        /// Cargo feature to enable.
        feature: String,
    },

    /// An address whose scheme no client handles.
    #[error("Unsupported address '{address}' for object store class '{class}'")]
    UnsupportedScheme {
        /// Backend class.
        class: String,
        /// Offending address.
        address: String,
    },

    /// A configuration file that is not valid YAML.
    #[error("Failed to parse configuration {}: {message}", .path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

/// Top-level error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key absent from the store.
    #[error("No such key {key} in bucket {bucket}")]
    NotFound {
        /// Bucket searched.
        bucket: String,
        /// Bucket-relative key.
        key: String,
    },

    /// Stored content type the codec can't decode.
    #[error("Can't decode content-type '{content_type}'")]
    UnsupportedContentType {
        /// The stored type.
        content_type: String,
    },

    /// Configuration or profile resolution failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Bucket name failed validation.
    #[error("Bucket name '{bucket}' contains an underscore, which is not allowed")]
    InvalidBucketName {
        /// Rejected name.
        bucket: String,
    },

    /// A collection entry holds the wrong shape.
    #[error("Object at {key} is not a {expected}")]
    TypeMismatch {
        /// Entry key.
        key: String,
        /// Shape the caller asked for.
        expected: String,
    },

    /// Key or prefix rejected before reaching the backend.
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey {
        /// Rejected key.
        key: String,
        /// Why.
        reason: String,
    },

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// What went wrong.
        message: String,
    },

    /// The remote service failed.
    #[error("Storage backend error: {message}")]
    Backend {
        /// Service error text.
        message: String,
    },
}

impl StoreError {
    /// Creates a not-found error for a namespaced key.
    #[must_use]
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Creates a backend error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a type-mismatch error for a collection payload.
    #[must_use]
    pub fn type_mismatch(key: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected: expected.into(),
        }
    }

    /// Returns true if the key was absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if the stored payload had an unexpected shape.
    #[must_use]
    pub const fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("json: {err}"))
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::serialization(format!("binary object encode: {err}"))
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::serialization(format!("binary object decode: {err}"))
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn lock_err(context: &'static str) -> StoreError {
    StoreError::backend(format!("poisoned lock: {context}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StoreError::not_found("cache", "session/1/messages");
        let msg = format!("{err}");
        assert!(msg.contains("session/1/messages"));
        assert!(msg.contains("cache"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unknown_profile_lists_available() {
        let err = ConfigError::UnknownProfile {
            name: "missing".to_string(),
            available: vec!["local".to_string(), "remote".to_string()],
        };
        let msg = format!("{err}");
        assert!(msg.contains("'missing'"));
        assert!(msg.contains("local, remote"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: StoreError = ConfigError::MissingClass {
            profile: "x".to_string(),
        }
        .into();
        assert!(err.is_config());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_invalid_bucket_display() {
        let err = StoreError::InvalidBucketName {
            bucket: "my_bucket".to_string(),
        };
        assert!(err.to_string().contains("underscore"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
