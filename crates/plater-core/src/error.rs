//! Error types for the Plater workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a session-fatal condition.
///
/// Carried by the terminal `error` event so clients can tell a timeout
/// apart from a broken engine or an explicit cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalKind {
    /// The slicing engine could not be reached or started.
    EngineUnavailable,
    /// The source model file is corrupt or unreadable.
    FileCorrupt,
    /// No progress was observed within the inactivity window.
    InactivityTimeout,
    /// The session was cancelled by a caller.
    Cancelled,
}

impl std::fmt::Display for FatalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FatalKind::EngineUnavailable => "engine_unavailable",
            FatalKind::FileCorrupt => "file_corrupt",
            FatalKind::InactivityTimeout => "inactivity_timeout",
            FatalKind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A shared error type for the entire Plater workspace.
///
/// Recoverable plate failures are normally carried as data on a
/// `PlateProgress`; the `RecoverablePlate` variant exists for callers that
/// need to surface one as a value (e.g. the CLI summary).
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SliceError {
    /// Unknown file, empty plate set or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A second consumer tried to attach to a session stream.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// One plate failed but the session may continue.
    #[error("Plate {plate_index} failed: {message}")]
    RecoverablePlate { plate_index: u32, message: String },

    /// The whole session was aborted.
    #[error("Slice session failed ({kind}): {message}")]
    FatalSession { kind: FatalKind, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON"
        message: String,
    },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SliceError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates an InvalidRequest error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Creates a Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a FatalSession error
    pub fn fatal(kind: FatalKind, message: impl Into<String>) -> Self {
        Self::FatalSession {
            kind,
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an InvalidRequest error
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }

    /// Check if this is a Conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if this error terminates a whole session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalSession { .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for SliceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for SliceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for SliceError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for SliceError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Conversion from String (for error messages)
impl From<String> for SliceError {
    fn from(err: String) -> Self {
        Self::Internal(err)
    }
}

/// A type alias for `Result<T, SliceError>`.
pub type Result<T> = std::result::Result<T, SliceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_checks() {
        assert!(SliceError::not_found("SliceSession", "abc").is_not_found());
        assert!(SliceError::invalid_request("empty plate set").is_invalid_request());
        assert!(SliceError::conflict("already attached").is_conflict());
        assert!(SliceError::fatal(FatalKind::InactivityTimeout, "idle").is_fatal());
        assert!(!SliceError::internal("boom").is_fatal());
    }

    #[test]
    fn test_display_includes_kind() {
        let err = SliceError::fatal(FatalKind::EngineUnavailable, "slicer missing");
        assert_eq!(
            err.to_string(),
            "Slice session failed (engine_unavailable): slicer missing"
        );
    }

    #[test]
    fn test_from_toml_error() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("a = ");
        let err: SliceError = parse.unwrap_err().into();
        assert!(matches!(err, SliceError::Serialization { ref format, .. } if format == "TOML"));
    }
}
