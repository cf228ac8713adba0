use crate::error::FatalKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a plate invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineFailureKind {
    /// Bad parameter combination for this plate.
    InvalidParameters,
    /// A filament assigned to this plate is not supported.
    UnsupportedMaterial,
    /// The engine could not be started or reached.
    EngineUnavailable,
    /// The model file is corrupt or unreadable.
    FileCorrupt,
    /// Any other per-plate failure.
    Other,
}

/// Terminal failure reported by an engine for one plate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct EngineFailure {
    pub kind: EngineFailureKind,
    pub message: String,
}

impl EngineFailure {
    pub fn new(kind: EngineFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(EngineFailureKind::EngineUnavailable, message)
    }

    pub fn file_corrupt(message: impl Into<String>) -> Self {
        Self::new(EngineFailureKind::FileCorrupt, message)
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(EngineFailureKind::InvalidParameters, message)
    }

    /// Fatal failures abort the remaining plates of a session.
    pub fn is_fatal(&self) -> bool {
        self.fatal_kind().is_some()
    }

    /// Session-level classification for fatal failures.
    pub fn fatal_kind(&self) -> Option<FatalKind> {
        match self.kind {
            EngineFailureKind::EngineUnavailable => Some(FatalKind::EngineUnavailable),
            EngineFailureKind::FileCorrupt => Some(FatalKind::FileCorrupt),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(EngineFailure::unavailable("no slicer").is_fatal());
        assert!(EngineFailure::file_corrupt("bad zip").is_fatal());
        assert!(!EngineFailure::invalid_parameters("layer height").is_fatal());
        assert!(!EngineFailure::new(EngineFailureKind::UnsupportedMaterial, "TPU").is_fatal());
        assert!(!EngineFailure::new(EngineFailureKind::Other, "exit 1").is_fatal());
    }
}
