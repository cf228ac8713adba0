use serde::{Deserialize, Serialize};

use super::model::{PlateProgress, SessionId};
use crate::error::FatalKind;

/// Events delivered on a session's progress stream.
///
/// Exactly one terminal event (`Complete` or `Error`) ends every stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Processing has begun.
    Start { session_id: SessionId },
    /// A plate progress snapshot.
    Progress { progress: PlateProgress },
    /// Every enqueued plate reached a terminal outcome.
    Complete { session_id: SessionId },
    /// The session was aborted.
    Error { kind: FatalKind, message: String },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }

    /// Wire name of the variant, used as the SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Start { .. } => "start",
            ProgressEvent::Progress { .. } => "progress",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }

    pub fn progress(&self) -> Option<&PlateProgress> {
        match self {
            ProgressEvent::Progress { progress } => Some(progress),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let event = ProgressEvent::Error {
            kind: FatalKind::FileCorrupt,
            message: "bad 3mf".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "file_corrupt");
        assert!(event.is_terminal());
    }

    #[test]
    fn test_progress_is_not_terminal() {
        let event = ProgressEvent::Progress {
            progress: PlateProgress::running(1, "slicing", 10.0, ""),
        };
        assert!(!event.is_terminal());
        assert_eq!(event.name(), "progress");
        assert_eq!(event.progress().map(|p| p.plate_index), Some(1));
    }
}
