//! Slice session domain model.

use crate::error::FatalKind;
use crate::fingerprint::Fingerprint;
use crate::plate::Estimates;
use crate::request::SliceRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Phase label written on a plate whose slice failed recoverably.
pub const ERROR_PHASE: &str = "error";
/// Phase label written on a plate that finished with estimates.
pub const COMPLETED_PHASE: &str = "completed";

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a slice session.
///
/// `pending → running → {completed | failed | cancelled}`. Terminal states
/// are sticky.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Running,
    Completed,
    Failed { kind: FatalKind, message: String },
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed { .. } | SessionState::Cancelled
        )
    }

    /// Pending or running.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Pending | SessionState::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionState::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Failed { .. } => "failed",
            SessionState::Cancelled => "cancelled",
        }
    }

    fn can_transition_to(&self, next: &SessionState) -> bool {
        match (self, next) {
            (SessionState::Pending, SessionState::Running) => true,
            (SessionState::Pending | SessionState::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

/// Snapshot of one plate's slicing progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateProgress {
    pub plate_index: u32,
    /// Free-form stage label reported by the engine.
    pub phase: String,
    pub progress_percent: f32,
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_complete: bool,
    #[serde(default)]
    pub estimates: Estimates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlateProgress {
    /// An intermediate, non-terminal update.
    pub fn running(
        plate_index: u32,
        phase: impl Into<String>,
        progress_percent: f32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            plate_index,
            phase: phase.into(),
            progress_percent: clamp_percent(progress_percent),
            message: message.into(),
            timestamp: Utc::now(),
            is_complete: false,
            estimates: Estimates::default(),
            error: None,
        }
    }

    /// Terminal success carrying estimates.
    pub fn completed(plate_index: u32, estimates: Estimates) -> Self {
        Self {
            plate_index,
            phase: COMPLETED_PHASE.to_string(),
            progress_percent: 100.0,
            message: String::new(),
            timestamp: Utc::now(),
            is_complete: true,
            estimates,
            error: None,
        }
    }

    /// Terminal recoverable failure.
    pub fn failed(plate_index: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            plate_index,
            phase: ERROR_PHASE.to_string(),
            progress_percent: 100.0,
            message: message.clone(),
            timestamp: Utc::now(),
            is_complete: true,
            estimates: Estimates::default(),
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Whether `next` may replace `self` for the same plate.
    ///
    /// Once a plate is complete, later writes must stay complete and must not
    /// lower the percentage.
    pub fn permits(&self, next: &PlateProgress) -> bool {
        if !self.is_complete {
            return true;
        }
        next.is_complete && next.progress_percent >= self.progress_percent
    }
}

fn clamp_percent(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Server-side record of one multi-plate slicing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceSession {
    pub session_id: SessionId,
    pub fingerprint: Fingerprint,
    pub request: SliceRequest,
    pub state: SessionState,
    /// Plates enqueued for this session, in processing order.
    pub plates: Vec<u32>,
    pub plate_progress: BTreeMap<u32, PlateProgress>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SliceSession {
    pub fn new(request: SliceRequest, plates: Vec<u32>) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::generate(),
            fingerprint: request.fingerprint(),
            request,
            state: SessionState::Pending,
            plates,
            plate_progress: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the state machine forward.
    ///
    /// Returns `false` (and leaves the state untouched) for transitions the
    /// machine does not allow, including any transition out of a terminal state.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(&next) {
            return false;
        }
        self.state = next;
        self.updated_at = Utc::now();
        true
    }

    /// Stores a progress snapshot, honoring per-plate monotonicity.
    ///
    /// Returns `false` when the write was rejected.
    pub fn record_progress(&mut self, progress: PlateProgress) -> bool {
        if let Some(existing) = self.plate_progress.get(&progress.plate_index)
            && !existing.permits(&progress)
        {
            return false;
        }
        self.plate_progress.insert(progress.plate_index, progress);
        self.updated_at = Utc::now();
        true
    }

    /// True when every enqueued plate reached `is_complete`.
    pub fn all_plates_complete(&self) -> bool {
        self.plates.iter().all(|index| {
            self.plate_progress
                .get(index)
                .map(|p| p.is_complete)
                .unwrap_or(false)
        })
    }

    /// Plates the engine reported on outside the enqueued list that never
    /// reached a terminal outcome.
    pub fn unfinished_discovered_plates(&self) -> Vec<u32> {
        self.plate_progress
            .values()
            .filter(|p| !p.is_complete && !self.plates.contains(&p.plate_index))
            .map(|p| p.plate_index)
            .collect()
    }

    /// Plates that ended with a recoverable error.
    pub fn failed_plates(&self) -> Vec<u32> {
        self.plate_progress
            .values()
            .filter(|p| p.is_error())
            .map(|p| p.plate_index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SliceSession {
        SliceSession::new(SliceRequest::new("f1", "cool_plate"), vec![1, 2])
    }

    #[test]
    fn test_state_machine() {
        let mut s = session();
        assert_eq!(s.state, SessionState::Pending);
        assert!(s.transition(SessionState::Running));
        assert!(!s.transition(SessionState::Pending));
        assert!(s.transition(SessionState::Completed));
        assert!(!s.transition(SessionState::Cancelled));
        assert_eq!(s.state, SessionState::Completed);
    }

    #[test]
    fn test_pending_can_be_cancelled() {
        let mut s = session();
        assert!(s.transition(SessionState::Cancelled));
        assert!(s.state.is_terminal());
    }

    #[test]
    fn test_completed_plate_is_sticky() {
        let mut s = session();
        assert!(s.record_progress(PlateProgress::completed(1, Estimates::new(Some(60), None))));
        assert!(!s.record_progress(PlateProgress::running(1, "slicing", 40.0, "")));

        let stored = &s.plate_progress[&1];
        assert!(stored.is_complete);
        assert_eq!(stored.progress_percent, 100.0);
    }

    #[test]
    fn test_all_plates_complete() {
        let mut s = session();
        s.record_progress(PlateProgress::completed(1, Estimates::default()));
        assert!(!s.all_plates_complete());
        s.record_progress(PlateProgress::failed(2, "unsupported material"));
        assert!(s.all_plates_complete());
        assert_eq!(s.failed_plates(), vec![2]);
    }

    #[test]
    fn test_unfinished_discovered_plates() {
        let mut s = session();
        s.record_progress(PlateProgress::running(1, "slicing", 50.0, ""));
        s.record_progress(PlateProgress::running(7, "slicing", 40.0, ""));
        s.record_progress(PlateProgress::completed(9, Estimates::default()));
        assert_eq!(s.unfinished_discovered_plates(), vec![7]);
    }

    #[test]
    fn test_percent_clamped() {
        assert_eq!(PlateProgress::running(1, "x", 140.0, "").progress_percent, 100.0);
        assert_eq!(PlateProgress::running(1, "x", -3.0, "").progress_percent, 0.0);
        assert_eq!(PlateProgress::running(1, "x", f32::NAN, "").progress_percent, 0.0);
    }

    #[test]
    fn test_state_serializes_tagged() {
        let json = serde_json::to_value(SessionState::Failed {
            kind: FatalKind::InactivityTimeout,
            message: "idle".to_string(),
        })
        .unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["kind"], "inactivity_timeout");
    }
}
