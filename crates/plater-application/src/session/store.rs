//! In-memory session store.
//!
//! Source of truth for session state. Every state change and every event
//! published on a session's channel happens under the store's write lock, so
//! per-session event order matches the order of writes.

use super::channel::{ProgressChannel, ProgressSubscription};
use plater_core::error::{FatalKind, Result, SliceError};
use plater_core::fingerprint::Fingerprint;
use plater_core::plate::PlateRegistry;
use plater_core::session::{PlateProgress, ProgressEvent, SessionId, SessionState, SliceSession};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Error marker for plates reported by the engine but never enqueued.
const UNSLICED_DISCOVERED_PLATE: &str = "discovered plate was not sliced";

struct SessionEntry {
    session: SliceSession,
    channel: Arc<ProgressChannel>,
    cancel: CancellationToken,
    last_activity: Instant,
    /// Set once the plate worker started on this session.
    picked_up: bool,
    finished_at: Option<Instant>,
}

impl SessionEntry {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Applies a terminal transition and emits the matching terminal event.
    fn finish(&mut self, state: SessionState) -> bool {
        let event = match &state {
            SessionState::Completed => ProgressEvent::Complete {
                session_id: self.session.session_id.clone(),
            },
            SessionState::Failed { kind, message } => ProgressEvent::Error {
                kind: *kind,
                message: message.clone(),
            },
            SessionState::Cancelled => ProgressEvent::Error {
                kind: FatalKind::Cancelled,
                message: "slice cancelled".to_string(),
            },
            SessionState::Pending | SessionState::Running => return false,
        };
        if !self.session.transition(state) {
            return false;
        }
        self.cancel.cancel();
        self.finished_at = Some(Instant::now());
        self.channel.publish(event);
        true
    }
}

/// A session removed by the retention sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgedSession {
    pub session_id: SessionId,
    pub fingerprint: Fingerprint,
}

/// Shared between the session manager (lifecycle) and the plate worker
/// (progress and outcomes).
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    registry: Arc<dyn PlateRegistry>,
    channel_capacity: usize,
}

impl SessionStore {
    pub fn new(registry: Arc<dyn PlateRegistry>, channel_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            registry,
            channel_capacity,
        }
    }

    /// Adds a freshly created session.
    pub async fn insert(&self, session: SliceSession) {
        let session_id = session.session_id.clone();
        let entry = SessionEntry {
            channel: ProgressChannel::new(session_id.clone(), self.channel_capacity),
            session,
            cancel: CancellationToken::new(),
            last_activity: Instant::now(),
            picked_up: false,
            finished_at: None,
        };
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, entry);
    }

    /// Read-only snapshot of a session.
    pub async fn get(&self, session_id: &SessionId) -> Result<SliceSession> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| session_not_found(session_id))
    }

    pub async fn state_of(&self, session_id: &SessionId) -> Option<SessionState> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).map(|entry| entry.session.state.clone())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// `pending → running`, announced with the `start` event.
    pub async fn mark_running(&self, session_id: &SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(session_id) else {
            return false;
        };
        if !entry.session.transition(SessionState::Running) {
            return false;
        }
        entry.touch();
        entry.channel.publish(ProgressEvent::Start {
            session_id: session_id.clone(),
        });
        true
    }

    /// Called by the worker when it starts on a session.
    ///
    /// Returns the session's cancellation token, or `None` if the session is
    /// gone or already terminal.
    pub async fn begin_processing(&self, session_id: &SessionId) -> Option<CancellationToken> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(session_id)?;
        if entry.session.state.is_terminal() {
            return None;
        }
        entry.picked_up = true;
        entry.touch();
        Some(entry.cancel.clone())
    }

    /// Records a plate progress snapshot and publishes it.
    ///
    /// Completing snapshots are written back to the plate registry. Returns
    /// `false` when the session is unknown or terminal, or the write would
    /// break per-plate monotonicity.
    pub async fn record_progress(&self, session_id: &SessionId, progress: PlateProgress) -> bool {
        let file_id = {
            let mut sessions = self.sessions.write().await;
            let Some(entry) = sessions.get_mut(session_id) else {
                return false;
            };
            if entry.session.state.is_terminal() {
                return false;
            }
            if !entry.session.record_progress(progress.clone()) {
                tracing::warn!(
                    session_id = %session_id,
                    plate_index = progress.plate_index,
                    "[SessionStore] rejected non-monotonic plate update"
                );
                return false;
            }
            entry.touch();
            entry.channel.publish(ProgressEvent::Progress {
                progress: progress.clone(),
            });
            entry.session.request.file_id.clone()
        };

        if progress.is_complete {
            self.write_back(&file_id, &progress).await;
        }
        true
    }

    async fn write_back(&self, file_id: &str, progress: &PlateProgress) {
        let result = match &progress.error {
            Some(message) => {
                self.registry
                    .mark_plate_error(file_id, progress.plate_index, message)
                    .await
            }
            None => {
                self.registry
                    .update_estimates(file_id, progress.plate_index, &progress.estimates)
                    .await
            }
        };
        if let Err(e) = result {
            tracing::error!(
                file_id,
                plate_index = progress.plate_index,
                "[SessionStore] plate registry write failed: {}",
                e
            );
        }
    }

    /// Drives a running session to `completed`.
    ///
    /// Refused unless every enqueued plate is complete. Plates the engine
    /// reported on by itself that never finished are error-flagged and
    /// written back first, so every plate of a completed session carries
    /// estimates or an error.
    pub async fn complete(&self, session_id: &SessionId) -> bool {
        let (file_id, flagged) = {
            let mut sessions = self.sessions.write().await;
            let Some(entry) = sessions.get_mut(session_id) else {
                return false;
            };
            if entry.session.state.is_terminal() {
                return false;
            }
            if !entry.session.all_plates_complete() {
                tracing::error!(
                    session_id = %session_id,
                    "[SessionStore] refusing to complete session with unfinished plates"
                );
                return false;
            }

            let mut flagged = Vec::new();
            for plate_index in entry.session.unfinished_discovered_plates() {
                let progress = PlateProgress::failed(plate_index, UNSLICED_DISCOVERED_PLATE);
                if entry.session.record_progress(progress.clone()) {
                    tracing::warn!(
                        session_id = %session_id,
                        plate_index,
                        "[SessionStore] discovered plate was never sliced"
                    );
                    entry.channel.publish(ProgressEvent::Progress {
                        progress: progress.clone(),
                    });
                    flagged.push(progress);
                }
            }
            (entry.session.request.file_id.clone(), flagged)
        };

        for progress in &flagged {
            self.write_back(&file_id, progress).await;
        }

        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(entry) => entry.finish(SessionState::Completed),
            None => false,
        }
    }

    /// Drives a session to `failed` and emits the terminal `error` event.
    pub async fn fail(
        &self,
        session_id: &SessionId,
        kind: FatalKind,
        message: impl Into<String>,
    ) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(session_id) else {
            return false;
        };
        entry.finish(SessionState::Failed {
            kind,
            message: message.into(),
        })
    }

    /// Marks a session cancelled. Terminal sessions are left untouched.
    pub async fn cancel(&self, session_id: &SessionId) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        Ok(entry.finish(SessionState::Cancelled))
    }

    pub async fn attach(&self, session_id: &SessionId) -> Result<ProgressSubscription> {
        let sessions = self.sessions.read().await;
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        entry.channel.attach()
    }

    /// Fails picked-up sessions that have been silent for longer than `timeout`.
    pub async fn expire_idle(&self, timeout: Duration) -> Vec<SessionId> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (session_id, entry) in sessions.iter_mut() {
            if !entry.picked_up || !entry.session.state.is_active() {
                continue;
            }
            let idle = now.saturating_duration_since(entry.last_activity);
            if idle < timeout {
                continue;
            }
            let message = format!("no progress for {}s", idle.as_secs());
            if entry.finish(SessionState::Failed {
                kind: FatalKind::InactivityTimeout,
                message,
            }) {
                expired.push(session_id.clone());
            }
        }
        expired
    }

    /// Drops terminal sessions older than `retention`.
    pub async fn purge_finished(&self, retention: Duration) -> Vec<PurgedSession> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let stale: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, entry)| {
                entry
                    .finished_at
                    .map(|at| now.saturating_duration_since(at) >= retention)
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| sessions.remove(&id))
            .map(|entry| PurgedSession {
                session_id: entry.session.session_id,
                fingerprint: entry.session.fingerprint,
            })
            .collect()
    }
}

fn session_not_found(session_id: &SessionId) -> SliceError {
    SliceError::not_found("SliceSession", session_id.as_str())
}
