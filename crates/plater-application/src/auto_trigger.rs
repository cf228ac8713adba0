//! Debounced automatic slicing.
//!
//! The controller watches configuration snapshots and asks the session
//! manager for a slice once the configuration has settled. Each distinct
//! settled configuration is submitted at most once; a fingerprint whose
//! session is still running or has failed is not retried automatically until
//! the file changes or the controller is reset.

use crate::session::SliceStarter;
use plater_core::error::Result;
use plater_core::fingerprint::Fingerprint;
use plater_core::request::SliceRequest;
use plater_core::session::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// What `observe` did with a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// A debounce timer was started.
    Scheduled,
    /// A timer for this exact configuration is already running.
    AlreadyScheduled,
    /// Equal to the last submitted configuration.
    Unchanged,
    /// The configuration's session is active or failed.
    Suspended,
}

impl ObserveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObserveOutcome::Scheduled => "scheduled",
            ObserveOutcome::AlreadyScheduled => "already_scheduled",
            ObserveOutcome::Unchanged => "unchanged",
            ObserveOutcome::Suspended => "suspended",
        }
    }
}

struct PendingTrigger {
    fingerprint: Fingerprint,
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct TriggerState {
    file_id: Option<String>,
    pending: Option<PendingTrigger>,
    generation: u64,
    last_submitted: Option<Fingerprint>,
    /// Submissions since the last file change. `None` when starting failed outright.
    submitted: HashMap<Fingerprint, Option<SessionId>>,
}

impl TriggerState {
    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
            tracing::debug!(
                fingerprint = %pending.fingerprint,
                "[AutoTrigger] pending trigger superseded"
            );
        }
    }

    fn record_submission(&mut self, fingerprint: Fingerprint, outcome: &Result<SessionId>) {
        self.last_submitted = Some(fingerprint.clone());
        self.submitted.insert(fingerprint, outcome.as_ref().ok().cloned());
    }
}

pub struct AutoTriggerController {
    starter: Arc<dyn SliceStarter>,
    debounce: Duration,
    state: Arc<Mutex<TriggerState>>,
}

impl AutoTriggerController {
    pub fn new(starter: Arc<dyn SliceStarter>, debounce: Duration) -> Self {
        Self {
            starter,
            debounce,
            state: Arc::new(Mutex::new(TriggerState::default())),
        }
    }

    /// Feeds one configuration snapshot.
    pub async fn observe(&self, request: SliceRequest) -> ObserveOutcome {
        let fingerprint = request.fingerprint();
        let mut state = self.state.lock().await;

        if state.file_id.as_deref() != Some(request.file_id.as_str()) {
            if state.file_id.is_some() {
                tracing::debug!(file_id = %request.file_id, "[AutoTrigger] file changed, suspensions cleared");
            }
            state.file_id = Some(request.file_id.clone());
            state.submitted.clear();
            state.last_submitted = None;
        }

        if let Some(pending) = &state.pending
            && pending.fingerprint == fingerprint
        {
            return ObserveOutcome::AlreadyScheduled;
        }
        state.cancel_pending();

        if state.last_submitted.as_ref() == Some(&fingerprint) {
            return ObserveOutcome::Unchanged;
        }
        if let Some(submitted) = state.submitted.get(&fingerprint).cloned()
            && self.is_suspended(submitted.as_ref()).await
        {
            tracing::debug!(fingerprint = %fingerprint, "[AutoTrigger] suspended");
            return ObserveOutcome::Suspended;
        }

        state.generation += 1;
        let generation = state.generation;
        let handle = self.spawn_timer(request, fingerprint.clone(), generation);
        state.pending = Some(PendingTrigger {
            fingerprint,
            generation,
            handle,
        });
        ObserveOutcome::Scheduled
    }

    /// Manual trigger: no debounce, no suspension.
    pub async fn trigger_now(&self, request: SliceRequest) -> Result<SessionId> {
        let fingerprint = request.fingerprint();
        let mut state = self.state.lock().await;
        state.cancel_pending();
        state.file_id = Some(request.file_id.clone());

        let outcome = self.starter.start_or_get(request).await;
        state.record_submission(fingerprint, &outcome);
        outcome
    }

    /// Drops the pending timer and every suspension.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.cancel_pending();
        state.submitted.clear();
        state.last_submitted = None;
    }

    pub async fn pending_fingerprint(&self) -> Option<Fingerprint> {
        let state = self.state.lock().await;
        state.pending.as_ref().map(|p| p.fingerprint.clone())
    }

    pub async fn last_submitted(&self) -> Option<Fingerprint> {
        self.state.lock().await.last_submitted.clone()
    }

    async fn is_suspended(&self, submitted: Option<&SessionId>) -> bool {
        let Some(session_id) = submitted else {
            return true;
        };
        match self.starter.session_state(session_id).await {
            Ok(state) => state.is_active() || state.is_failed(),
            // expired sessions no longer hold anything back
            Err(_) => false,
        }
    }

    fn spawn_timer(
        &self,
        request: SliceRequest,
        fingerprint: Fingerprint,
        generation: u64,
    ) -> JoinHandle<()> {
        let starter = Arc::clone(&self.starter);
        let state = Arc::clone(&self.state);
        let debounce = self.debounce;

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            let mut state = state.lock().await;
            match &state.pending {
                Some(pending) if pending.generation == generation => {}
                _ => return,
            }
            state.pending = None;

            let outcome = starter.start_or_get(request).await;
            match &outcome {
                Ok(session_id) => tracing::info!(
                    session_id = %session_id,
                    fingerprint = %fingerprint,
                    "[AutoTrigger] configuration settled, slice requested"
                ),
                Err(e) => tracing::warn!(
                    fingerprint = %fingerprint,
                    "[AutoTrigger] automatic slice rejected: {}",
                    e
                ),
            }
            state.record_submission(fingerprint, &outcome);
        })
    }
}
