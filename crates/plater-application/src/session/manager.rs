use super::channel::ProgressSubscription;
use super::store::SessionStore;
use async_trait::async_trait;
use plater_core::config::PlaterConfig;
use plater_core::engine::PlateJob;
use plater_core::error::{FatalKind, Result, SliceError};
use plater_core::fingerprint::Fingerprint;
use plater_core::plate::{ModelRecord, PlateInfo, PlateRegistry};
use plater_core::request::SliceRequest;
use plater_core::session::{PlateJobQueue, SessionId, SessionJob, SessionState, SliceSession};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Timing knobs for the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    pub inactivity_timeout: Duration,
    pub retention: Duration,
    pub watchdog_interval: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&PlaterConfig::default())
    }
}

impl From<&PlaterConfig> for ManagerSettings {
    fn from(config: &PlaterConfig) -> Self {
        Self {
            inactivity_timeout: config.inactivity_timeout(),
            retention: config.retention(),
            watchdog_interval: config.watchdog_interval(),
        }
    }
}

/// Result of one watchdog pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: Vec<SessionId>,
    pub purged: Vec<SessionId>,
}

/// Entry point for starting and observing slice sessions.
///
/// `SliceSessionManager` is responsible for:
/// - Resolving a request to a session, at most one active session per fingerprint
/// - Validating requests against the plate registry
/// - Handing plates to the worker queue
/// - Cancellation, inactivity timeouts and retention of finished sessions
pub struct SliceSessionManager {
    store: Arc<SessionStore>,
    registry: Arc<dyn PlateRegistry>,
    queue: Arc<dyn PlateJobQueue>,
    /// Latest session per fingerprint. Held for the whole of `start_or_get`.
    fingerprints: Mutex<HashMap<Fingerprint, SessionId>>,
    settings: ManagerSettings,
}

impl SliceSessionManager {
    /// Creates a new `SliceSessionManager`.
    ///
    /// # Arguments
    ///
    /// * `store` - Session store shared with the plate worker
    /// * `registry` - Plate registry used to validate requests
    /// * `queue` - Global plate work queue
    /// * `settings` - Timeout and retention settings
    pub fn new(
        store: Arc<SessionStore>,
        registry: Arc<dyn PlateRegistry>,
        queue: Arc<dyn PlateJobQueue>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            store,
            registry,
            queue,
            fingerprints: Mutex::new(HashMap::new()),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Returns the active session for this configuration, or starts a new one.
    ///
    /// Calls with equal fingerprints serialize on the fingerprint index, so
    /// concurrent identical requests never create two sessions.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the file is unknown, the selected plate does not
    ///   exist or the model has no plates
    /// - `FatalSession` if the worker queue refused the job
    pub async fn start_or_get(&self, request: SliceRequest) -> Result<SessionId> {
        let fingerprint = request.fingerprint();
        let mut index = self.fingerprints.lock().await;

        if let Some(existing) = index.get(&fingerprint)
            && let Some(state) = self.store.state_of(existing).await
            && state.is_active()
        {
            tracing::debug!(
                session_id = %existing,
                fingerprint = %fingerprint,
                "[SessionManager] reusing active session"
            );
            return Ok(existing.clone());
        }

        let model = self
            .registry
            .find_model(&request.file_id)
            .await?
            .ok_or_else(|| {
                SliceError::invalid_request(format!("unknown file '{}'", request.file_id))
            })?;
        let plates = select_plates(&model, request.selected_plate)?;

        let session = SliceSession::new(
            request.clone(),
            plates.iter().map(|p| p.plate_index).collect(),
        );
        let session_id = session.session_id.clone();
        let job = SessionJob {
            session_id: session_id.clone(),
            file_id: model.file_id.clone(),
            plates: plates
                .iter()
                .map(|plate| PlateJob {
                    session_id: session_id.clone(),
                    file_id: model.file_id.clone(),
                    model_path: model.path.clone(),
                    plate_index: plate.plate_index,
                    object_count: plate.object_count,
                    mappings: request.mappings_for(&plate.filament_indices),
                    build_plate_type: request.build_plate_type.clone(),
                })
                .collect(),
        };

        self.store.insert(session).await;
        index.insert(fingerprint.clone(), session_id.clone());
        self.store.mark_running(&session_id).await;

        if let Err(e) = self.queue.enqueue(job) {
            tracing::error!(session_id = %session_id, "[SessionManager] enqueue failed: {}", e);
            self.store
                .fail(&session_id, FatalKind::EngineUnavailable, e.to_string())
                .await;
            return Err(e);
        }

        tracing::info!(
            session_id = %session_id,
            fingerprint = %fingerprint,
            file_id = %request.file_id,
            plates = plates.len(),
            "[SessionManager] session started"
        );
        Ok(session_id)
    }

    /// Read-only snapshot of a session.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown or expired ids.
    pub async fn get_state(&self, session_id: &SessionId) -> Result<SliceSession> {
        self.store.get(session_id).await
    }

    /// Best-effort cancellation.
    ///
    /// Marks the session cancelled and stops further plates. An engine call
    /// already in flight is abandoned but may keep running in the engine.
    /// Cancelling a finished session is a no-op.
    pub async fn cancel(&self, session_id: &SessionId) -> Result<()> {
        if self.store.cancel(session_id).await? {
            tracing::info!(session_id = %session_id, "[SessionManager] session cancelled");
        }
        Ok(())
    }

    /// Attaches the single progress consumer for a session.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `Conflict` if a consumer is already attached.
    pub async fn attach(&self, session_id: &SessionId) -> Result<ProgressSubscription> {
        self.store.attach(session_id).await
    }

    /// One watchdog pass: time out silent sessions, drop expired ones.
    pub async fn sweep(&self) -> SweepReport {
        let timed_out = self.store.expire_idle(self.settings.inactivity_timeout).await;
        for session_id in &timed_out {
            tracing::warn!(session_id = %session_id, "[Watchdog] session timed out");
        }

        let purged = self.store.purge_finished(self.settings.retention).await;
        if !purged.is_empty() {
            let mut index = self.fingerprints.lock().await;
            for entry in &purged {
                if index.get(&entry.fingerprint) == Some(&entry.session_id) {
                    index.remove(&entry.fingerprint);
                }
            }
            tracing::debug!(count = purged.len(), "[Watchdog] purged finished sessions");
        }

        SweepReport {
            timed_out,
            purged: purged.into_iter().map(|p| p.session_id).collect(),
        }
    }

    /// Starts the background watchdog at the configured interval.
    pub fn start_watchdog(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = self.settings.watchdog_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            tracing::info!("[Watchdog] started ({}s interval)", period.as_secs());
            loop {
                ticker.tick().await;
                manager.sweep().await;
            }
        })
    }
}

/// Picks the plates to slice: the selected one, or all in ascending order.
fn select_plates(model: &ModelRecord, selected: Option<u32>) -> Result<Vec<PlateInfo>> {
    let plates: Vec<PlateInfo> = match selected {
        Some(index) => {
            let plate = model.plate(index).ok_or_else(|| {
                SliceError::invalid_request(format!(
                    "plate {} does not exist in '{}'",
                    index, model.file_id
                ))
            })?;
            vec![plate.clone()]
        }
        None => model
            .plate_indices()
            .into_iter()
            .filter_map(|index| model.plate(index).cloned())
            .collect(),
    };

    if plates.is_empty() {
        return Err(SliceError::invalid_request(format!(
            "'{}' has no plates to slice",
            model.file_id
        )));
    }
    Ok(plates)
}

/// What the auto-trigger controller needs from a session manager.
#[async_trait]
pub trait SliceStarter: Send + Sync {
    async fn start_or_get(&self, request: SliceRequest) -> Result<SessionId>;

    async fn session_state(&self, session_id: &SessionId) -> Result<SessionState>;
}

#[async_trait]
impl SliceStarter for SliceSessionManager {
    async fn start_or_get(&self, request: SliceRequest) -> Result<SessionId> {
        SliceSessionManager::start_or_get(self, request).await
    }

    async fn session_state(&self, session_id: &SessionId) -> Result<SessionState> {
        Ok(self.get_state(session_id).await?.state)
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
