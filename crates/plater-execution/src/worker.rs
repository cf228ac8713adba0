use plater_application::SessionStore;
use plater_core::engine::{EngineNotification, PlateJob, SlicingEngine};
use plater_core::error::{FatalKind, Result, SliceError};
use plater_core::session::{PlateJobQueue, PlateProgress, SessionId, SessionJob};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to the global plate worker.
///
/// Sessions are processed in enqueue order, plates within a session in the
/// order the session manager listed them.
#[derive(Clone)]
pub struct PlateWorkerQueue {
    sender: mpsc::UnboundedSender<SessionJob>,
}

impl PlateWorkerQueue {
    /// Spawns the worker task.
    ///
    /// The task runs until every `PlateWorkerQueue` clone has been dropped.
    pub fn spawn(store: Arc<SessionStore>, engine: Arc<dyn SlicingEngine>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = PlateWorker {
            store,
            engine,
            receiver,
        };
        let handle = tokio::spawn(worker.run());
        (Self { sender }, handle)
    }
}

impl PlateJobQueue for PlateWorkerQueue {
    fn enqueue(&self, job: SessionJob) -> Result<()> {
        let session_id = job.session_id.clone();
        let plates = job.plates.len();
        self.sender.send(job).map_err(|_| {
            SliceError::fatal(FatalKind::EngineUnavailable, "plate worker is not running")
        })?;
        tracing::debug!(session_id = %session_id, plates, "[PlateWorker] session enqueued");
        Ok(())
    }
}

enum PlateOutcome {
    /// Plate reached a terminal per-plate outcome; move on.
    Finished,
    /// Session is over: cancelled, timed out or fatally failed.
    Aborted,
}

struct PlateWorker {
    store: Arc<SessionStore>,
    engine: Arc<dyn SlicingEngine>,
    receiver: mpsc::UnboundedReceiver<SessionJob>,
}

impl PlateWorker {
    async fn run(mut self) {
        tracing::info!(engine = self.engine.name(), "[PlateWorker] started");
        while let Some(job) = self.receiver.recv().await {
            self.process_session(job).await;
        }
        tracing::info!("[PlateWorker] queue closed, stopping");
    }

    async fn process_session(&self, job: SessionJob) {
        let session_id = job.session_id.clone();
        let Some(cancel) = self.store.begin_processing(&session_id).await else {
            tracing::debug!(session_id = %session_id, "[PlateWorker] skipping finished session");
            return;
        };

        tracing::info!(
            session_id = %session_id,
            file_id = %job.file_id,
            plates = job.plates.len(),
            "[PlateWorker] processing session"
        );

        for plate in job.plates {
            if cancel.is_cancelled() {
                tracing::info!(session_id = %session_id, "[PlateWorker] session stopped, skipping remaining plates");
                return;
            }
            if let PlateOutcome::Aborted = self.slice_plate(plate, &cancel).await {
                return;
            }
        }

        if self.store.complete(&session_id).await {
            tracing::info!(session_id = %session_id, "[PlateWorker] session completed");
        }
    }

    async fn slice_plate(&self, job: PlateJob, cancel: &CancellationToken) -> PlateOutcome {
        let session_id = job.session_id.clone();
        let plate_index = job.plate_index;
        tracing::debug!(session_id = %session_id, plate_index, "[PlateWorker] slicing plate");

        let (notifications, mut updates) = mpsc::unbounded_channel();
        let slice = self.engine.slice(job, notifications);
        tokio::pin!(slice);

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        session_id = %session_id,
                        plate_index,
                        "[PlateWorker] abandoning in-flight plate"
                    );
                    return PlateOutcome::Aborted;
                }
                Some(update) = updates.recv() => {
                    self.forward(&session_id, plate_index, update).await;
                }
                result = &mut slice => break result,
            }
        };
        while let Ok(update) = updates.try_recv() {
            self.forward(&session_id, plate_index, update).await;
        }

        match result {
            Ok(estimates) => {
                self.store
                    .record_progress(&session_id, PlateProgress::completed(plate_index, estimates))
                    .await;
                PlateOutcome::Finished
            }
            Err(failure) => {
                self.store
                    .record_progress(&session_id, PlateProgress::failed(plate_index, &failure.message))
                    .await;
                match failure.fatal_kind() {
                    Some(kind) => {
                        tracing::error!(
                            session_id = %session_id,
                            plate_index,
                            "[PlateWorker] fatal engine failure: {}",
                            failure
                        );
                        self.store.fail(&session_id, kind, failure.message).await;
                        PlateOutcome::Aborted
                    }
                    None => {
                        tracing::warn!(
                            session_id = %session_id,
                            plate_index,
                            kind = ?failure.kind,
                            "[PlateWorker] plate failed: {}",
                            failure
                        );
                        PlateOutcome::Finished
                    }
                }
            }
        }
    }

    async fn forward(&self, session_id: &SessionId, plate_index: u32, update: EngineNotification) {
        let progress = PlateProgress::running(
            update.plate_index.unwrap_or(plate_index),
            update.phase,
            update.percent,
            update.message,
        );
        self.store.record_progress(session_id, progress).await;
    }
}
