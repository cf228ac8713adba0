use plater_application::{AutoTriggerController, ManagerSettings, SessionStore, SliceSessionManager, SliceStarter};
use plater_core::config::PlaterConfig;
use plater_core::plate::PlateRegistry;
use plater_execution::PlateWorkerQueue;
use plater_interaction::build_engine;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Wired-up slicing subsystem: store, worker, manager, watchdog and auto-trigger.
pub struct SliceRuntime {
    pub manager: Arc<SliceSessionManager>,
    pub auto_trigger: Arc<AutoTriggerController>,
    worker: JoinHandle<()>,
    watchdog: JoinHandle<()>,
}

impl SliceRuntime {
    /// Must be called from within a tokio runtime.
    pub fn start(config: &PlaterConfig, registry: Arc<dyn PlateRegistry>) -> Self {
        let engine = build_engine(&config.engine);
        tracing::info!(engine = engine.name(), "[Runtime] starting slicing subsystem");

        let store = Arc::new(SessionStore::new(Arc::clone(&registry), config.channel_buffer));
        let (queue, worker) = PlateWorkerQueue::spawn(Arc::clone(&store), engine);
        let manager = Arc::new(SliceSessionManager::new(
            store,
            registry,
            Arc::new(queue),
            ManagerSettings::from(config),
        ));
        let watchdog = manager.start_watchdog();
        let auto_trigger = Arc::new(AutoTriggerController::new(
            Arc::clone(&manager) as Arc<dyn SliceStarter>,
            config.debounce(),
        ));

        Self {
            manager,
            auto_trigger,
            worker,
            watchdog,
        }
    }

    /// Stops background tasks. In-flight engine calls are dropped.
    pub fn shutdown(self) {
        self.watchdog.abort();
        self.worker.abort();
        tracing::info!("[Runtime] slicing subsystem stopped");
    }
}
