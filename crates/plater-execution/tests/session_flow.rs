//! End-to-end session flow: manager, store, worker and a scripted engine.

use async_trait::async_trait;
use plater_application::{ManagerSettings, ProgressSubscription, SessionStore, SliceSessionManager};
use plater_core::aggregator::{AggregateStatus, ProgressAggregator};
use plater_core::engine::{
    EngineFailure, EngineFailureKind, EngineNotification, NotificationSink, PlateJob,
    SlicingEngine,
};
use plater_core::error::FatalKind;
use plater_core::plate::{Estimates, ModelRecord, PlateInfo, PlateRegistry};
use plater_core::request::SliceRequest;
use plater_core::session::{PlateJobQueue, ProgressEvent, SessionState};
use plater_execution::PlateWorkerQueue;
use plater_infrastructure::InMemoryPlateRegistry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Step {
    Succeed(Estimates),
    Fail(EngineFailure),
    /// Sends one notification, then never resolves.
    Hang,
    /// Reports progress on another plate index, then succeeds.
    Discover(u32),
}

struct ScriptedEngine {
    script: HashMap<u32, Step>,
    calls: Mutex<Vec<u32>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedEngine {
    fn new(script: impl IntoIterator<Item = (u32, Step)>) -> Arc<Self> {
        Arc::new(Self {
            script: script.into_iter().collect(),
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SlicingEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn slice(
        &self,
        job: PlateJob,
        notifications: NotificationSink,
    ) -> Result<Estimates, EngineFailure> {
        self.calls.lock().unwrap().push(job.plate_index);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let step = self
            .script
            .get(&job.plate_index)
            .cloned()
            .unwrap_or(Step::Succeed(Estimates::new(Some(60), Some(1.0))));

        let _ = notifications.send(EngineNotification::new("slicing", 25.0, "layers"));
        tokio::task::yield_now().await;
        let _ = notifications.send(EngineNotification::new("gcode", 75.0, ""));

        let outcome = match step {
            Step::Succeed(estimates) => Ok(estimates),
            Step::Fail(failure) => Err(failure),
            Step::Hang => std::future::pending().await,
            Step::Discover(other) => {
                let _ = notifications
                    .send(EngineNotification::new("slicing", 40.0, "").for_plate(other));
                Ok(Estimates::new(Some(60), Some(1.0)))
            }
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

struct Harness {
    manager: Arc<SliceSessionManager>,
    registry: Arc<InMemoryPlateRegistry>,
    engine: Arc<ScriptedEngine>,
}

fn harness(engine: Arc<ScriptedEngine>) -> Harness {
    let registry = Arc::new(InMemoryPlateRegistry::with_models([
        ModelRecord::new(
            "f1",
            vec![PlateInfo::new(1, 2), PlateInfo::new(2, 1), PlateInfo::new(3, 5)],
        ),
        ModelRecord::new("f2", vec![PlateInfo::new(1, 1)]),
    ]));
    let dyn_registry: Arc<dyn PlateRegistry> = registry.clone();
    let store = Arc::new(SessionStore::new(Arc::clone(&dyn_registry), 256));
    let (queue, _worker) =
        PlateWorkerQueue::spawn(Arc::clone(&store), engine.clone() as Arc<dyn SlicingEngine>);
    let manager = SliceSessionManager::new(
        store,
        dyn_registry,
        Arc::new(queue) as Arc<dyn PlateJobQueue>,
        ManagerSettings {
            inactivity_timeout: Duration::from_secs(30),
            retention: Duration::from_secs(600),
            watchdog_interval: Duration::from_secs(1),
        },
    );
    Harness {
        manager: Arc::new(manager),
        registry,
        engine,
    }
}

fn request(file_id: &str) -> SliceRequest {
    SliceRequest::new(file_id, "cool_plate")
}

async fn drain(mut subscription: ProgressSubscription) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = subscription.next().await {
        events.push(event);
    }
    events
}

fn terminal_count(events: &[ProgressEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}

#[tokio::test]
async fn test_recoverable_plate_failure_still_completes() {
    let engine = ScriptedEngine::new([
        (1, Step::Succeed(Estimates::new(Some(600), Some(12.0)))),
        (
            2,
            Step::Fail(EngineFailure::invalid_parameters("layer height too large")),
        ),
        (3, Step::Succeed(Estimates::new(Some(900), Some(20.5)))),
    ]);
    let h = harness(engine);

    let session_id = h.manager.start_or_get(request("f1")).await.unwrap();
    let events = drain(h.manager.attach(&session_id).await.unwrap()).await;

    assert_eq!(events.first().map(|e| e.name()), Some("start"));
    assert_eq!(events.last().map(|e| e.name()), Some("complete"));
    assert_eq!(terminal_count(&events), 1);
    assert_eq!(h.engine.calls(), vec![1, 2, 3]);

    let mut aggregator = ProgressAggregator::new([1, 2, 3]);
    for event in &events {
        aggregator.apply(event);
    }
    assert_eq!(
        aggregator.status(),
        &AggregateStatus::Completed {
            failed_plates: vec![2]
        }
    );
    assert_eq!(aggregator.overall_percent(), 100.0);

    let session = h.manager.get_state(&session_id).await.unwrap();
    assert_eq!(session.state, SessionState::Completed);
    assert_eq!(session.plate_progress[&2].phase, "error");

    let model = h.registry.find_model("f1").await.unwrap().unwrap();
    assert_eq!(model.plate(1).unwrap().prediction_seconds, Some(600));
    assert_eq!(model.plate(3).unwrap().weight_grams, Some(20.5));
    assert_eq!(
        model.plate(2).unwrap().slice_error.as_deref(),
        Some("layer height too large")
    );
    assert_eq!(model.plate(2).unwrap().prediction_seconds, None);
}

#[tokio::test]
async fn test_discovered_plate_ends_error_flagged() {
    let engine = ScriptedEngine::new([(1, Step::Discover(7))]);
    let h = harness(engine);

    let session_id = h
        .manager
        .start_or_get(request("f2").with_selected_plate(Some(1)))
        .await
        .unwrap();
    let events = drain(h.manager.attach(&session_id).await.unwrap()).await;

    assert_eq!(events.last().map(|e| e.name()), Some("complete"));
    assert_eq!(terminal_count(&events), 1);
    let flagged = events
        .iter()
        .filter_map(|e| e.progress())
        .find(|p| p.plate_index == 7 && p.is_complete)
        .expect("terminal progress for plate 7");
    assert!(flagged.is_error());

    let session = h.manager.get_state(&session_id).await.unwrap();
    assert_eq!(session.state, SessionState::Completed);
    assert_eq!(session.plates, vec![1]);
    for progress in session.plate_progress.values() {
        assert!(progress.is_complete);
        assert!(progress.is_error() || progress.plate_index == 1);
    }

    let mut aggregator = ProgressAggregator::new([1]);
    for event in &events {
        aggregator.apply(event);
    }
    assert_eq!(
        aggregator.known_plates().iter().copied().collect::<Vec<_>>(),
        vec![1, 7]
    );
    assert_eq!(
        aggregator.status(),
        &AggregateStatus::Completed {
            failed_plates: vec![7]
        }
    );

    let model = h.registry.find_model("f2").await.unwrap().unwrap();
    assert_eq!(model.plate_indices(), vec![1, 7]);
    assert!(model.plate(7).unwrap().slice_error.is_some());
    assert_eq!(model.plate(1).unwrap().prediction_seconds, Some(60));
}

#[tokio::test]
async fn test_fatal_failure_aborts_remaining_plates() {
    let engine = ScriptedEngine::new([(
        2,
        Step::Fail(EngineFailure::file_corrupt("not a zip archive")),
    )]);
    let h = harness(engine);

    let session_id = h.manager.start_or_get(request("f1")).await.unwrap();
    let events = drain(h.manager.attach(&session_id).await.unwrap()).await;

    assert_eq!(terminal_count(&events), 1);
    match events.last() {
        Some(ProgressEvent::Error { kind, message }) => {
            assert_eq!(*kind, FatalKind::FileCorrupt);
            assert_eq!(message, "not a zip archive");
        }
        other => panic!("expected error event, got {:?}", other),
    }
    assert_eq!(h.engine.calls(), vec![1, 2]);

    let session = h.manager.get_state(&session_id).await.unwrap();
    assert!(matches!(
        session.state,
        SessionState::Failed {
            kind: FatalKind::FileCorrupt,
            ..
        }
    ));
}

#[tokio::test]
async fn test_unsupported_material_is_recoverable() {
    let engine = ScriptedEngine::new([(
        1,
        Step::Fail(EngineFailure::new(
            EngineFailureKind::UnsupportedMaterial,
            "TPU on plate 1",
        )),
    )]);
    let h = harness(engine);

    let session_id = h.manager.start_or_get(request("f2")).await.unwrap();
    let events = drain(h.manager.attach(&session_id).await.unwrap()).await;

    assert_eq!(events.last().map(|e| e.name()), Some("complete"));
    let session = h.manager.get_state(&session_id).await.unwrap();
    assert_eq!(session.failed_plates(), vec![1]);
}

#[tokio::test]
async fn test_engine_runs_one_plate_at_a_time_across_sessions() {
    let engine = ScriptedEngine::new([]);
    let h = harness(engine);

    let first = h.manager.start_or_get(request("f1")).await.unwrap();
    let second = h.manager.start_or_get(request("f2")).await.unwrap();
    let first_events = drain(h.manager.attach(&first).await.unwrap()).await;
    let second_events = drain(h.manager.attach(&second).await.unwrap()).await;

    assert_eq!(first_events.last().map(|e| e.name()), Some("complete"));
    assert_eq!(second_events.last().map(|e| e.name()), Some("complete"));
    assert_eq!(h.engine.calls(), vec![1, 2, 3, 1]);
    assert_eq!(h.engine.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_progress_never_follows_terminal() {
    let engine = ScriptedEngine::new([]);
    let h = harness(engine);

    let session_id = h.manager.start_or_get(request("f1")).await.unwrap();
    let events = drain(h.manager.attach(&session_id).await.unwrap()).await;

    let terminal_at = events.iter().position(|e| e.is_terminal()).unwrap();
    assert_eq!(terminal_at, events.len() - 1);

    // progress per plate: 2 notifications plus the completing snapshot
    let progress = events.iter().filter(|e| e.progress().is_some()).count();
    assert_eq!(progress, 9);
}

#[tokio::test]
async fn test_cancel_abandons_in_flight_plate() {
    let engine = ScriptedEngine::new([(1, Step::Hang)]);
    let h = harness(engine);

    let session_id = h.manager.start_or_get(request("f1")).await.unwrap();
    let mut subscription = h.manager.attach(&session_id).await.unwrap();

    // wait for the engine to report on plate 1
    loop {
        match subscription.next().await {
            Some(ProgressEvent::Progress { progress }) if progress.plate_index == 1 => break,
            Some(_) => continue,
            None => panic!("stream ended before plate 1 started"),
        }
    }
    h.manager.cancel(&session_id).await.unwrap();

    let rest = drain(subscription).await;
    assert!(matches!(
        rest.last(),
        Some(ProgressEvent::Error {
            kind: FatalKind::Cancelled,
            ..
        })
    ));

    // the worker moved on; a new session for another file still runs
    let next = h.manager.start_or_get(request("f2")).await.unwrap();
    let events = drain(h.manager.attach(&next).await.unwrap()).await;
    assert_eq!(events.last().map(|e| e.name()), Some("complete"));
    assert_eq!(h.engine.calls(), vec![1, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_silent_engine_times_out() {
    let engine = ScriptedEngine::new([(1, Step::Hang)]);
    let h = harness(engine);
    let watchdog = h.manager.start_watchdog();

    let session_id = h.manager.start_or_get(request("f2")).await.unwrap();
    let events = drain(h.manager.attach(&session_id).await.unwrap()).await;

    match events.last() {
        Some(ProgressEvent::Error { kind, .. }) => assert_eq!(*kind, FatalKind::InactivityTimeout),
        other => panic!("expected timeout, got {:?}", other),
    }
    let session = h.manager.get_state(&session_id).await.unwrap();
    assert!(session.state.is_failed());
    watchdog.abort();
}

#[tokio::test]
async fn test_identical_request_while_running_is_not_requeued() {
    let engine = ScriptedEngine::new([(3, Step::Hang)]);
    let h = harness(engine);

    let first = h.manager.start_or_get(request("f1")).await.unwrap();
    let second = h.manager.start_or_get(request("f1")).await.unwrap();
    assert_eq!(first, second);

    h.manager.cancel(&first).await.unwrap();
    let events = drain(h.manager.attach(&first).await.unwrap()).await;
    assert_eq!(terminal_count(&events), 1);
}
