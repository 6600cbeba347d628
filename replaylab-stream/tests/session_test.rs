//! End-to-end session tests on a paused tokio clock.

use chrono::NaiveDate;
use replaylab_core::data::{BarProvider, BarRequest, CsvBarProvider, SyntheticBarProvider};
use replaylab_core::engine::Executor;
use replaylab_core::strategies::SmaCrossover;
use replaylab_core::strategy::Params;
use replaylab_core::{EngineConfig, IncrementBatch, ReplayConfig};
use replaylab_stream::session::{BOUNDARY_DISCONNECTED, EXECUTION_STALLED, TASK_UNAVAILABLE};
use replaylab_stream::{
    BoundaryError, CompletedPayload, EventHub, ExecutionBoundary, JsonFileSnapshotStore, LocalBoundary,
    MemorySnapshotStore, Orchestrator, ReferenceGenerator, RunRequest, RunSpec, SnapshotStore, StreamSession,
    TaskEvent, TaskId, TaskPhase, TaskSnapshot,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Duration;

// ── Helpers ──────────────────────────────────────────────────────────

const SEED: u64 = 7;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn spec(signal: &str) -> RunSpec {
    RunSpec::new("SYN", date(2023, 1, 1), date(2023, 12, 31), signal)
}

fn provider() -> Arc<dyn BarProvider> {
    Arc::new(SyntheticBarProvider::new(SEED))
}

fn session(boundary: Arc<dyn ExecutionBoundary>, store: Arc<dyn SnapshotStore>) -> StreamSession {
    StreamSession::new(
        Orchestrator::new(Duration::from_millis(100)),
        provider(),
        Arc::new(ReferenceGenerator),
        boundary,
        store,
    )
}

fn local_session(store: Arc<dyn SnapshotStore>) -> StreamSession {
    StreamSession::local(provider(), store, &ReplayConfig::default())
}

/// Replays a fixed script of events per task, then hangs up.
struct ScriptedBoundary {
    script: Box<dyn Fn(&TaskId) -> Vec<TaskEvent> + Send + Sync>,
    pending: Mutex<HashMap<TaskId, mpsc::UnboundedReceiver<TaskEvent>>>,
}

impl ScriptedBoundary {
    fn new(script: impl Fn(&TaskId) -> Vec<TaskEvent> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl ExecutionBoundary for ScriptedBoundary {
    fn start(&self, request: RunRequest) -> Result<(), BoundaryError> {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in (self.script)(&request.task_id) {
            tx.send(event).unwrap();
        }
        self.pending.lock().unwrap().insert(request.task_id, rx);
        Ok(())
    }

    fn subscribe(&self, task_id: &TaskId) -> Option<mpsc::UnboundedReceiver<TaskEvent>> {
        self.pending.lock().unwrap().remove(task_id)
    }

    fn cancel(&self, _task_id: &TaskId) {}

    fn release(&self, _task_id: &TaskId) {}
}

/// Announces `running` and then never says anything again.
#[derive(Default)]
struct SilentBoundary {
    senders: Mutex<Vec<mpsc::UnboundedSender<TaskEvent>>>,
    pending: Mutex<HashMap<TaskId, mpsc::UnboundedReceiver<TaskEvent>>>,
    cancelled: Mutex<Vec<TaskId>>,
}

impl ExecutionBoundary for SilentBoundary {
    fn start(&self, request: RunRequest) -> Result<(), BoundaryError> {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(TaskEvent::phase(&request.task_id, TaskPhase::Running)).unwrap();
        self.senders.lock().unwrap().push(tx);
        self.pending.lock().unwrap().insert(request.task_id, rx);
        Ok(())
    }

    fn subscribe(&self, task_id: &TaskId) -> Option<mpsc::UnboundedReceiver<TaskEvent>> {
        self.pending.lock().unwrap().remove(task_id)
    }

    fn cancel(&self, task_id: &TaskId) {
        self.cancelled.lock().unwrap().push(task_id.clone());
    }

    fn release(&self, _task_id: &TaskId) {}
}

fn direct_result() -> replaylab_core::ExecutorResult {
    let request = BarRequest::daily("SYN", date(2023, 1, 1), date(2023, 12, 31));
    let bars = SyntheticBarProvider::new(SEED).fetch(&request).unwrap().bars;
    let mut exec = Executor::new(Box::new(SmaCrossover::new()), Params::new(), EngineConfig::default());
    exec.run(&bars, "SYN")
}

// ── Happy path ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn local_run_matches_direct_replay() {
    let store = Arc::new(MemorySnapshotStore::new());
    let mut session = local_session(store.clone());

    let snapshot = session.run(spec("sma_cross")).await;
    assert_eq!(snapshot.phase, TaskPhase::Completed, "error: {:?}", snapshot.error);
    assert_eq!(snapshot.progress, 100.0);

    let streamed = session.orchestrator().final_result().unwrap();
    let direct = direct_result();
    assert_eq!(streamed.equity_curve.len(), direct.equity_curve.len());
    assert_eq!(streamed.fingerprint().unwrap(), direct.fingerprint().unwrap());

    let stored = store.load().unwrap().unwrap();
    assert_eq!(stored.phase, TaskPhase::Completed);
    assert_eq!(stored.task_id, snapshot.task_id);
}

#[tokio::test(start_paused = true)]
async fn cancel_before_run_does_not_leak_into_it() {
    let mut session = local_session(Arc::new(MemorySnapshotStore::new()));
    session.cancel_handle().cancel();
    let snapshot = session.run(spec("buy_and_hold")).await;
    assert_eq!(snapshot.phase, TaskPhase::Completed);
}

// ── Failures ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn invalid_spec_errors_without_a_task() {
    let store = Arc::new(MemorySnapshotStore::new());
    let mut session = local_session(store.clone());
    let mut bad = spec("sma_cross");
    bad.selection.signals.clear();

    let snapshot = session.run(bad).await;
    assert_eq!(snapshot.phase, TaskPhase::Error);
    assert_eq!(snapshot.task_id, None);
    assert_eq!(snapshot.error.as_deref(), Some("no signals or factors selected"));
    assert_eq!(store.load().unwrap().unwrap().phase, TaskPhase::Error);
}

#[tokio::test(start_paused = true)]
async fn missing_data_surfaces_provider_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = StreamSession::new(
        Orchestrator::new(Duration::from_millis(100)),
        Arc::new(CsvBarProvider::new(dir.path())),
        Arc::new(ReferenceGenerator),
        Arc::new(LocalBoundary::new(EventHub::new(), EngineConfig::default(), 25)),
        Arc::new(MemorySnapshotStore::new()),
    );
    let snapshot = session.run(spec("sma_cross")).await;
    assert_eq!(snapshot.phase, TaskPhase::Error);
    assert!(snapshot.task_id.is_some());
    assert!(snapshot.error.unwrap().contains("not found"));
}

#[tokio::test(start_paused = true)]
async fn unknown_signal_surfaces_generation_error() {
    let mut session = local_session(Arc::new(MemorySnapshotStore::new()));
    let snapshot = session.run(spec("martingale")).await;
    assert_eq!(snapshot.phase, TaskPhase::Error);
    assert_eq!(snapshot.error.as_deref(), Some("unknown strategy component: martingale"));
}

#[tokio::test(start_paused = true)]
async fn completion_without_metrics_is_an_error() {
    let boundary = Arc::new(ScriptedBoundary::new(|id| {
        vec![
            TaskEvent::phase(id, TaskPhase::Running),
            TaskEvent::increment(id, IncrementBatch::default()),
            TaskEvent::completed(id, CompletedPayload::default()),
        ]
    }));
    let mut session = session(boundary, Arc::new(MemorySnapshotStore::new()));
    let snapshot = session.run(spec("sma_cross")).await;
    assert_eq!(snapshot.phase, TaskPhase::Error);
    assert_eq!(snapshot.error.as_deref(), Some("completed but no result"));
}

#[tokio::test(start_paused = true)]
async fn hang_up_without_terminal_event_is_an_error() {
    let boundary = Arc::new(ScriptedBoundary::new(|id| {
        vec![TaskEvent::phase(id, TaskPhase::Running), TaskEvent::progress(id, 30.0)]
    }));
    let mut session = session(boundary, Arc::new(MemorySnapshotStore::new()));
    let snapshot = session.run(spec("sma_cross")).await;
    assert_eq!(snapshot.phase, TaskPhase::Error);
    assert_eq!(snapshot.error.as_deref(), Some(BOUNDARY_DISCONNECTED));
}

#[tokio::test(start_paused = true)]
async fn events_from_other_tasks_are_ignored() {
    let direct = direct_result();
    let payload: CompletedPayload = direct.clone().into();
    let boundary = Arc::new(ScriptedBoundary::new(move |id| {
        let ghost = TaskId::new("ghost");
        vec![
            TaskEvent::phase(id, TaskPhase::Running),
            TaskEvent::failed(&ghost, "ghost failure"),
            TaskEvent::progress(&ghost, 99.0),
            TaskEvent::progress(id, 50.0),
            TaskEvent::completed(id, payload.clone()),
        ]
    }));
    let mut session = session(boundary, Arc::new(MemorySnapshotStore::new()));
    let snapshot = session.run(spec("sma_cross")).await;
    assert_eq!(snapshot.phase, TaskPhase::Completed);
    assert_eq!(snapshot.error, None);
    assert_eq!(session.orchestrator().final_result(), Some(direct));
}

// ── Liveness and cancellation ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn silent_boundary_trips_stall_timeout() {
    let boundary = Arc::new(SilentBoundary::default());
    let mut session = session(boundary.clone(), Arc::new(MemorySnapshotStore::new()))
        .with_stall_timeout(Some(Duration::from_secs(5)));

    let snapshot = session.run(spec("sma_cross")).await;
    assert_eq!(snapshot.phase, TaskPhase::Error);
    assert_eq!(snapshot.error.as_deref(), Some(EXECUTION_STALLED));
    assert_eq!(boundary.cancelled.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_handle_stops_a_running_task() {
    let boundary = Arc::new(SilentBoundary::default());
    let mut session = session(boundary.clone(), Arc::new(MemorySnapshotStore::new()));
    let handle = session.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
    });

    let snapshot = session.run(spec("sma_cross")).await;
    assert_eq!(snapshot.phase, TaskPhase::Cancelled);
    let cancelled = boundary.cancelled.lock().unwrap().clone();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(Some(&cancelled[0]), snapshot.task_id.as_ref());
}

// ── Recovery ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn recover_without_snapshot_is_none() {
    let mut session = local_session(Arc::new(MemorySnapshotStore::new()));
    assert!(session.recover().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn recover_loads_finished_task_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("task.json");

    let mut first = local_session(Arc::new(JsonFileSnapshotStore::new(&path)));
    let done = first.run(spec("rsi_reversion")).await;
    assert_eq!(done.phase, TaskPhase::Completed);

    let mut second = local_session(Arc::new(JsonFileSnapshotStore::new(&path)));
    let recovered = second.recover().await.unwrap().unwrap();
    assert_eq!(recovered.phase, TaskPhase::Completed);
    assert_eq!(recovered.task_id, done.task_id);
    assert_eq!(recovered.result, done.result);
}

#[tokio::test(start_paused = true)]
async fn recover_resubscribes_to_in_flight_task() {
    let hub = EventHub::new();
    let task = TaskId::new("task-in-flight");
    hub.open(&task);
    hub.publish(TaskEvent::phase(&task, TaskPhase::Running));

    // the previous session saw `running` and then went away
    let store = Arc::new(MemorySnapshotStore::new());
    let mut previous = Orchestrator::new(Duration::from_millis(100));
    previous.begin(task.clone());
    previous.handle(TaskEvent::phase(&task, TaskPhase::Running), tokio::time::Instant::now());
    store.save(&previous.snapshot()).unwrap();

    // the replay kept going
    let direct = direct_result();
    let half = direct.equity_curve.len() / 2;
    hub.publish(TaskEvent::increment(
        &task,
        IncrementBatch {
            new_equity_points: direct.equity_curve[..half].to_vec(),
            processed_bars: Some(half),
            ..IncrementBatch::default()
        },
    ));
    hub.publish(TaskEvent::completed(&task, direct.clone().into()));

    let boundary = Arc::new(LocalBoundary::new(hub.clone(), EngineConfig::default(), 25));
    let mut session = session(boundary, store);
    let recovered = session.recover().await.unwrap().unwrap();
    assert_eq!(recovered.phase, TaskPhase::Completed);
    assert_eq!(session.orchestrator().final_result(), Some(direct));
    assert!(!hub.is_open(&task));
}

#[tokio::test(start_paused = true)]
async fn recover_unknown_task_without_inputs_fails() {
    let store = Arc::new(MemorySnapshotStore::new());
    let mut previous = Orchestrator::new(Duration::from_millis(100));
    let task = TaskId::new("task-gone");
    previous.begin(task.clone());
    store.save(&previous.snapshot()).unwrap();

    let mut session = local_session(store);
    let recovered = session.recover().await.unwrap().unwrap();
    assert_eq!(recovered.phase, TaskPhase::Error);
    assert_eq!(recovered.error.as_deref(), Some(TASK_UNAVAILABLE));
}

#[tokio::test(start_paused = true)]
async fn recover_replays_in_flight_task_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("task.json");

    // the previous process was part way through the replay when it died
    let task = TaskId::new("task-interrupted");
    let mut previous = Orchestrator::new(Duration::from_millis(100));
    previous.begin(task.clone());
    let now = tokio::time::Instant::now();
    previous.handle(TaskEvent::phase(&task, TaskPhase::Running), now);
    previous.handle(TaskEvent::progress(&task, 40.0), now);
    let snapshot = TaskSnapshot {
        run: Some(spec("sma_cross")),
        ..previous.snapshot()
    };
    JsonFileSnapshotStore::new(&path).save(&snapshot).unwrap();

    let store = Arc::new(JsonFileSnapshotStore::new(&path));
    let mut session = local_session(store.clone());
    let recovered = session.recover().await.unwrap().unwrap();
    assert_eq!(recovered.phase, TaskPhase::Completed, "error: {:?}", recovered.error);
    assert_eq!(recovered.task_id, Some(task));
    assert_eq!(session.orchestrator().final_result(), Some(direct_result()));

    let stored = store.load().unwrap().unwrap();
    assert_eq!(stored.phase, TaskPhase::Completed);
    assert_eq!(stored.run, Some(spec("sma_cross")));
}
