//! Execution boundary: where a run request becomes a stream of task events.
//!
//! `LocalBoundary` replays in-process on a named worker thread and publishes
//! into an [`EventHub`]. For every task it emits `running`, progress and
//! increments every `increment_every` bars, then exactly one terminal event.
//! A cancelled replay stops at the next bar and emits nothing further.

use crate::collaborators::StrategyArtifact;
use crate::event::TaskEvent;
use crate::hub::EventHub;
use crate::task::{TaskId, TaskPhase};
use chrono::NaiveDate;
use replaylab_core::domain::Bar;
use replaylab_core::ledger::SizingPolicy;
use replaylab_core::{EngineConfig, Executor, ExecutorResult};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum BoundaryError {
    #[error("task {0} is already running")]
    AlreadyRunning(TaskId),

    #[error("run request rejected: {0}")]
    Rejected(String),

    #[error("failed to spawn replay worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Everything needed to run one replay.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub task_id: TaskId,
    pub artifact: StrategyArtifact,
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: f64,
    pub sizing: SizingPolicy,
    pub bars: Vec<Bar>,
}

pub trait ExecutionBoundary: Send + Sync {
    /// Accept a request. Events become available through `subscribe` as soon
    /// as this returns `Ok`.
    fn start(&self, request: RunRequest) -> Result<(), BoundaryError>;

    /// Event stream for a task, from its first event. `None` for a task this
    /// boundary does not know.
    fn subscribe(&self, task_id: &TaskId) -> Option<UnboundedReceiver<TaskEvent>>;

    /// Stop a task and drop its listeners.
    fn cancel(&self, task_id: &TaskId);

    /// Forget a task once the caller has consumed its terminal state.
    fn release(&self, task_id: &TaskId);
}

type CancelFlags = Arc<Mutex<HashMap<TaskId, Arc<AtomicBool>>>>;

pub struct LocalBoundary {
    hub: EventHub,
    base: EngineConfig,
    increment_every: usize,
    running: CancelFlags,
}

impl LocalBoundary {
    /// `base` supplies cost settings; capital and sizing come from each
    /// request.
    pub fn new(hub: EventHub, base: EngineConfig, increment_every: usize) -> Self {
        Self {
            hub,
            base,
            increment_every: increment_every.max(1),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn is_running(&self, task_id: &TaskId) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(task_id)
    }
}

impl ExecutionBoundary for LocalBoundary {
    fn start(&self, request: RunRequest) -> Result<(), BoundaryError> {
        if request.bars.is_empty() {
            return Err(BoundaryError::Rejected("no bars to replay".into()));
        }
        let config = EngineConfig {
            initial_capital: request.initial_capital,
            sizing: request.sizing,
            ..self.base.clone()
        };
        config
            .validate()
            .map_err(|e| BoundaryError::Rejected(e.to_string()))?;
        let strategy = request
            .artifact
            .instantiate()
            .map_err(|e| BoundaryError::Rejected(e.to_string()))?;

        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            if running.contains_key(&request.task_id) {
                return Err(BoundaryError::AlreadyRunning(request.task_id));
            }
            running.insert(request.task_id.clone(), Arc::clone(&cancel));
        }
        self.hub.open(&request.task_id);

        let task_id = request.task_id.clone();
        let params = request.artifact.params.clone();
        let job = ReplayJob {
            request,
            executor: Executor::new(strategy, params, config),
            hub: self.hub.clone(),
            cancel,
            increment_every: self.increment_every,
        };
        let running = Arc::clone(&self.running);
        let spawned = thread::Builder::new()
            .name("replaylab-replay".into())
            .spawn(move || {
                let task_id = job.request.task_id.clone();
                job.run();
                running
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&task_id);
            });

        if let Err(err) = spawned {
            self.running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&task_id);
            self.hub.remove(&task_id);
            return Err(BoundaryError::Spawn(err));
        }
        Ok(())
    }

    fn subscribe(&self, task_id: &TaskId) -> Option<UnboundedReceiver<TaskEvent>> {
        self.hub.subscribe(task_id)
    }

    fn cancel(&self, task_id: &TaskId) {
        if let Some(flag) = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
        {
            flag.store(true, Ordering::Relaxed);
        }
        let dropped = self.hub.unsubscribe_all(task_id);
        debug!(task_id = %task_id, listeners = dropped, "boundary cancel");
    }

    fn release(&self, task_id: &TaskId) {
        self.hub.remove(task_id);
    }
}

// ── Worker ──

struct ReplayJob {
    request: RunRequest,
    executor: Executor,
    hub: EventHub,
    cancel: Arc<AtomicBool>,
    increment_every: usize,
}

impl ReplayJob {
    fn run(mut self) {
        let task_id = self.request.task_id.clone();
        info!(
            task_id = %task_id,
            strategy = %self.request.artifact.strategy,
            symbol = %self.request.symbol,
            bars = self.request.bars.len(),
            "replay worker started"
        );
        self.hub.publish(TaskEvent::phase(&task_id, TaskPhase::Running));
        self.hub.publish(TaskEvent::progress(&task_id, 0.0));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.replay()));
        match outcome {
            Ok(Some(result)) => {
                self.hub.publish(TaskEvent::completed(&task_id, result.into()));
            }
            Ok(None) => debug!(task_id = %task_id, "replay stopped by cancel"),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(task_id = %task_id, error = %message, "replay panicked");
                self.hub
                    .publish(TaskEvent::failed(&task_id, format!("strategy panicked: {message}")));
            }
        }
    }

    /// `None` when cancelled part way.
    fn replay(&mut self) -> Option<ExecutorResult> {
        let bars = &self.request.bars;
        let symbol = self.request.symbol.as_str();
        let task_id = &self.request.task_id;
        let total = bars.len();

        self.executor.init(bars, symbol);
        for (i, bar) in bars.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                return None;
            }
            self.executor.execute(bar, i, bars, symbol);

            let done = i + 1;
            if done % self.increment_every == 0 || done == total {
                let batch = self.executor.take_increment(bars, total);
                self.hub.publish(TaskEvent::increment(task_id, batch));
                self.hub
                    .publish(TaskEvent::progress(task_id, done as f64 * 100.0 / total as f64));
            }
        }
        self.executor.end(bars, symbol);
        Some(self.executor.result(bars))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
