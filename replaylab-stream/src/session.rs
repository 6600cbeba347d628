//! Async driver around the orchestrator.
//!
//! A session runs one task at a time through its phases: validate the
//! `RunSpec`, fetch bars, generate the strategy, hand the run to the execution
//! boundary, then consume its events until a terminal state. Collaborator
//! calls run on the blocking pool; everything else happens on the task that
//! awaits [`StreamSession::run`]. The state is snapshotted on every phase
//! change, flush and terminal transition so a later session can recover it.

use crate::boundary::{ExecutionBoundary, LocalBoundary, RunRequest};
use crate::collaborators::{GenerationRequest, ReferenceGenerator, StrategyGenerator};
use crate::event::TaskEvent;
use crate::hub::EventHub;
use crate::orchestrator::{Disposition, Orchestrator, RestoreOutcome, TaskState};
use crate::snapshot::{SnapshotError, SnapshotStore, TaskSnapshot};
use crate::task::{TaskId, TaskPhase};
use chrono::NaiveDate;
use replaylab_core::data::{BarProvider, BarRequest, Timeframe};
use replaylab_core::ledger::SizingPolicy;
use replaylab_core::ReplayConfig;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{info, warn};

pub const EXECUTION_STALLED: &str = "execution stalled";
pub const TASK_UNAVAILABLE: &str = "task no longer available";
pub const BOUNDARY_DISCONNECTED: &str = "execution boundary disconnected";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("no signals or factors selected")]
    NoComponents,

    #[error("symbol is required")]
    MissingSymbol,

    #[error("date range is required")]
    MissingDateRange,

    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

/// What the caller asks to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub symbol: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub timeframes: Vec<Timeframe>,
    pub selection: GenerationRequest,
    pub initial_capital: f64,
    pub sizing: SizingPolicy,
}

impl RunSpec {
    /// Daily bars, one signal, default capital and sizing.
    pub fn new(symbol: impl Into<String>, start: NaiveDate, end: NaiveDate, signal: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            start: Some(start),
            end: Some(end),
            timeframes: vec![Timeframe::D1],
            selection: GenerationRequest {
                signals: vec![signal.into()],
                ..GenerationRequest::default()
            },
            initial_capital: 100_000.0,
            sizing: SizingPolicy::default(),
        }
    }

    /// Returns the date range when the run can start.
    pub fn validate(&self) -> Result<(NaiveDate, NaiveDate), ValidationError> {
        if self.selection.signals.is_empty() && self.selection.factors.is_empty() {
            return Err(ValidationError::NoComponents);
        }
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::MissingSymbol);
        }
        let (Some(start), Some(end)) = (self.start, self.end) else {
            return Err(ValidationError::MissingDateRange);
        };
        if start > end {
            return Err(ValidationError::InvalidDateRange { start, end });
        }
        Ok((start, end))
    }
}

/// Requests cancellation of whatever the session is running.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<u64>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}

pub struct StreamSession {
    orchestrator: Orchestrator,
    provider: Arc<dyn BarProvider>,
    generator: Arc<dyn StrategyGenerator>,
    boundary: Arc<dyn ExecutionBoundary>,
    store: Arc<dyn SnapshotStore>,
    stall_timeout: Option<Duration>,
    /// Inputs of the tracked task, persisted with every snapshot.
    run: Option<RunSpec>,
    cancel_tx: Arc<watch::Sender<u64>>,
    cancel_rx: watch::Receiver<u64>,
}

impl StreamSession {
    pub fn new(
        orchestrator: Orchestrator,
        provider: Arc<dyn BarProvider>,
        generator: Arc<dyn StrategyGenerator>,
        boundary: Arc<dyn ExecutionBoundary>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(0);
        Self {
            orchestrator,
            provider,
            generator,
            boundary,
            store,
            stall_timeout: None,
            run: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    /// In-process session: reference generator and a local boundary.
    pub fn local(provider: Arc<dyn BarProvider>, store: Arc<dyn SnapshotStore>, config: &ReplayConfig) -> Self {
        let boundary = LocalBoundary::new(EventHub::new(), config.engine.clone(), config.stream.increment_every);
        Self::new(
            Orchestrator::from_config(&config.stream),
            provider,
            Arc::new(ReferenceGenerator),
            Arc::new(boundary),
            store,
        )
        .with_stall_timeout(config.stream.stall_timeout_ms.map(Duration::from_millis))
    }

    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    pub fn state(&self) -> &TaskState {
        self.orchestrator.state()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    // ── Run ──

    /// Run one task to a terminal state and return its final snapshot.
    pub async fn run(&mut self, spec: RunSpec) -> TaskSnapshot {
        let mut cancel = self.cancel_rx.clone();
        cancel.borrow_and_update();

        let (start, end) = match spec.validate() {
            Ok(range) => range,
            Err(err) => {
                if let Some(previous) = self.orchestrator.reject(err.to_string()) {
                    self.boundary.cancel(&previous);
                }
                self.run = None;
                self.persist();
                return self.snapshot();
            }
        };

        let task_id = TaskId::generate();
        if let Some(previous) = self.orchestrator.begin(task_id.clone()) {
            self.boundary.cancel(&previous);
        }
        self.run = Some(spec.clone());
        self.persist();
        self.execute(task_id, spec, (start, end), cancel).await
    }

    /// Resume from the stored snapshot, if there is one.
    ///
    /// A finished task is loaded as is. A task still in flight is
    /// re-subscribed and driven to its terminal state. If the boundary no
    /// longer knows it, the task is replayed again under the same id from
    /// its stored inputs; without inputs it fails with "task no longer
    /// available".
    pub async fn recover(&mut self) -> Result<Option<TaskSnapshot>, SnapshotError> {
        let Some(snapshot) = self.store.load()? else {
            return Ok(None);
        };
        let mut cancel = self.cancel_rx.clone();
        cancel.borrow_and_update();

        let stored_run = snapshot.run.clone();
        match self.orchestrator.restore(snapshot) {
            RestoreOutcome::Resume(task_id) => {
                self.run = stored_run;
                info!(task_id = %task_id, "recovering task");
                if let Some(events) = self.boundary.subscribe(&task_id) {
                    return Ok(Some(self.drive(task_id, events, cancel).await));
                }
                let Some(spec) = self.run.clone() else {
                    return Ok(Some(self.fail_and_finish(&task_id, TASK_UNAVAILABLE)));
                };
                match spec.validate() {
                    Ok(range) => {
                        info!(task_id = %task_id, symbol = %spec.symbol, "task unknown to boundary, replaying from inputs");
                        Ok(Some(self.execute(task_id, spec, range, cancel).await))
                    }
                    Err(err) => {
                        warn!(task_id = %task_id, error = %err, "stored inputs invalid");
                        Ok(Some(self.fail_and_finish(&task_id, TASK_UNAVAILABLE)))
                    }
                }
            }
            RestoreOutcome::Terminal(_) => {
                if stored_run.is_some() {
                    self.run = stored_run;
                }
                Ok(Some(self.snapshot()))
            }
            RestoreOutcome::Ignored => Ok(Some(self.snapshot())),
        }
    }

    /// Fetch bars, generate the strategy and hand the run to the boundary.
    async fn execute(
        &mut self,
        task_id: TaskId,
        spec: RunSpec,
        (start, end): (NaiveDate, NaiveDate),
        mut cancel: watch::Receiver<u64>,
    ) -> TaskSnapshot {
        // bars
        self.advance(&task_id, TaskPhase::Downloading);
        let request = BarRequest {
            symbol: spec.symbol.clone(),
            start,
            end,
            timeframes: spec.timeframes.clone(),
        };
        let provider = Arc::clone(&self.provider);
        let fetch = tokio::task::spawn_blocking(move || provider.fetch(&request));
        let bars = match interruptible(fetch, &mut cancel).await {
            None => return self.cancel_and_finish(&task_id),
            Some(Ok(Ok(set))) => set.bars,
            Some(Ok(Err(err))) => return self.fail_and_finish(&task_id, err.to_string()),
            Some(Err(err)) => return self.fail_and_finish(&task_id, format!("bar provider task failed: {err}")),
        };

        // strategy
        self.advance(&task_id, TaskPhase::Generating);
        let generator = Arc::clone(&self.generator);
        let selection = spec.selection.clone();
        let generate = tokio::task::spawn_blocking(move || generator.generate(&selection));
        let artifact = match interruptible(generate, &mut cancel).await {
            None => return self.cancel_and_finish(&task_id),
            Some(Ok(Ok(artifact))) => artifact,
            Some(Ok(Err(err))) => return self.fail_and_finish(&task_id, err.to_string()),
            Some(Err(err)) => return self.fail_and_finish(&task_id, format!("strategy generator task failed: {err}")),
        };

        // execution
        let request = RunRequest {
            task_id: task_id.clone(),
            artifact,
            symbol: spec.symbol,
            start,
            end,
            initial_capital: spec.initial_capital,
            sizing: spec.sizing,
            bars,
        };
        if let Err(err) = self.boundary.start(request) {
            return self.fail_and_finish(&task_id, err.to_string());
        }
        let Some(events) = self.boundary.subscribe(&task_id) else {
            return self.fail_and_finish(&task_id, TASK_UNAVAILABLE);
        };
        self.drive(task_id, events, cancel).await
    }

    // ── Event loop ──

    async fn drive(
        &mut self,
        task_id: TaskId,
        mut events: mpsc::UnboundedReceiver<TaskEvent>,
        mut cancel: watch::Receiver<u64>,
    ) -> TaskSnapshot {
        let mut last_event = Instant::now();
        while !self.orchestrator.phase().is_terminal() {
            let flush_at = self.orchestrator.flush_deadline();
            let stall_at = self.stall_timeout.map(|timeout| last_event + timeout);

            tokio::select! {
                biased;

                _ = cancelled(&mut cancel) => {
                    self.cancel_active();
                }
                received = events.recv() => match received {
                    Some(event) => {
                        last_event = Instant::now();
                        let before = self.orchestrator.phase();
                        let disposition = self.orchestrator.handle(event, last_event);
                        let changed = matches!(disposition, Disposition::Applied | Disposition::Terminal(_))
                            && self.orchestrator.phase() != before;
                        if changed {
                            self.persist();
                        }
                    }
                    None => {
                        self.orchestrator.fail(BOUNDARY_DISCONNECTED);
                    }
                },
                _ = sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                    if self.orchestrator.poll_flush(Instant::now()) {
                        self.persist();
                    }
                }
                _ = sleep_until(stall_at.unwrap_or_else(Instant::now)), if stall_at.is_some() => {
                    if self.orchestrator.fail(EXECUTION_STALLED) {
                        self.boundary.cancel(&task_id);
                    }
                }
            }
        }
        self.finish(&task_id)
    }

    // ── Transitions ──

    fn advance(&mut self, task_id: &TaskId, phase: TaskPhase) {
        let event = TaskEvent::phase(task_id, phase);
        if self.orchestrator.handle(event, Instant::now()) == Disposition::Applied {
            self.persist();
        }
    }

    fn cancel_active(&mut self) {
        if let Some(task_id) = self.orchestrator.cancel() {
            self.boundary.cancel(&task_id);
        }
    }

    fn cancel_and_finish(&mut self, task_id: &TaskId) -> TaskSnapshot {
        self.cancel_active();
        self.finish(task_id)
    }

    fn fail_and_finish(&mut self, task_id: &TaskId, message: impl Into<String>) -> TaskSnapshot {
        self.orchestrator
            .handle(TaskEvent::failed(task_id, message), Instant::now());
        self.finish(task_id)
    }

    fn finish(&mut self, task_id: &TaskId) -> TaskSnapshot {
        self.persist();
        self.boundary.release(task_id);
        let snapshot = self.snapshot();
        info!(
            task_id = %task_id,
            phase = %snapshot.phase,
            error = snapshot.error.as_deref().unwrap_or(""),
            "task finished"
        );
        snapshot
    }

    fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            run: self.run.clone(),
            ..self.orchestrator.snapshot()
        }
    }

    fn persist(&self) {
        if let Err(err) = self.store.save(&self.snapshot()) {
            warn!(error = %err, "snapshot not saved");
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<u64>) {
    if rx.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn interruptible<F: Future>(future: F, cancel: &mut watch::Receiver<u64>) -> Option<F::Output> {
    tokio::select! {
        output = future => Some(output),
        _ = cancelled(cancel) => None,
    }
}
