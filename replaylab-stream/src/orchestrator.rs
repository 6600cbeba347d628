//! Orchestrator state machine.
//!
//! Synchronous and clock-free: callers pass `now` into every time-dependent
//! call, so tests drive it by direct event injection. The async session in
//! `session.rs` owns one of these and feeds it events and timer firings.
//!
//! Rules enforced on every event:
//! - events for any task other than the active one are discarded
//! - nothing changes once the task is terminal
//! - non-terminal phases only move forward
//! - increments are buffered behind a single flush deadline and folded in
//!   arrival order when it fires

use crate::event::{EventKind, TaskEvent};
use crate::increment::{IncrementBuffer, ResultView};
use crate::snapshot::TaskSnapshot;
use crate::task::{TaskId, TaskPhase};
use replaylab_core::{ExecutorResult, StreamConfig};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Message for a success event that carries no metrics.
pub const COMPLETED_WITHOUT_RESULT: &str = "completed but no result";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoActiveTask,
    StaleTask,
    AlreadyTerminal,
    PhaseRegression,
    /// Terminal phases arrive only as completion or failure events.
    TerminalPhase,
    InvalidProgress,
}

/// What `Orchestrator::handle` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    /// Held until the flush deadline.
    Buffered { flush_at: Instant },
    Terminal(TaskPhase),
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The task is still in flight; re-subscribe to its events.
    Resume(TaskId),
    /// The task already finished; its final state is loaded.
    Terminal(TaskPhase),
    Ignored,
}

/// Everything the orchestrator knows about its one task.
#[derive(Debug, Clone, Default)]
pub struct TaskState {
    task_id: Option<TaskId>,
    phase: TaskPhase,
    progress: f64,
    error: Option<String>,
    result: ResultView,
    buffer: IncrementBuffer,
    flush_deadline: Option<Instant>,
}

impl TaskState {
    pub fn task_id(&self) -> Option<&TaskId> {
        self.task_id.as_ref()
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Best-known partial or final output.
    pub fn result(&self) -> &ResultView {
        &self.result
    }

    /// Increments received but not yet flushed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    flush_delay: Duration,
    state: TaskState,
}

impl Orchestrator {
    pub fn new(flush_delay: Duration) -> Self {
        Self {
            flush_delay,
            state: TaskState::default(),
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(Duration::from_millis(config.flush_delay_ms))
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn phase(&self) -> TaskPhase {
        self.state.phase
    }

    pub fn active_task(&self) -> Option<&TaskId> {
        self.state.task_id.as_ref().filter(|_| self.state.phase.is_active())
    }

    pub fn flush_deadline(&self) -> Option<Instant> {
        self.state.flush_deadline
    }

    /// The final result, once the task completed.
    pub fn final_result(&self) -> Option<ExecutorResult> {
        if self.state.phase == TaskPhase::Completed {
            self.state.result.to_result()
        } else {
            None
        }
    }

    // ── Lifecycle ──

    /// Track a new task in `preparing`. A task still in flight is cancelled
    /// first and its id returned so the caller can stop it.
    pub fn begin(&mut self, task_id: TaskId) -> Option<TaskId> {
        let superseded = self.cancel();
        info!(task_id = %task_id, "task started");
        self.state = TaskState {
            task_id: Some(task_id),
            phase: TaskPhase::Preparing,
            ..TaskState::default()
        };
        superseded
    }

    /// Cancel the task in flight. Returns its id, or `None` if nothing was
    /// active.
    pub fn cancel(&mut self) -> Option<TaskId> {
        let task_id = self.active_task()?.clone();
        info!(task_id = %task_id, "task cancelled");
        self.settle(TaskPhase::Cancelled, None);
        Some(task_id)
    }

    /// Input was rejected before any task existed: show the error with no
    /// task tracked. Returns a cancelled in-flight task, if any.
    pub fn reject(&mut self, message: impl Into<String>) -> Option<TaskId> {
        let superseded = self.cancel();
        let message = message.into();
        warn!(error = %message, "run rejected");
        self.state = TaskState {
            phase: TaskPhase::Error,
            error: Some(message),
            ..TaskState::default()
        };
        superseded
    }

    /// Fail the task in flight with `message`. No-op when nothing is active.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        let Some(task_id) = self.active_task().cloned() else {
            return false;
        };
        let message = message.into();
        warn!(task_id = %task_id, error = %message, "task failed");
        self.settle(TaskPhase::Error, Some(message));
        true
    }

    // ── Events ──

    pub fn handle(&mut self, event: TaskEvent, now: Instant) -> Disposition {
        let Some(active) = &self.state.task_id else {
            debug!(task_id = %event.task_id, kind = event.kind.label(), "event with no task tracked");
            return Disposition::Ignored(IgnoreReason::NoActiveTask);
        };
        if *active != event.task_id {
            warn!(
                task_id = %event.task_id,
                active = %active,
                kind = event.kind.label(),
                "stale event dropped"
            );
            return Disposition::Ignored(IgnoreReason::StaleTask);
        }
        if self.state.phase.is_terminal() {
            warn!(
                task_id = %event.task_id,
                phase = %self.state.phase,
                kind = event.kind.label(),
                "event after terminal state dropped"
            );
            return Disposition::Ignored(IgnoreReason::AlreadyTerminal);
        }

        let task_id = event.task_id;
        match event.kind {
            EventKind::Phase(phase) => {
                if phase.is_terminal() {
                    return Disposition::Ignored(IgnoreReason::TerminalPhase);
                }
                if phase.rank() <= self.state.phase.rank() {
                    debug!(task_id = %task_id, from = %self.state.phase, to = %phase, "phase regression ignored");
                    return Disposition::Ignored(IgnoreReason::PhaseRegression);
                }
                info!(task_id = %task_id, phase = %phase, "phase changed");
                self.state.phase = phase;
                Disposition::Applied
            }
            EventKind::Progress(percent) => {
                if !percent.is_finite() {
                    return Disposition::Ignored(IgnoreReason::InvalidProgress);
                }
                self.state.progress = percent.clamp(0.0, 100.0);
                Disposition::Applied
            }
            EventKind::Increment(batch) => {
                if self.state.buffer.push(batch) {
                    debug!(task_id = %task_id, "flush armed");
                }
                let flush_at = *self.state.flush_deadline.get_or_insert(now + self.flush_delay);
                Disposition::Buffered { flush_at }
            }
            EventKind::Completed(payload) => match payload.into_result() {
                Some(result) => {
                    info!(
                        task_id = %task_id,
                        trades = result.trades.len(),
                        bars = result.candles.len(),
                        "task completed"
                    );
                    self.settle(TaskPhase::Completed, None);
                    self.state.progress = 100.0;
                    self.state.result = ResultView::from_result(result);
                    Disposition::Terminal(TaskPhase::Completed)
                }
                None => {
                    warn!(task_id = %task_id, "completion without metrics");
                    self.settle(TaskPhase::Error, Some(COMPLETED_WITHOUT_RESULT.to_string()));
                    Disposition::Terminal(TaskPhase::Error)
                }
            },
            EventKind::Failed(message) => {
                warn!(task_id = %task_id, error = %message, "task failed");
                self.settle(TaskPhase::Error, Some(message));
                Disposition::Terminal(TaskPhase::Error)
            }
        }
    }

    /// Flush if the deadline has passed. Returns whether anything was applied.
    pub fn poll_flush(&mut self, now: Instant) -> bool {
        match self.state.flush_deadline {
            Some(deadline) if deadline <= now => self.flush_now(),
            _ => false,
        }
    }

    /// Fold the buffer into the result view now.
    pub fn flush_now(&mut self) -> bool {
        self.state.flush_deadline = None;
        if self.state.phase.is_terminal() {
            self.state.buffer.clear();
            return false;
        }
        let pending = self.state.buffer.len();
        let Some(merged) = self.state.buffer.take() else {
            return false;
        };
        debug!(
            task_id = ?self.state.task_id,
            batches = pending,
            points = merged.new_equity_points.len(),
            "increments flushed"
        );
        self.state.result.apply(merged);
        true
    }

    fn settle(&mut self, phase: TaskPhase, error: Option<String>) {
        self.state.phase = phase;
        self.state.error = error;
        self.state.buffer.clear();
        self.state.flush_deadline = None;
    }

    // ── Persistence ──

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.state.task_id.clone(),
            phase: self.state.phase,
            progress: self.state.progress,
            error: self.state.error.clone(),
            result: self.state.result.clone(),
            run: None,
            saved_at: chrono::Utc::now(),
        }
    }

    /// Load a persisted snapshot.
    ///
    /// Only an idle orchestrator accepts it. A snapshot of the task this
    /// orchestrator already tracks changes nothing: the live state is newer.
    /// When the task is still in flight the partial result is left empty:
    /// re-subscribing replays the task's events from the start and rebuilds
    /// it under the usual rules.
    pub fn restore(&mut self, snapshot: TaskSnapshot) -> RestoreOutcome {
        let same_task = self.state.task_id.is_some() && self.state.task_id == snapshot.task_id;
        if same_task && self.state.phase.is_terminal() {
            return RestoreOutcome::Terminal(self.state.phase);
        }
        if same_task {
            debug!(task_id = ?snapshot.task_id, phase = %self.state.phase, "snapshot of live task ignored");
            return RestoreOutcome::Ignored;
        }
        if !same_task && self.state.phase != TaskPhase::Idle {
            warn!(task_id = ?snapshot.task_id, "snapshot for another task ignored");
            return RestoreOutcome::Ignored;
        }

        let resumable = snapshot.phase.is_active();
        match snapshot.task_id {
            Some(task_id) if resumable => {
                let phase = snapshot.phase;
                info!(task_id = %task_id, phase = %phase, "task restored");
                self.state = TaskState {
                    task_id: Some(task_id.clone()),
                    phase,
                    progress: snapshot.progress,
                    ..TaskState::default()
                };
                RestoreOutcome::Resume(task_id)
            }
            task_id => {
                let phase = snapshot.phase;
                self.state = TaskState {
                    task_id,
                    phase,
                    progress: snapshot.progress,
                    error: snapshot.error,
                    result: snapshot.result,
                    ..TaskState::default()
                };
                if phase.is_terminal() {
                    RestoreOutcome::Terminal(phase)
                } else {
                    RestoreOutcome::Ignored
                }
            }
        }
    }
}
