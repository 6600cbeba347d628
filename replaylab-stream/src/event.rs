//! Events emitted by an execution boundary for one task.

use crate::task::{TaskId, TaskPhase};
use replaylab_core::domain::{Bar, EquityPoint, Trade};
use replaylab_core::metrics::PerformanceMetrics;
use replaylab_core::{ExecutorResult, IncrementBatch};
use serde::{Deserialize, Serialize};

/// One event, tagged with the task that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub kind: EventKind,
}

impl TaskEvent {
    pub fn new(task_id: TaskId, kind: EventKind) -> Self {
        Self { task_id, kind }
    }

    pub fn phase(task_id: &TaskId, phase: TaskPhase) -> Self {
        Self::new(task_id.clone(), EventKind::Phase(phase))
    }

    pub fn progress(task_id: &TaskId, percent: f64) -> Self {
        Self::new(task_id.clone(), EventKind::Progress(percent))
    }

    pub fn increment(task_id: &TaskId, batch: IncrementBatch) -> Self {
        Self::new(task_id.clone(), EventKind::Increment(batch))
    }

    pub fn completed(task_id: &TaskId, payload: CompletedPayload) -> Self {
        Self::new(task_id.clone(), EventKind::Completed(Box::new(payload)))
    }

    pub fn failed(task_id: &TaskId, message: impl Into<String>) -> Self {
        Self::new(task_id.clone(), EventKind::Failed(message.into()))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Completed(_) | EventKind::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A non-terminal phase transition.
    Phase(TaskPhase),
    /// Percent complete, 0 to 100.
    Progress(f64),
    Increment(IncrementBatch),
    Completed(Box<CompletedPayload>),
    Failed(String),
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Phase(_) => "phase",
            EventKind::Progress(_) => "progress",
            EventKind::Increment(_) => "increment",
            EventKind::Completed(_) => "completed",
            EventKind::Failed(_) => "failed",
        }
    }
}

/// Final output as reported by the boundary. `metrics` is optional on the
/// wire: a completion without it is not a usable result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedPayload {
    pub metrics: Option<PerformanceMetrics>,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub candles: Vec<Bar>,
}

impl CompletedPayload {
    pub fn into_result(self) -> Option<ExecutorResult> {
        let metrics = self.metrics?;
        Some(ExecutorResult {
            metrics,
            equity_curve: self.equity_curve,
            trades: self.trades,
            candles: self.candles,
        })
    }
}

impl From<ExecutorResult> for CompletedPayload {
    fn from(result: ExecutorResult) -> Self {
        Self {
            metrics: Some(result.metrics),
            equity_curve: result.equity_curve,
            trades: result.trades,
            candles: result.candles,
        }
    }
}
