//! Task identity and lifecycle phases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Caller-chosen identifier of one asynchronous replay run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A process-unique id: `task-<unix millis>-<sequence>`.
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("task-{millis}-{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle phase. Non-terminal phases only move forward; terminal phases
/// never change once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    #[default]
    Idle,
    Preparing,
    Downloading,
    Generating,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl TaskPhase {
    /// Position in the forward order. All terminal phases share the top rank.
    pub fn rank(self) -> u8 {
        match self {
            TaskPhase::Idle => 0,
            TaskPhase::Preparing => 1,
            TaskPhase::Downloading => 2,
            TaskPhase::Generating => 3,
            TaskPhase::Running => 4,
            TaskPhase::Completed | TaskPhase::Error | TaskPhase::Cancelled => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskPhase::Completed | TaskPhase::Error | TaskPhase::Cancelled)
    }

    /// Preparing through running.
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != TaskPhase::Idle
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskPhase::Idle => "idle",
            TaskPhase::Preparing => "preparing",
            TaskPhase::Downloading => "downloading",
            TaskPhase::Generating => "generating",
            TaskPhase::Running => "running",
            TaskPhase::Completed => "completed",
            TaskPhase::Error => "error",
            TaskPhase::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = TaskId::generate();
        let b = TaskId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("task-"));
    }

    #[test]
    fn ranks_follow_lifecycle() {
        let order = [
            TaskPhase::Idle,
            TaskPhase::Preparing,
            TaskPhase::Downloading,
            TaskPhase::Generating,
            TaskPhase::Running,
        ];
        assert!(order.windows(2).all(|w| w[0].rank() < w[1].rank()));
        assert!(TaskPhase::Cancelled.rank() > TaskPhase::Running.rank());
    }

    #[test]
    fn terminal_and_active_are_disjoint() {
        for phase in [TaskPhase::Completed, TaskPhase::Error, TaskPhase::Cancelled] {
            assert!(phase.is_terminal());
            assert!(!phase.is_active());
        }
        assert!(!TaskPhase::Idle.is_active());
        assert!(TaskPhase::Running.is_active());
    }

    #[test]
    fn phase_serializes_snake_case() {
        let json = serde_json::to_string(&TaskPhase::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
    }
}
