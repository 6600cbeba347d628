//! Persisted task snapshots for recovery.
//!
//! One orchestrator tracks one task, so a store holds a single slot: the
//! latest snapshot written replaces the previous one.

use crate::increment::ResultView;
use crate::session::RunSpec;
use crate::task::{TaskId, TaskPhase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializable projection of the orchestrator's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: Option<TaskId>,
    pub phase: TaskPhase,
    pub progress: f64,
    pub error: Option<String>,
    pub result: ResultView,
    /// Inputs of the task, so a new process can restart it from scratch.
    #[serde(default)]
    pub run: Option<RunSpec>,
    pub saved_at: DateTime<Utc>,
}

pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &TaskSnapshot) -> Result<(), SnapshotError>;
    fn load(&self) -> Result<Option<TaskSnapshot>, SnapshotError>;
    fn clear(&self) -> Result<(), SnapshotError>;
}

// ── In-memory ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<TaskSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &TaskSnapshot) -> Result<(), SnapshotError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<TaskSnapshot>, SnapshotError> {
        Ok(self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

// ── JSON file ────────────────────────────────────────────────────────

/// Stores the snapshot as pretty JSON. Writes go to a sibling temp file and
/// are renamed into place.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl SnapshotStore for JsonFileSnapshotStore {
    fn save(&self, snapshot: &TaskSnapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn load(&self) -> Result<Option<TaskSnapshot>, SnapshotError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}
