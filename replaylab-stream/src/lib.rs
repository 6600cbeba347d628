//! ReplayLab Stream: replays as asynchronous tasks with merged, throttled
//! partial results.
//!
//! This crate contains:
//! - Task identity and lifecycle phases
//! - Task events and the increment buffer
//! - The orchestrator state machine (identity filtering, flush timer,
//!   terminal stickiness, recovery)
//! - The per-task event hub and the in-process execution boundary
//! - Strategy generation and snapshot persistence seams
//! - The async session that drives one task end to end

pub mod boundary;
pub mod collaborators;
pub mod event;
pub mod hub;
pub mod increment;
pub mod orchestrator;
pub mod session;
pub mod snapshot;
pub mod task;

pub use boundary::{BoundaryError, ExecutionBoundary, LocalBoundary, RunRequest};
pub use collaborators::{GenerationError, GenerationRequest, ReferenceGenerator, StrategyArtifact, StrategyGenerator};
pub use event::{CompletedPayload, EventKind, TaskEvent};
pub use hub::EventHub;
pub use increment::{IncrementBuffer, ResultView};
pub use orchestrator::{Disposition, IgnoreReason, Orchestrator, RestoreOutcome, TaskState};
pub use session::{CancelHandle, RunSpec, StreamSession, ValidationError};
pub use snapshot::{JsonFileSnapshotStore, MemorySnapshotStore, SnapshotError, SnapshotStore, TaskSnapshot};
pub use task::{TaskId, TaskPhase};
