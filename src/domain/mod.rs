//! Domain types for the taskchain orchestrator.
//!
//! This module contains the core data structures:
//! - CompletionSignal: the payload crossing every boundary
//! - Task: units of simulated work and their status
//! - Session: countdown state and notifications
//! - Events: the in-memory orchestration journal

pub mod events;
pub mod session;
pub mod signal;
pub mod task;

// Re-export commonly used types
pub use events::{Event, EventType, Journal};
pub use session::{
    Notification, NotificationChannel, NotificationSession, NotifierProfile, NotifierState,
};
pub use signal::CompletionSignal;
pub use task::{Task, TaskInfo, TaskKey, TaskState};
