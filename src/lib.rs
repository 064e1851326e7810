//! taskchain - Sequential task pipeline with countdown notifiers
//!
//! Runs an ordered chain of simulated background tasks, observes each
//! task's completion on a single delivery thread, and launches countdown
//! notifiers from designated completions.
//!
//! # Architecture
//!
//! - Tasks run one at a time on worker threads; the next task starts only
//!   after the previous completion has been delivered
//! - Status flows through last-write-wins mailboxes; observers always run
//!   on the delivery thread
//! - Each countdown notifier blocks its own dedicated thread and reports
//!   completion through a mailbox owned by the orchestrator
//!
//! # Modules
//!
//! - `adapters`: Display and notification sinks (console, in-memory)
//! - `core`: Orchestration logic (Dispatcher, Mailbox, Runner, Countdown)
//! - `domain`: Data structures (Task, CompletionSignal, Event)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the chain with fast ticks
//! taskchain run --tick-ms 100 --work-delay-ms 200
//!
//! # Run one notifier on its own
//! taskchain countdown secondary --id 002
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{DisplaySink, NotificationSink};
pub use self::core::{Orchestrator, OrchestratorSettings, Pipeline, PipelineRunner};
pub use domain::{CompletionSignal, Event, EventType, Task, TaskInfo, TaskState};
