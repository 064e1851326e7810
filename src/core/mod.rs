//! Core orchestration logic.
//!
//! This module contains:
//! - Dispatcher: the single delivery thread for observer callbacks
//! - Mailbox: last-write-wins observable values and one-shot observers
//! - Gate: preconditions checked before a task is dequeued
//! - Pipeline / Runner: pipeline definitions and sequential execution
//! - Countdown: thread-backed countdown notifiers
//! - Orchestrator: wires task completions to notifiers

pub mod countdown;
pub mod dispatcher;
pub mod gate;
pub mod mailbox;
pub mod orchestrator;
pub mod pipeline;
pub mod runner;

// Re-export commonly used types
pub use countdown::{CountdownHandle, CountdownNotifier, NotifierError, MISSING_ID};
pub use dispatcher::{DispatchError, Dispatcher};
pub use gate::{AlwaysOpen, FnGate, Gate, GateError, NetworkReachable};
pub use mailbox::{CompletionObserver, Mailbox};
pub use orchestrator::{OrchestrationHandle, Orchestrator, OrchestratorSettings};
pub use pipeline::Pipeline;
pub use runner::{PipelineError, PipelineHandle, PipelineRunner, PreparedPipeline};
