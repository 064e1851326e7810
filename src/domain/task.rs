//! Tasks and their observable status.
//!
//! A Task is a unit of simulated background work. It echoes its input
//! identifier back once its fixed delay has elapsed.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signal::CompletionSignal;

/// Identity of a single task request.
///
/// Distinct from the task's `id`: two tasks in one pipeline may carry the
/// same input identifier, but never the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey(pub Uuid);

impl TaskKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A unit of simulated work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Request identity, unique per task
    pub key: TaskKey,

    /// Stage name ("first", "second", ...)
    pub name: String,

    /// Input identifier, echoed in the result
    pub id: String,

    /// How long the work blocks its worker thread
    pub delay: Duration,

    /// Whether the pipeline's gate applies to this task
    pub requires_network: bool,

    /// Panic instead of producing a result, after the delay
    pub fails: bool,
}

impl Task {
    /// Create a task gated on the pipeline's precondition
    pub fn new(name: impl Into<String>, id: impl Into<String>, delay: Duration) -> Self {
        Self {
            key: TaskKey::new(),
            name: name.into(),
            id: id.into(),
            delay,
            requires_network: true,
            fails: false,
        }
    }

    /// Opt this task out of the gate check
    pub fn ungated(mut self) -> Self {
        self.requires_network = false;
        self
    }

    /// Make the work panic once its delay has elapsed
    pub fn failing(mut self) -> Self {
        self.fails = true;
        self
    }

    /// Run the work on the current thread.
    ///
    /// Blocks for the full delay; call from a worker thread only. A failing
    /// task panics here, killing the worker.
    pub fn execute(&self) -> CompletionSignal {
        std::thread::sleep(self.delay);
        if self.fails {
            panic!("task '{}' failed", self.name);
        }
        CompletionSignal::new(self.id.clone())
    }

    /// "first" -> "First process is done"
    pub fn done_message(&self) -> String {
        let mut chars = self.name.chars();
        let label = match chars.next() {
            Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!("{} process is done", label)
    }
}

/// Lifecycle of a task inside a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Next in line, waiting for the gate
    Enqueued,

    /// Waiting on an earlier task
    Blocked,

    /// Worker is executing
    Running,

    /// Completed with a result
    Succeeded,

    /// Will never produce a result
    Failed,
}

impl TaskState {
    /// Succeeded or failed; no further transitions
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Snapshot of one task, as published to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub key: TaskKey,
    pub name: String,
    pub state: TaskState,
    pub output: Option<CompletionSignal>,
}

impl TaskInfo {
    pub fn new(task: &Task, state: TaskState) -> Self {
        Self {
            key: task.key,
            name: task.name.clone(),
            state,
            output: None,
        }
    }

    pub fn with_state(&self, state: TaskState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    pub fn succeeded(&self, output: CompletionSignal) -> Self {
        Self {
            state: TaskState::Succeeded,
            output: Some(output),
            ..self.clone()
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_echoes_id() {
        let task = Task::new("first", "001", Duration::ZERO);
        assert_eq!(task.execute(), CompletionSignal::new("001"));
    }

    #[test]
    #[should_panic(expected = "task 'first' failed")]
    fn test_failing_task_panics() {
        Task::new("first", "001", Duration::ZERO).failing().execute();
    }

    #[test]
    fn test_tasks_with_same_id_have_distinct_keys() {
        let a = Task::new("first", "001", Duration::ZERO);
        let b = Task::new("second", "001", Duration::ZERO);
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn test_done_message() {
        let task = Task::new("third", "003", Duration::ZERO);
        assert_eq!(task.done_message(), "Third process is done");
    }

    #[test]
    fn test_finished_states() {
        assert!(!TaskState::Enqueued.is_finished());
        assert!(!TaskState::Blocked.is_finished());
        assert!(!TaskState::Running.is_finished());
        assert!(TaskState::Succeeded.is_finished());
        assert!(TaskState::Failed.is_finished());
    }

    #[test]
    fn test_info_transitions_keep_identity() {
        let task = Task::new("second", "001", Duration::ZERO);
        let info = TaskInfo::new(&task, TaskState::Blocked);
        let done = info
            .with_state(TaskState::Running)
            .succeeded(CompletionSignal::new("001"));

        assert_eq!(done.key, task.key);
        assert_eq!(done.state, TaskState::Succeeded);
        assert_eq!(done.output, Some(CompletionSignal::new("001")));
    }
}
