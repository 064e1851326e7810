//! Sequential pipeline execution.
//!
//! The runner drives tasks strictly one after another on Tokio's blocking
//! pool. Each task's status is published to its own [`Mailbox`], so
//! observers see every transition on the delivery thread. A task does not
//! start until every observer of the previous task's completion has run.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{CompletionSignal, EventType, Journal, Task, TaskInfo, TaskKey, TaskState};

use super::dispatcher::{panic_message, DispatchError, Dispatcher};
use super::gate::Gate;
use super::mailbox::Mailbox;
use super::pipeline::Pipeline;

/// Errors from pipeline execution
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid pipeline: {0}")]
    Invalid(String),

    #[error("Gate '{gate}' could not be evaluated: {reason}")]
    Gate { gate: String, reason: String },

    #[error("Task '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Pipeline driver stopped unexpectedly: {0}")]
    Driver(String),
}

/// Executes pipelines one task at a time
pub struct PipelineRunner {
    gate: Arc<dyn Gate>,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    journal: Journal,
}

struct Entry {
    task: Task,
    info: TaskInfo,
    status: Mailbox<TaskInfo>,
}

impl PipelineRunner {
    /// Create a runner that re-polls a closed gate every `poll_interval`
    pub fn new(gate: Arc<dyn Gate>, dispatcher: Dispatcher, poll_interval: Duration) -> Self {
        Self {
            gate,
            dispatcher,
            poll_interval,
            journal: Journal::new(),
        }
    }

    /// Record into a shared journal instead of a private one
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Validate the pipeline and publish initial states without starting it.
    ///
    /// Observers registered on the returned streams before
    /// [`PreparedPipeline::start`] see every transition.
    #[instrument(skip(self, pipeline), fields(pipeline = %pipeline.name))]
    pub fn prepare(&self, pipeline: &Pipeline) -> Result<PreparedPipeline, PipelineError> {
        pipeline
            .validate()
            .map_err(|e| PipelineError::Invalid(e.to_string()))?;

        let mut entries = Vec::with_capacity(pipeline.tasks.len());
        for (idx, task) in pipeline.tasks.iter().enumerate() {
            let state = if idx == 0 {
                TaskState::Enqueued
            } else {
                TaskState::Blocked
            };
            let info = TaskInfo::new(task, state);
            let status = Mailbox::new(self.dispatcher.clone());
            status.publish(info.clone())?;
            entries.push(Entry {
                task: task.clone(),
                info,
                status,
            });
        }

        let statuses = entries
            .iter()
            .map(|e| (e.task.key, e.status.clone()))
            .collect();

        self.journal.record(
            EventType::PipelineEnqueued,
            pipeline.name.clone(),
            format!("Pipeline '{}' enqueued with {} tasks", pipeline.name, entries.len()),
        );
        info!(tasks = entries.len(), gate = self.gate.name(), "Pipeline enqueued");

        Ok(PreparedPipeline {
            statuses,
            entries,
            driver: Driver {
                gate: Arc::clone(&self.gate),
                dispatcher: self.dispatcher.clone(),
                poll_interval: self.poll_interval,
                journal: self.journal.clone(),
            },
        })
    }

    /// Prepare the pipeline and start driving it straight away.
    ///
    /// Must be called from within a Tokio runtime. Returns immediately.
    pub fn enqueue(&self, pipeline: &Pipeline) -> Result<PipelineHandle, PipelineError> {
        Ok(self.prepare(pipeline)?.start())
    }
}

/// A validated pipeline whose driver has not started yet
pub struct PreparedPipeline {
    statuses: Vec<(TaskKey, Mailbox<TaskInfo>)>,
    entries: Vec<Entry>,
    driver: Driver,
}

impl PreparedPipeline {
    /// Status stream of one task
    pub fn status(&self, key: TaskKey) -> Option<&Mailbox<TaskInfo>> {
        find_status(&self.statuses, key)
    }

    /// Status streams in execution order
    pub fn statuses(&self) -> impl Iterator<Item = &Mailbox<TaskInfo>> {
        self.statuses.iter().map(|(_, mailbox)| mailbox)
    }

    /// Spawn the driver. Must be called from within a Tokio runtime.
    pub fn start(self) -> PipelineHandle {
        let driver = tokio::spawn(self.driver.run(self.entries));
        PipelineHandle {
            statuses: self.statuses,
            driver,
        }
    }
}

fn find_status(statuses: &[(TaskKey, Mailbox<TaskInfo>)], key: TaskKey) -> Option<&Mailbox<TaskInfo>> {
    statuses
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, mailbox)| mailbox)
}

/// Per-task status streams plus the driver's outcome
pub struct PipelineHandle {
    statuses: Vec<(TaskKey, Mailbox<TaskInfo>)>,
    driver: JoinHandle<Result<Vec<CompletionSignal>, PipelineError>>,
}

impl PipelineHandle {
    /// Task keys in execution order
    pub fn keys(&self) -> Vec<TaskKey> {
        self.statuses.iter().map(|(key, _)| *key).collect()
    }

    /// Status stream of one task
    pub fn status(&self, key: TaskKey) -> Option<&Mailbox<TaskInfo>> {
        find_status(&self.statuses, key)
    }

    /// Status streams in execution order
    pub fn statuses(&self) -> impl Iterator<Item = &Mailbox<TaskInfo>> {
        self.statuses.iter().map(|(_, mailbox)| mailbox)
    }

    /// Wait for the driver; yields each task's output in order
    pub async fn join(self) -> Result<Vec<CompletionSignal>, PipelineError> {
        match self.driver.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Driver(e.to_string())),
        }
    }
}

struct Driver {
    gate: Arc<dyn Gate>,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    journal: Journal,
}

impl Driver {
    async fn run(self, entries: Vec<Entry>) -> Result<Vec<CompletionSignal>, PipelineError> {
        let mut outputs = Vec::with_capacity(entries.len());

        for idx in 0..entries.len() {
            let entry = &entries[idx];

            if idx > 0 {
                entry.status.publish(entry.info.with_state(TaskState::Enqueued))?;
            }

            if entry.task.requires_network {
                if let Err(e) = self.wait_for_gate(&entry.task).await {
                    // Nothing has run yet if the very first check fails.
                    if idx > 0 {
                        self.fail_remaining(&entries[idx..], &e.to_string())?;
                    }
                    return Err(e);
                }
            }

            self.journal.record(
                EventType::TaskStarted,
                entry.task.name.clone(),
                format!("Task '{}' started with id {}", entry.task.name, entry.task.id),
            );
            entry.status.publish(entry.info.with_state(TaskState::Running))?;

            let task = entry.task.clone();
            match tokio::task::spawn_blocking(move || task.execute()).await {
                Ok(signal) => {
                    info!(task = %entry.task.name, id = %signal.id, "Task completed");
                    self.journal.record(
                        EventType::TaskCompleted,
                        entry.task.name.clone(),
                        format!("Task '{}' completed with id {}", entry.task.name, signal.id),
                    );
                    entry.status.publish(entry.info.succeeded(signal.clone()))?;
                    outputs.push(signal);
                }
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        panic_message(join_error.into_panic().as_ref())
                    } else {
                        join_error.to_string()
                    };
                    error!(task = %entry.task.name, %reason, "Task worker died");
                    self.fail_remaining(&entries[idx..], &reason)?;
                    return Err(PipelineError::TaskFailed {
                        task: entry.task.name.clone(),
                        reason,
                    });
                }
            }

            // Completion observers run before the next task may start.
            self.dispatcher.flush().await?;
        }

        Ok(outputs)
    }

    async fn wait_for_gate(&self, task: &Task) -> Result<(), PipelineError> {
        let mut deferred = false;

        loop {
            match self.gate.check().await {
                Ok(true) => {
                    if deferred {
                        debug!(task = %task.name, gate = self.gate.name(), "Gate opened");
                    }
                    return Ok(());
                }
                Ok(false) => {
                    if !deferred {
                        warn!(task = %task.name, gate = self.gate.name(), "Gate closed, deferring");
                        self.journal.record(
                            EventType::GateDeferred,
                            task.name.clone(),
                            format!("Gate '{}' closed before '{}'", self.gate.name(), task.name),
                        );
                        deferred = true;
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    error!(task = %task.name, gate = self.gate.name(), error = %e, "Gate evaluation failed");
                    return Err(PipelineError::Gate {
                        gate: self.gate.name().to_string(),
                        reason: format!("{:#}", e),
                    });
                }
            }
        }
    }

    fn fail_remaining(&self, entries: &[Entry], reason: &str) -> Result<(), DispatchError> {
        for entry in entries {
            self.journal.record(
                EventType::TaskFailed,
                entry.task.name.clone(),
                format!("Task '{}' failed: {}", entry.task.name, reason),
            );
            entry.status.publish(entry.info.with_state(TaskState::Failed))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gate::{AlwaysOpen, FnGate};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn runner(gate: Arc<dyn Gate>) -> PipelineRunner {
        let dispatcher = Dispatcher::spawn("runner-test").unwrap();
        PipelineRunner::new(gate, dispatcher, Duration::from_millis(5))
    }

    fn record_states(handle: &PipelineHandle) -> Arc<Mutex<Vec<(String, TaskState)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for status in handle.statuses() {
            let sink = Arc::clone(&seen);
            status
                .observe(move |info: &TaskInfo| {
                    sink.lock().unwrap().push((info.name.clone(), info.state));
                })
                .unwrap();
        }
        seen
    }

    #[tokio::test]
    async fn test_outputs_follow_submission_order() {
        let runner = runner(Arc::new(AlwaysOpen));
        let handle = runner.enqueue(&Pipeline::demo(Duration::ZERO)).unwrap();

        let outputs = handle.join().await.unwrap();
        let ids: Vec<&str> = outputs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["001", "001", "003"]);
    }

    #[tokio::test]
    async fn test_invalid_pipeline_is_rejected() {
        let runner = runner(Arc::new(AlwaysOpen));
        let result = runner.enqueue(&Pipeline::new("empty", Vec::new()));
        assert!(matches!(result, Err(PipelineError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_gate_error_means_no_task_runs() {
        let runner = runner(Arc::new(FnGate::new("broken", || anyhow::bail!("no radio"))));
        let handle = runner.enqueue(&Pipeline::demo(Duration::ZERO)).unwrap();
        let seen = record_states(&handle);
        let dispatcher = runner.dispatcher.clone();

        let result = handle.join().await;
        dispatcher.flush().await.unwrap();

        assert!(matches!(result, Err(PipelineError::Gate { .. })));
        let seen = seen.lock().unwrap();
        assert!(seen.iter().all(|(_, s)| *s != TaskState::Running));
        assert!(runner.journal().subjects(EventType::TaskStarted).is_empty());
    }

    #[tokio::test]
    async fn test_closed_gate_defers_until_open() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let gate = FnGate::new("flaky", move || Ok(counter.fetch_add(1, Ordering::SeqCst) >= 2));

        let runner = runner(Arc::new(gate));
        let handle = runner.enqueue(&Pipeline::demo(Duration::ZERO)).unwrap();
        let outputs = handle.join().await.unwrap();

        assert_eq!(outputs.len(), 3);
        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(runner.journal().subjects(EventType::GateDeferred), vec!["first"]);
    }

    #[tokio::test]
    async fn test_ungated_tasks_skip_the_gate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let gate = FnGate::new("counting", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });

        let pipeline = Pipeline::new(
            "mixed",
            vec![
                Task::new("first", "001", Duration::ZERO),
                Task::new("second", "002", Duration::ZERO).ungated(),
            ],
        );
        let runner = runner(Arc::new(gate));
        runner.enqueue(&pipeline).unwrap().join().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_task_fails_itself_and_the_rest() {
        let pipeline = Pipeline::new(
            "crashing",
            vec![
                Task::new("first", "001", Duration::ZERO),
                Task::new("second", "001", Duration::ZERO).failing(),
                Task::new("third", "003", Duration::ZERO),
            ],
        );
        let runner = runner(Arc::new(AlwaysOpen));
        let handle = runner.enqueue(&pipeline).unwrap();
        let statuses: Vec<_> = handle.statuses().cloned().collect();
        let dispatcher = runner.dispatcher.clone();

        let err = handle.join().await.unwrap_err();
        dispatcher.flush().await.unwrap();

        match err {
            PipelineError::TaskFailed { task, reason } => {
                assert_eq!(task, "second");
                assert_eq!(reason, "task 'second' failed");
            }
            other => panic!("unexpected error: {other}"),
        }

        let states: Vec<TaskState> = statuses.iter().map(|s| s.value().unwrap().state).collect();
        assert_eq!(
            states,
            vec![TaskState::Succeeded, TaskState::Failed, TaskState::Failed]
        );
        assert_eq!(runner.journal().subjects(EventType::TaskCompleted), vec!["first"]);
        assert_eq!(
            runner.journal().subjects(EventType::TaskFailed),
            vec!["second", "third"]
        );
        assert!(runner.journal().position(EventType::TaskStarted, "third").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_prepared_observers_see_completion_before_next_start() {
        for _ in 0..20 {
            let runner = runner(Arc::new(AlwaysOpen));
            let prepared = runner.prepare(&Pipeline::demo(Duration::ZERO)).unwrap();

            let seen = Arc::new(Mutex::new(Vec::new()));
            for status in prepared.statuses() {
                let sink = Arc::clone(&seen);
                status
                    .observe(move |info: &TaskInfo| {
                        sink.lock().unwrap().push((info.name.clone(), info.state));
                    })
                    .unwrap();
            }

            let dispatcher = runner.dispatcher.clone();
            prepared.start().join().await.unwrap();
            dispatcher.flush().await.unwrap();

            let seen = seen.lock().unwrap();
            let at = |name: &str, state| {
                seen.iter()
                    .position(|(n, s)| n == name && *s == state)
                    .unwrap()
            };
            assert!(at("first", TaskState::Succeeded) < at("second", TaskState::Running));
            assert!(at("second", TaskState::Succeeded) < at("third", TaskState::Running));
        }
    }
}
