//! Main orchestrator.
//!
//! Wires task completions to countdown notifiers and notifier completions
//! to the display:
//!
//! - every finished task is announced ("Second process is done")
//! - the *second* task's completion launches the primary notifier
//! - the *third* task's completion launches the secondary notifier
//! - each notifier's completion is announced and handed to the listener
//!
//! The trigger positions are fixed; the primary notifier is deliberately
//! not tied to the first task.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::adapters::{DisplaySink, NotificationSink};
use crate::domain::{
    CompletionSignal, EventType, Journal, NotifierProfile, TaskInfo, TaskState,
};

use super::countdown::{CountdownNotifier, NotifierError};
use super::dispatcher::Dispatcher;
use super::gate::Gate;
use super::mailbox::{CompletionObserver, Mailbox};
use super::pipeline::Pipeline;
use super::runner::{PipelineHandle, PipelineRunner};

/// Index of the task whose completion launches the primary notifier
const PRIMARY_TRIGGER: usize = 1;

/// Index of the task whose completion launches the secondary notifier
const SECONDARY_TRIGGER: usize = 2;

const NOTIFIER_COUNT: usize = 2;

/// Timing and notifier profiles for an orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Sleep before each countdown update
    pub tick_interval: Duration,

    /// How often a closed gate is re-checked
    pub gate_poll_interval: Duration,

    /// Launched after the second task
    pub primary: NotifierProfile,

    /// Launched after the third task
    pub secondary: NotifierProfile,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            gate_poll_interval: Duration::from_secs(1),
            primary: NotifierProfile::primary(),
            secondary: NotifierProfile::secondary(),
        }
    }
}

impl OrchestratorSettings {
    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick_interval = tick;
        self
    }

    pub fn with_gate_poll_interval(mut self, poll: Duration) -> Self {
        self.gate_poll_interval = poll;
        self
    }
}

type Listener = mpsc::UnboundedSender<Result<CompletionSignal, NotifierError>>;

/// Main orchestrator
pub struct Orchestrator {
    settings: OrchestratorSettings,
    dispatcher: Dispatcher,
    runner: PipelineRunner,
    display: Arc<dyn DisplaySink>,
    notifications: Arc<dyn NotificationSink>,
    journal: Journal,
}

impl Orchestrator {
    /// Create an orchestrator with its own delivery thread
    pub fn new(
        settings: OrchestratorSettings,
        gate: Arc<dyn Gate>,
        display: Arc<dyn DisplaySink>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let dispatcher = Dispatcher::spawn("taskchain-delivery")
            .context("Failed to start delivery thread")?;
        let journal = Journal::new();
        let runner = PipelineRunner::new(gate, dispatcher.clone(), settings.gate_poll_interval)
            .with_journal(journal.clone());

        Ok(Self {
            settings,
            dispatcher,
            runner,
            display,
            notifications,
            journal,
        })
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Start the pipeline and wire up both notifiers.
    ///
    /// Must be called from within a Tokio runtime. Returns as soon as the
    /// pipeline is enqueued.
    #[instrument(skip(self, pipeline), fields(pipeline = %pipeline.name))]
    pub fn start(&self, pipeline: &Pipeline) -> Result<OrchestrationHandle> {
        if pipeline.tasks.len() <= SECONDARY_TRIGGER {
            anyhow::bail!(
                "Pipeline '{}' needs at least {} tasks, has {}",
                pipeline.name,
                SECONDARY_TRIGGER + 1,
                pipeline.tasks.len()
            );
        }

        let runtime = Handle::current();
        let (listener, completions) = mpsc::unbounded_channel();

        let primary = self.notifier(&self.settings.primary);
        let secondary = self.notifier(&self.settings.secondary);
        let primary_completion = primary.completion().clone();
        let secondary_completion = secondary.completion().clone();

        self.watch_notifier(&primary, listener.clone())?;
        self.watch_notifier(&secondary, listener.clone())?;

        let prepared = self
            .runner
            .prepare(pipeline)
            .context("Failed to enqueue pipeline")?;

        let mut primary = Some(primary);
        let mut secondary = Some(secondary);
        for (idx, task) in pipeline.tasks.iter().enumerate() {
            let status = prepared
                .status(task.key)
                .with_context(|| format!("No status stream for task '{}'", task.name))?;

            let launch = match idx {
                PRIMARY_TRIGGER => primary.take(),
                SECONDARY_TRIGGER => secondary.take(),
                _ => None,
            };

            let stage = Stage {
                name: task.name.clone(),
                done_message: task.done_message(),
                display: Arc::clone(&self.display),
                journal: self.journal.clone(),
                launch,
                listener: listener.clone(),
                runtime: runtime.clone(),
            };
            CompletionObserver::watch(status, TaskInfo::is_finished, move |info| stage.finish(info))
                .with_context(|| format!("Failed to observe task '{}'", task.name))?;
        }

        // Stages are registered before the driver can publish anything.
        let handle = prepared.start();
        info!(tasks = pipeline.tasks.len(), "Orchestration started");

        Ok(OrchestrationHandle {
            pipeline: handle,
            completions,
            primary_completion,
            secondary_completion,
        })
    }

    /// Start and wait for both notifiers
    pub async fn run(&self, pipeline: &Pipeline) -> Result<Vec<CompletionSignal>> {
        self.start(pipeline)?.finished().await
    }

    /// Stop the delivery thread once queued callbacks have run
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
    }

    fn notifier(&self, profile: &NotifierProfile) -> CountdownNotifier {
        CountdownNotifier::new(
            profile.clone(),
            self.settings.tick_interval,
            Arc::clone(&self.notifications),
            Mailbox::new(self.dispatcher.clone()),
            self.journal.clone(),
        )
    }

    /// Announce the notifier's completion and pass it to the listener
    fn watch_notifier(&self, notifier: &CountdownNotifier, listener: Listener) -> Result<()> {
        let profile = notifier.profile().clone();
        let display = Arc::clone(&self.display);
        let journal = self.journal.clone();

        CompletionObserver::watch(
            notifier.completion(),
            |_| true,
            move |signal: &CompletionSignal| {
                present(display.as_ref(), &journal, &profile.completion_message(signal));
                let _ = listener.send(Ok(signal.clone()));
            },
        )
        .with_context(|| format!("Failed to observe notifier '{}'", notifier.profile().name))?;

        Ok(())
    }
}

/// Reaction to one task finishing; runs on the delivery thread
struct Stage {
    name: String,
    done_message: String,
    display: Arc<dyn DisplaySink>,
    journal: Journal,
    launch: Option<CountdownNotifier>,
    listener: Listener,
    runtime: Handle,
}

impl Stage {
    fn finish(self, info: &TaskInfo) {
        if info.state != TaskState::Succeeded {
            let message = format!("{} (failed)", self.done_message);
            present(self.display.as_ref(), &self.journal, &message);
            return;
        }

        present(self.display.as_ref(), &self.journal, &self.done_message);

        let Some(notifier) = self.launch else {
            return;
        };

        let profile = notifier.profile();
        debug!(task = %self.name, notifier = %profile.name, "Launching notifier");

        match notifier.start(Some(profile.session_id.clone())) {
            Ok(countdown) => {
                // Completions arrive through the mailbox; only failures are
                // forwarded from here.
                let listener = self.listener;
                self.runtime.spawn(async move {
                    if let Err(e) = countdown.wait().await {
                        error!(error = %e, "Notifier failed");
                        let _ = listener.send(Err(e));
                    }
                });
            }
            Err(e) => {
                error!(notifier = %profile.name, error = %e, "Failed to start notifier");
                let _ = self.listener.send(Err(e));
            }
        }
    }
}

fn present(display: &dyn DisplaySink, journal: &Journal, message: &str) {
    journal.record(EventType::Displayed, message, message);
    display.show(message);
}

/// A started orchestration
pub struct OrchestrationHandle {
    pipeline: PipelineHandle,
    completions: mpsc::UnboundedReceiver<Result<CompletionSignal, NotifierError>>,
    primary_completion: Mailbox<CompletionSignal>,
    secondary_completion: Mailbox<CompletionSignal>,
}

impl OrchestrationHandle {
    /// Per-task status streams
    pub fn pipeline(&self) -> &PipelineHandle {
        &self.pipeline
    }

    /// Completion channel of the primary notifier
    pub fn primary_completion(&self) -> &Mailbox<CompletionSignal> {
        &self.primary_completion
    }

    /// Completion channel of the secondary notifier
    pub fn secondary_completion(&self) -> &Mailbox<CompletionSignal> {
        &self.secondary_completion
    }

    /// Wait for the pipeline and both notifiers.
    ///
    /// Yields the notifier completions in the order they were observed.
    pub async fn finished(mut self) -> Result<Vec<CompletionSignal>> {
        let outputs = self
            .pipeline
            .join()
            .await
            .context("Pipeline did not complete")?;
        debug!(tasks = outputs.len(), "Pipeline finished, waiting for notifiers");

        let mut signals = Vec::with_capacity(NOTIFIER_COUNT);
        while signals.len() < NOTIFIER_COUNT {
            match self.completions.recv().await {
                Some(Ok(signal)) => signals.push(signal),
                Some(Err(e)) => return Err(e).context("Notifier did not complete"),
                None => anyhow::bail!(
                    "Completion listener closed after {} of {} notifiers",
                    signals.len(),
                    NOTIFIER_COUNT
                ),
            }
        }

        info!(ids = ?signals.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), "Orchestration finished");
        Ok(signals)
    }
}
