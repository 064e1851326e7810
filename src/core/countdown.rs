//! Countdown notifiers.
//!
//! A notifier owns one dedicated OS thread for its whole lifetime. It posts
//! a foreground notification, then sleeps one tick before showing each
//! value from N down to 0, and finally publishes a [`CompletionSignal`]
//! carrying the identifier it was started with.
//!
//! The identifier is mandatory. Starting without one kills the notifier
//! thread before anything is posted; [`CountdownHandle::wait`] reports it
//! as [`NotifierError::Aborted`].

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

use crate::adapters::NotificationSink;
use crate::domain::{
    CompletionSignal, EventType, Journal, NotificationSession, NotifierProfile, NotifierState,
};

use super::dispatcher::panic_message;
use super::mailbox::Mailbox;

/// Message of the fatal missing-identifier failure
pub const MISSING_ID: &str = "identifier must be provided";

/// Errors from a countdown notifier
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Failed to spawn notifier thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Notifier '{name}' aborted: {reason}")]
    Aborted { name: String, reason: String },
}

/// Starts countdown sessions for one profile
pub struct CountdownNotifier {
    profile: NotifierProfile,
    tick: Duration,
    sink: Arc<dyn NotificationSink>,
    completion: Mailbox<CompletionSignal>,
    journal: Journal,
}

impl CountdownNotifier {
    pub fn new(
        profile: NotifierProfile,
        tick: Duration,
        sink: Arc<dyn NotificationSink>,
        completion: Mailbox<CompletionSignal>,
        journal: Journal,
    ) -> Self {
        Self {
            profile,
            tick,
            sink,
            completion,
            journal,
        }
    }

    pub fn profile(&self) -> &NotifierProfile {
        &self.profile
    }

    /// Mailbox the completion signal is published to
    pub fn completion(&self) -> &Mailbox<CompletionSignal> {
        &self.completion
    }

    /// Spawn the notifier thread.
    ///
    /// Only fails if the OS refuses the thread. A missing `id` is not
    /// reported here; it aborts the spawned thread.
    pub fn start(&self, id: Option<String>) -> Result<CountdownHandle, NotifierError> {
        let (state_tx, state_rx) = watch::channel(NotifierState::Idle);
        let (done_tx, done_rx) = oneshot::channel();

        let worker = Worker {
            profile: self.profile.clone(),
            tick: self.tick,
            sink: Arc::clone(&self.sink),
            completion: self.completion.clone(),
            journal: self.journal.clone(),
        };

        let thread = thread::Builder::new()
            .name(format!("{}-countdown", self.profile.name))
            .spawn(move || worker.run(id, state_tx, done_tx))?;

        Ok(CountdownHandle {
            name: self.profile.name.clone(),
            state: state_rx,
            done: done_rx,
            thread,
        })
    }
}

/// A running (or finished) countdown
pub struct CountdownHandle {
    name: String,
    state: watch::Receiver<NotifierState>,
    done: oneshot::Receiver<CompletionSignal>,
    thread: thread::JoinHandle<()>,
}

impl CountdownHandle {
    /// Latest state published by the notifier thread
    pub fn state(&self) -> NotifierState {
        self.state.borrow().clone()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<NotifierState> {
        self.state.clone()
    }

    /// Resolve with the completion signal, or the reason the thread died
    pub async fn wait(self) -> Result<CompletionSignal, NotifierError> {
        match self.done.await {
            Ok(signal) => Ok(signal),
            Err(_) => {
                let thread = self.thread;
                let reason = match tokio::task::spawn_blocking(move || thread.join()).await {
                    Ok(Err(payload)) => panic_message(payload.as_ref()),
                    Ok(Ok(())) => "notifier exited without completing".to_string(),
                    Err(e) => e.to_string(),
                };
                Err(NotifierError::Aborted {
                    name: self.name,
                    reason,
                })
            }
        }
    }
}

struct Worker {
    profile: NotifierProfile,
    tick: Duration,
    sink: Arc<dyn NotificationSink>,
    completion: Mailbox<CompletionSignal>,
    journal: Journal,
}

impl Worker {
    fn run(
        self,
        id: Option<String>,
        state: watch::Sender<NotifierState>,
        done: oneshot::Sender<CompletionSignal>,
    ) {
        let id = match id {
            Some(id) => id,
            None => {
                error!(notifier = %self.profile.name, "Started without an identifier");
                self.journal
                    .record(EventType::NotifierAborted, self.profile.name.clone(), MISSING_ID);
                panic!("{}", MISSING_ID);
            }
        };

        info!(
            notifier = %self.profile.name,
            %id,
            start = self.profile.start_value,
            tick_ms = self.tick.as_millis() as u64,
            "Countdown started"
        );
        self.journal.record(
            EventType::NotifierStarted,
            id.clone(),
            format!("Notifier '{}' started with id {}", self.profile.name, id),
        );
        self.sink.post(&self.profile.initial_notification());

        let mut session = NotificationSession::new(id, self.profile.start_value, self.tick);
        while !session.is_exhausted() {
            thread::sleep(session.tick);
            let Some(remaining) = session.advance() else {
                break;
            };

            let update = self.profile.progress_notification(remaining);
            self.sink.post(&update);
            self.journal
                .record(EventType::NotifierTick, session.id.clone(), update.text);
            state.send_replace(session.state().clone());
        }

        let Some(signal) = session.complete() else {
            error!(notifier = %self.profile.name, state = ?session.state(), "Countdown ended before zero");
            return;
        };

        self.journal.record(
            EventType::NotifierCompleted,
            signal.id.clone(),
            format!("Notifier '{}' completed", self.profile.name),
        );
        if let Err(e) = self.completion.publish(signal.clone()) {
            warn!(notifier = %self.profile.name, error = %e, "Completion could not be delivered");
        }
        self.sink.cancel(self.profile.notification_id);
        state.send_replace(session.state().clone());

        info!(notifier = %self.profile.name, id = %signal.id, "Countdown completed");
        let _ = done.send(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryNotifications;
    use crate::core::dispatcher::Dispatcher;

    fn notifier(profile: NotifierProfile, tray: Arc<MemoryNotifications>) -> CountdownNotifier {
        let dispatcher = Dispatcher::spawn("countdown-test").unwrap();
        CountdownNotifier::new(
            profile,
            Duration::from_millis(1),
            tray,
            Mailbox::new(dispatcher),
            Journal::new(),
        )
    }

    #[tokio::test]
    async fn test_primary_counts_ten_to_zero() {
        let tray = Arc::new(MemoryNotifications::new());
        let notifier = notifier(NotifierProfile::primary(), Arc::clone(&tray));

        let handle = notifier.start(Some("001".to_string())).unwrap();
        let signal = handle.wait().await.unwrap();

        assert_eq!(signal.id, "001");
        assert_eq!(tray.progress_values(101), (0..=10).rev().collect::<Vec<_>>());
        assert!(tray.active(101).is_none());
    }

    #[tokio::test]
    async fn test_state_ends_completed() {
        let tray = Arc::new(MemoryNotifications::new());
        let notifier = notifier(NotifierProfile::secondary(), tray);

        let handle = notifier.start(Some("002".to_string())).unwrap();
        let mut states = handle.subscribe();
        states
            .wait_for(|s| s.is_completed())
            .await
            .unwrap();

        assert_eq!(
            handle.state(),
            NotifierState::Completed {
                id: "002".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_id_aborts_without_posting() {
        let tray = Arc::new(MemoryNotifications::new());
        let notifier = notifier(NotifierProfile::primary(), Arc::clone(&tray));

        let handle = notifier.start(None).unwrap();
        let err = handle.wait().await.unwrap_err();

        match err {
            NotifierError::Aborted { name, reason } => {
                assert_eq!(name, "primary");
                assert_eq!(reason, MISSING_ID);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(tray.history().is_empty());
        assert!(notifier.completion().value().is_none());
    }
}
