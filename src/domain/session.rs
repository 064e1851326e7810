//! Countdown sessions and the notifications they render.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::signal::CompletionSignal;

/// State of a countdown notifier.
///
/// `Idle → Running(N) → Running(N-1) → … → Running(0) → Completed(id)`.
/// `Completed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum NotifierState {
    Idle,
    Running { remaining: u32 },
    Completed { id: String },
}

impl NotifierState {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// One countdown run, from start to completion
#[derive(Debug, Clone)]
pub struct NotificationSession {
    /// Identifier the notifier was started with
    pub id: String,

    /// First value shown
    pub start_value: u32,

    /// Sleep before each update
    pub tick: Duration,

    state: NotifierState,
}

impl NotificationSession {
    pub fn new(id: impl Into<String>, start_value: u32, tick: Duration) -> Self {
        Self {
            id: id.into(),
            start_value,
            tick,
            state: NotifierState::Idle,
        }
    }

    pub fn state(&self) -> &NotifierState {
        &self.state
    }

    /// True once zero has been shown
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self.state,
            NotifierState::Running { remaining: 0 } | NotifierState::Completed { .. }
        )
    }

    /// Move to the next countdown value.
    ///
    /// Returns the new remaining value, or `None` once zero has already
    /// been shown (or the session is completed).
    pub fn advance(&mut self) -> Option<u32> {
        let next = match self.state {
            NotifierState::Idle => self.start_value,
            NotifierState::Running { remaining } if remaining > 0 => remaining - 1,
            _ => return None,
        };
        self.state = NotifierState::Running { remaining: next };
        Some(next)
    }

    /// Finish the session after zero was shown.
    pub fn complete(&mut self) -> Option<CompletionSignal> {
        match self.state {
            NotifierState::Running { remaining: 0 } => {
                self.state = NotifierState::Completed {
                    id: self.id.clone(),
                };
                Some(CompletionSignal::new(self.id.clone()))
            }
            _ => None,
        }
    }
}

/// Channel a notification is posted to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A posted notification. A later post with the same `notification_id`
/// replaces this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: u32,
    pub channel_id: String,
    pub title: String,
    pub text: String,

    /// Countdown value for progress updates, `None` for the initial post
    pub remaining: Option<u32>,

    pub silent: bool,
    pub ongoing: bool,
}

impl Notification {
    pub fn is_progress(&self) -> bool {
        self.remaining.is_some()
    }
}

/// Everything that distinguishes one notifier from another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierProfile {
    /// Short name, also used for the worker thread
    pub name: String,

    pub notification_id: u32,

    pub channel: NotificationChannel,

    pub title: String,

    pub initial_text: String,

    /// Progress text; `{n}` is replaced by the remaining count
    pub tick_template: String,

    pub start_value: u32,

    /// Used in "Process for {label} ID {id} is done!"
    pub completion_label: String,

    /// Identifier the orchestrator starts this notifier with
    pub session_id: String,
}

impl NotifierProfile {
    /// Ten-step notifier launched after the second task
    pub fn primary() -> Self {
        Self {
            name: "primary".to_string(),
            notification_id: 101,
            channel: NotificationChannel {
                id: "service_channel_001".to_string(),
                name: "Persistent Background Task".to_string(),
                description: "Notification channel for running foreground tasks.".to_string(),
            },
            title: "Service is Running".to_string(),
            initial_text: "A background task is currently active.".to_string(),
            tick_template: "{n} seconds until last warning".to_string(),
            start_value: 10,
            completion_label: "Notification Channel".to_string(),
            session_id: "001".to_string(),
        }
    }

    /// Five-step notifier launched after the third task
    pub fn secondary() -> Self {
        Self {
            name: "secondary".to_string(),
            notification_id: 102,
            channel: NotificationChannel {
                id: "service_channel_002".to_string(),
                name: "Second Background Task".to_string(),
                description: "Notification channel for the second foreground task.".to_string(),
            },
            title: "Second Service is Running".to_string(),
            initial_text: "Another background task is active.".to_string(),
            tick_template: "{n} seconds remaining...".to_string(),
            start_value: 5,
            completion_label: "Second Notification Channel".to_string(),
            session_id: "002".to_string(),
        }
    }

    /// The foreground notification posted before the first tick
    pub fn initial_notification(&self) -> Notification {
        Notification {
            notification_id: self.notification_id,
            channel_id: self.channel.id.clone(),
            title: self.title.clone(),
            text: self.initial_text.clone(),
            remaining: None,
            silent: false,
            ongoing: true,
        }
    }

    /// The notification shown for a given countdown value
    pub fn progress_notification(&self, remaining: u32) -> Notification {
        Notification {
            text: self.tick_template.replace("{n}", &remaining.to_string()),
            remaining: Some(remaining),
            silent: true,
            ..self.initial_notification()
        }
    }

    pub fn completion_message(&self, signal: &CompletionSignal) -> String {
        format!("Process for {} ID {} is done!", self.completion_label, signal.id)
    }
}
