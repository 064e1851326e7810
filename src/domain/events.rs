//! Event types for the orchestration journal.
//!
//! Every stage transition is recorded as an immutable event in an
//! append-only, in-memory log. Nothing is persisted.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// Type of event
    pub event_type: EventType,

    /// Task name, notifier identifier, or pipeline name
    pub subject: String,

    /// Human-readable summary
    pub summary: String,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(event_type: EventType, subject: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            subject: subject.into(),
            summary: summary.into(),
        }
    }
}

/// Types of events that can occur during an orchestration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A pipeline was handed to the runner
    PipelineEnqueued,

    /// The gate was closed; execution deferred
    GateDeferred,

    /// A task's worker started
    TaskStarted,

    /// A task produced its result
    TaskCompleted,

    /// A task will never produce a result
    TaskFailed,

    /// A countdown notifier thread started
    NotifierStarted,

    /// A countdown notifier showed a new value
    NotifierTick,

    /// A countdown notifier signaled completion
    NotifierCompleted,

    /// A countdown notifier died before completing
    NotifierAborted,

    /// A message reached the display
    Displayed,
}

/// Shared append-only event log.
///
/// Cheap to clone; all clones append to the same log.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        // A panicking writer cannot leave a half-pushed event behind.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event
    pub fn record(&self, event_type: EventType, subject: impl Into<String>, summary: impl Into<String>) {
        let event = Event::new(event_type, subject, summary);
        tracing::debug!(event_type = ?event.event_type, subject = %event.subject, "{}", event.summary);
        self.lock().push(event);
    }

    /// Snapshot of all events, in append order
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// Position of the first event matching type and subject
    pub fn position(&self, event_type: EventType, subject: &str) -> Option<usize> {
        self.lock()
            .iter()
            .position(|e| e.event_type == event_type && e.subject == subject)
    }

    /// Subjects of all events of one type, in append order
    pub fn subjects(&self, event_type: EventType) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .map(|e| e.subject.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::new(EventType::NotifierTick, "001", "10 seconds until last warning");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event_type":"notifier_tick""#));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type, EventType::NotifierTick);
        assert_eq!(parsed.subject, "001");
    }

    #[test]
    fn test_journal_clones_share_log() {
        let journal = Journal::new();
        let other = journal.clone();

        journal.record(EventType::TaskStarted, "first", "started");
        other.record(EventType::TaskCompleted, "first", "done");

        assert_eq!(journal.len(), 2);
        assert_eq!(journal.position(EventType::TaskCompleted, "first"), Some(1));
        assert_eq!(journal.subjects(EventType::TaskStarted), vec!["first"]);
    }
}
