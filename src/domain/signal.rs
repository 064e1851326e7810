//! The completion payload shared by tasks and notifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Emitted when a task or a notifier finishes.
///
/// Carries nothing but the identifier the producer was started with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompletionSignal {
    pub id: String,
}

impl CompletionSignal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
