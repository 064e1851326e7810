//! Sinks for the platform collaborators.
//!
//! The core never talks to a terminal or a notification tray directly; it
//! goes through these traits. Console sinks back the CLI, in-memory sinks
//! back tests and embedding.

pub mod console;
pub mod memory;

use crate::domain::Notification;

// Re-export the bundled sinks
pub use console::{ConsoleDisplay, ConsoleNotifications};
pub use memory::{MemoryDisplay, MemoryNotifications};

/// Receives user-facing messages. Fire-and-forget.
pub trait DisplaySink: Send + Sync {
    fn show(&self, message: &str);
}

/// Receives notification posts and removals.
///
/// A post replaces any earlier notification with the same id.
pub trait NotificationSink: Send + Sync {
    fn post(&self, notification: &Notification);

    fn cancel(&self, notification_id: u32);
}
