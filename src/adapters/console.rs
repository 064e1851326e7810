//! Terminal-backed sinks used by the CLI.

use tracing::debug;

use crate::domain::Notification;

use super::{DisplaySink, NotificationSink};

/// Prints messages to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleDisplay;

impl DisplaySink for ConsoleDisplay {
    fn show(&self, message: &str) {
        debug!(%message, "Display");
        println!("▶ {}", message);
    }
}

/// Prints each notification post as a line
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifications {
    /// Also print the initial foreground post
    pub show_initial: bool,
}

impl NotificationSink for ConsoleNotifications {
    fn post(&self, notification: &Notification) {
        if !notification.is_progress() && !self.show_initial {
            return;
        }
        println!(
            "  [{}] {}: {}",
            notification.notification_id, notification.title, notification.text
        );
    }

    fn cancel(&self, notification_id: u32) {
        println!("  [{}] dismissed", notification_id);
    }
}
