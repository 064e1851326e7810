//! In-memory sinks that record everything they receive.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::Notification;

use super::{DisplaySink, NotificationSink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records displayed messages in order
#[derive(Debug, Default)]
pub struct MemoryDisplay {
    messages: Mutex<Vec<String>>,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

impl DisplaySink for MemoryDisplay {
    fn show(&self, message: &str) {
        lock(&self.messages).push(message.to_string());
    }
}

#[derive(Debug, Default)]
struct Tray {
    history: Vec<Notification>,
    active: HashMap<u32, Notification>,
    cancelled: Vec<u32>,
}

/// Records every post and keeps the currently shown notification per id
#[derive(Debug, Default)]
pub struct MemoryNotifications {
    tray: Mutex<Tray>,
}

impl MemoryNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every post, in order
    pub fn history(&self) -> Vec<Notification> {
        lock(&self.tray).history.clone()
    }

    /// Countdown values posted for one notification id
    pub fn progress_values(&self, notification_id: u32) -> Vec<u32> {
        lock(&self.tray)
            .history
            .iter()
            .filter(|n| n.notification_id == notification_id)
            .filter_map(|n| n.remaining)
            .collect()
    }

    /// What is currently shown for an id, if anything
    pub fn active(&self, notification_id: u32) -> Option<Notification> {
        lock(&self.tray).active.get(&notification_id).cloned()
    }

    pub fn cancelled(&self) -> Vec<u32> {
        lock(&self.tray).cancelled.clone()
    }
}

impl NotificationSink for MemoryNotifications {
    fn post(&self, notification: &Notification) {
        let mut tray = lock(&self.tray);
        tray.history.push(notification.clone());
        tray.active
            .insert(notification.notification_id, notification.clone());
    }

    fn cancel(&self, notification_id: u32) {
        let mut tray = lock(&self.tray);
        tray.active.remove(&notification_id);
        tray.cancelled.push(notification_id);
    }
}
