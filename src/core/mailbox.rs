//! Single-slot observable values and one-shot completion observers.
//!
//! A [`Mailbox`] holds the latest published value. Publishing and
//! subscribing both go through the [`Dispatcher`], so subscribers always run
//! on the delivery thread, in publish order. A new subscriber is handed the
//! current value straight away, if there is one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::dispatcher::{DispatchError, Dispatcher};

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slot<T> {
    value: Option<T>,
    version: u64,
    subscribers: Vec<Subscriber<T>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Last-write-wins observable value
pub struct Mailbox<T> {
    slot: Arc<Mutex<Slot<T>>>,
    dispatcher: Dispatcher,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = lock(&self.slot);
        f.debug_struct("Mailbox")
            .field("version", &slot.version)
            .field("subscribers", &slot.subscribers.len())
            .finish()
    }
}

impl<T> Mailbox<T>
where
    T: Clone + Send + 'static,
{
    /// Create an empty mailbox delivering on `dispatcher`
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                value: None,
                version: 0,
                subscribers: Vec::new(),
            })),
            dispatcher,
        }
    }

    /// Replace the value and notify every subscriber on the delivery thread
    pub fn publish(&self, value: T) -> Result<(), DispatchError> {
        let slot = Arc::clone(&self.slot);
        self.dispatcher.post(move || {
            let subscribers = {
                let mut guard = lock(&slot);
                guard.value = Some(value.clone());
                guard.version += 1;
                guard.subscribers.clone()
            };
            for subscriber in &subscribers {
                subscriber(&value);
            }
        })
    }

    /// Register a callback for every future value.
    ///
    /// If a value has already been delivered, the callback receives it first.
    pub fn observe<F>(&self, callback: F) -> Result<(), DispatchError>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let slot = Arc::clone(&self.slot);
        let callback: Subscriber<T> = Arc::new(callback);
        self.dispatcher.post(move || {
            let current = {
                let mut guard = lock(&slot);
                guard.subscribers.push(Arc::clone(&callback));
                guard.value.clone()
            };
            if let Some(value) = current {
                callback(&value);
            }
        })
    }

    /// Latest delivered value
    pub fn value(&self) -> Option<T> {
        lock(&self.slot).value.clone()
    }

    /// Number of values delivered so far
    pub fn version(&self) -> u64 {
        lock(&self.slot).version
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

/// Fires an action exactly once, on the first value matching a predicate.
///
/// Later matches, including the replay a re-subscription would get, are
/// ignored.
#[derive(Debug, Clone)]
pub struct CompletionObserver {
    fired: Arc<AtomicBool>,
}

impl CompletionObserver {
    pub fn watch<T, P, A>(mailbox: &Mailbox<T>, predicate: P, action: A) -> Result<Self, DispatchError>
    where
        T: Clone + Send + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
        A: FnOnce(&T) + Send + 'static,
    {
        let fired = Arc::new(AtomicBool::new(false));
        let action = Mutex::new(Some(action));

        let flag = Arc::clone(&fired);
        mailbox.observe(move |value| {
            if !predicate(value) || flag.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Some(action) = lock(&action).take() {
                action(value);
            }
        })?;

        Ok(Self { fired })
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}
