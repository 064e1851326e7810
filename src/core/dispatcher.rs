//! Single delivery thread for observer callbacks.
//!
//! Producers on any thread post closures; one dedicated OS thread runs them
//! in FIFO order. This is the hand-off point between worker threads and
//! observers: anything posted before a given job has run by the time that
//! job runs.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Errors from the delivery thread
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to spawn delivery thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Delivery thread has stopped")]
    Stopped,
}

/// Handle to the delivery thread. Clones post to the same thread.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Message>,
    thread_id: ThreadId,
    name: Arc<str>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("name", &self.name).finish()
    }
}

impl Dispatcher {
    /// Start a named delivery thread
    pub fn spawn(name: &str) -> Result<Self, DispatchError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                while let Some(message) = rx.blocking_recv() {
                    match message {
                        Message::Run(job) => {
                            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                                error!(
                                    thread = %thread_name,
                                    reason = %panic_message(payload.as_ref()),
                                    "Delivery callback panicked"
                                );
                            }
                        }
                        Message::Stop => break,
                    }
                }
                debug!(thread = %thread_name, "Delivery thread stopped");
            })?;

        Ok(Self {
            tx,
            thread_id: handle.thread().id(),
            name: name.into(),
        })
    }

    /// Queue a job behind everything already posted
    pub fn post<F>(&self, job: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Message::Run(Box::new(job)))
            .map_err(|_| DispatchError::Stopped)
    }

    /// Wait until every job posted so far has run
    pub async fn flush(&self) -> Result<(), DispatchError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.post(move || {
            let _ = done_tx.send(());
        })?;
        done_rx.await.map_err(|_| DispatchError::Stopped)
    }

    /// True when called from the delivery thread itself
    pub fn is_delivery_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop after the jobs already queued. Later posts fail.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Stop);
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
