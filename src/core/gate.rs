//! Preconditions checked before a task is dequeued.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

/// Errors evaluating a gate (as opposed to the gate being closed)
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Invalid probe address '{probe}': expected host:port")]
    InvalidProbe { probe: String },
}

/// A precondition for running gated tasks.
///
/// `Ok(false)` defers execution; `Err` means the gate could not be
/// evaluated at all.
#[async_trait]
pub trait Gate: Send + Sync {
    /// Human-readable gate name
    fn name(&self) -> &str;

    /// Evaluate the precondition
    async fn check(&self) -> Result<bool>;
}

/// Gate that is always satisfied
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOpen;

#[async_trait]
impl Gate for AlwaysOpen {
    fn name(&self) -> &str {
        "always"
    }

    async fn check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Satisfied when a TCP connection to the probe address succeeds
#[derive(Debug, Clone)]
pub struct NetworkReachable {
    probe: String,
    timeout: Duration,
}

impl NetworkReachable {
    pub fn new(probe: impl Into<String>, timeout: Duration) -> Self {
        Self {
            probe: probe.into(),
            timeout,
        }
    }

    pub fn probe(&self) -> &str {
        &self.probe
    }

    fn validate_probe(&self) -> Result<(), GateError> {
        let valid = self
            .probe
            .rsplit_once(':')
            .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
            .unwrap_or(false);

        if valid {
            Ok(())
        } else {
            Err(GateError::InvalidProbe {
                probe: self.probe.clone(),
            })
        }
    }
}

#[async_trait]
impl Gate for NetworkReachable {
    fn name(&self) -> &str {
        "network"
    }

    async fn check(&self) -> Result<bool> {
        self.validate_probe()?;

        match tokio::time::timeout(self.timeout, TcpStream::connect(self.probe.as_str())).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => {
                debug!(probe = %self.probe, error = %e, "Network probe failed");
                Ok(false)
            }
            Err(_) => {
                debug!(probe = %self.probe, timeout_ms = self.timeout.as_millis() as u64, "Network probe timed out");
                Ok(false)
            }
        }
    }
}

/// Gate backed by a closure
#[derive(Clone)]
pub struct FnGate {
    name: String,
    check: Arc<dyn Fn() -> Result<bool> + Send + Sync>,
}

impl FnGate {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }
}

#[async_trait]
impl Gate for FnGate {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<bool> {
        (self.check)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_always_open() {
        assert!(tokio_test::block_on(AlwaysOpen.check()).unwrap());
        assert_eq!(AlwaysOpen.name(), "always");
    }

    #[tokio::test]
    async fn test_fn_gate() {
        let gate = FnGate::new("closed", || Ok(false));
        assert!(!gate.check().await.unwrap());

        let broken = FnGate::new("broken", || anyhow::bail!("no radio"));
        assert!(broken.check().await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_probe_is_an_evaluation_error() {
        for probe in ["localhost", ":80", "host:notaport", ""] {
            let gate = NetworkReachable::new(probe, Duration::from_millis(100));
            assert!(gate.check().await.is_err(), "probe {probe:?} should fail");
        }
    }

    #[tokio::test]
    async fn test_reachable_listener_opens_gate() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let gate = NetworkReachable::new(addr.to_string(), Duration::from_secs(1));
        assert!(gate.check().await.unwrap());
    }

    #[tokio::test]
    async fn test_refused_connection_keeps_gate_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let gate = NetworkReachable::new(addr.to_string(), Duration::from_secs(1));
        assert!(!gate.check().await.unwrap());
    }
}
