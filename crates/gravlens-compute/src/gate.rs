//! Readiness gating for compute backends.
//!
//! Field evaluation must never run against a backend that has not finished
//! initialising. A [`BackendGate`] starts closed; once a backend is installed
//! with [`BackendGate::open`] it stays open for the rest of its life. Callers
//! either await the gate or ask for the backend and get
//! [`ComputeError::NotReady`] while it is closed.

use std::sync::{Arc, OnceLock};

use futures_intrusive::sync::ManualResetEvent;

use crate::backend::{ComputeBackend, ComputeError};

/// Write-once slot for the compute backend, with an awaitable open signal.
pub struct BackendGate {
    opened: ManualResetEvent,
    backend: OnceLock<Arc<dyn ComputeBackend>>,
}

impl Default for BackendGate {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendGate {
    /// Create a closed gate.
    pub fn new() -> Self {
        Self {
            opened: ManualResetEvent::new(false),
            backend: OnceLock::new(),
        }
    }

    /// Create a gate that is already open on `backend`.
    pub fn ready(backend: Arc<dyn ComputeBackend>) -> Self {
        let gate = Self::new();
        // A fresh slot is always empty.
        let _ = gate.backend.set(backend);
        gate.opened.set();
        gate
    }

    /// Install the backend and wake every waiter.
    pub fn open(&self, backend: Arc<dyn ComputeBackend>) -> Result<(), ComputeError> {
        let name = backend.device_info().name;
        self.backend
            .set(backend)
            .map_err(|_| ComputeError::AlreadyInitialised)?;
        self.opened.set();
        log::info!("Compute backend ready: {}", name);
        Ok(())
    }

    /// Whether a backend has been installed.
    pub fn is_open(&self) -> bool {
        self.opened.is_set()
    }

    /// The installed backend, or [`ComputeError::NotReady`] if the gate is closed.
    pub fn try_backend(&self) -> Result<Arc<dyn ComputeBackend>, ComputeError> {
        self.backend
            .get()
            .cloned()
            .ok_or_else(|| ComputeError::NotReady("compute backend has not been initialised".into()))
    }

    /// Wait until the gate opens, then return the backend.
    pub async fn backend(&self) -> Result<Arc<dyn ComputeBackend>, ComputeError> {
        self.opened.wait().await;
        self.try_backend()
    }

    /// Build a [`CpuBackend`](crate::CpuBackend) and open the gate on it.
    #[cfg(feature = "cpu")]
    pub async fn open_cpu(&self, num_threads: Option<usize>) -> Result<(), ComputeError> {
        let backend = crate::CpuBackend::new_async(num_threads).await?;
        self.open(Arc::new(backend))
    }
}

#[cfg(all(test, feature = "cpu"))]
mod tests {
    use super::*;
    use crate::CpuBackend;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_closed_gate_rejects() {
        let gate = BackendGate::new();
        assert!(!gate.is_open());
        assert!(matches!(gate.try_backend(), Err(ComputeError::NotReady(_))));
    }

    #[test]
    fn test_open_gate_hands_out_backend() {
        let gate = BackendGate::new();
        pollster::block_on(gate.open_cpu(Some(1))).unwrap();
        assert!(gate.is_open());
        assert!(gate.try_backend().is_ok());
    }

    #[test]
    fn test_gate_opens_once() {
        let gate = BackendGate::new();
        gate.open(Arc::new(CpuBackend::with_threads(1).unwrap())).unwrap();
        let second = gate.open(Arc::new(CpuBackend::with_threads(1).unwrap()));
        assert!(matches!(second, Err(ComputeError::AlreadyInitialised)));
    }

    #[test]
    fn test_waiter_resumes_after_open() {
        let gate = Arc::new(BackendGate::new());
        let opener = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                gate.open(Arc::new(CpuBackend::with_threads(1).unwrap())).unwrap();
            })
        };

        let backend = pollster::block_on(gate.backend()).unwrap();
        assert_eq!(backend.device_info().compute_units, Some(1));
        opener.join().unwrap();
    }
}
