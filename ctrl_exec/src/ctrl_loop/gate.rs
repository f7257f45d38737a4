//! Proceed gate
//!
//! Holds the loop between the first solve and steady state until something outside the loop
//! opens it, such as the operator pressing enter.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex, PoisonError,
};
use std::time::Duration;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A gate which can be opened once from any thread.
#[derive(Debug, Default)]
pub struct ProceedGate {
    open: Mutex<bool>,
    cvar: Condvar,
}

/// Process wide shutdown request.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Outcome of waiting on the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Open,
    Shutdown,
    TimedOut,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ProceedGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate, waking any waiter.
    pub fn open(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cvar.notify_all();
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for the gate to open.
    ///
    /// The shutdown signal is checked before and after waiting, shutdown takes precedence over
    /// an open gate.
    pub fn wait(&self, shutdown: &ShutdownSignal, timeout: Duration) -> GateStatus {
        if shutdown.is_triggered() {
            return GateStatus::Shutdown;
        }

        let guard = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .cvar
            .wait_timeout_while(guard, timeout, |open| !*open)
            .unwrap_or_else(PoisonError::into_inner);

        if shutdown.is_triggered() {
            GateStatus::Shutdown
        } else if *guard {
            GateStatus::Open
        } else {
            GateStatus::TimedOut
        }
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_gate_times_out_while_closed() {
        let gate = ProceedGate::new();
        let shutdown = ShutdownSignal::new();

        let start = Instant::now();
        assert_eq!(
            gate.wait(&shutdown, Duration::from_millis(20)),
            GateStatus::TimedOut
        );
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_gate_opened_from_other_thread() {
        let gate = Arc::new(ProceedGate::new());
        let shutdown = ShutdownSignal::new();

        let opener = gate.clone();
        let jh = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            opener.open();
        });

        assert_eq!(
            gate.wait(&shutdown, Duration::from_secs(10)),
            GateStatus::Open
        );
        jh.join().unwrap();

        // Stays open
        assert!(gate.is_open());
        assert_eq!(gate.wait(&shutdown, Duration::from_millis(1)), GateStatus::Open);
    }

    #[test]
    fn test_shutdown_cancels_wait() {
        let gate = ProceedGate::new();
        let shutdown = ShutdownSignal::new();
        shutdown.clone().trigger();

        gate.open();
        assert_eq!(
            gate.wait(&shutdown, Duration::from_secs(10)),
            GateStatus::Shutdown
        );
    }
}
