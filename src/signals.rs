//! Operator → worker signalling.
//!
//! Uses std::sync primitives so the worker can block on it from a
//! spawn_blocking thread while the console sets flags from async code,
//! a stdin reader thread or the Ctrl-C handler.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct SignalState {
    start: bool,
    abort: bool,
}

/// What a waiting worker was woken by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Start,
    Abort,
}

/// Start/abort flags shared between the console and the worker.
///
/// Abort is sticky: once requested it stays set for the rest of the run.
/// Start is consumed by [`OperatorSignals::clear_start`] so the operator can
/// retry after a failed login check.
#[derive(Debug, Clone, Default)]
pub struct OperatorSignals {
    inner: Arc<(Mutex<SignalState>, Condvar)>,
}

impl OperatorSignals {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SignalState> {
        self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn request_start(&self) {
        self.state().start = true;
        self.inner.1.notify_all();
    }

    pub fn request_abort(&self) {
        self.state().abort = true;
        self.inner.1.notify_all();
    }

    pub fn is_abort_requested(&self) -> bool {
        self.state().abort
    }

    pub fn clear_start(&self) {
        self.state().start = false;
    }

    /// Block until start or abort is pending. Abort wins when both are.
    pub fn wait_for_start_or_abort(&self) -> Signal {
        let (lock, condvar) = &*self.inner;
        let mut state = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !state.start && !state.abort {
            state = condvar.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        if state.abort {
            Signal::Abort
        } else {
            Signal::Start
        }
    }
}
