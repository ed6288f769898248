// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Run state shared between a role's worker thread and its stop callers.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Observable state of a role application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Built, `run()` not entered yet.
    Constructed,
    Running,
    /// A stop was requested; `run()` has not returned yet.
    Stopping,
    Stopped,
}

/// How the role was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    /// Abandon work as soon as possible.
    Immediate,
    /// Finish the current step and leave cleanly.
    Graceful,
}

#[derive(Debug)]
struct Inner {
    state: RunState,
    stop_kind: Option<StopKind>,
}

/// State machine guarding `run()` and the stop entry points.
///
/// ```text
/// Constructed ──begin──► Running ──request_stop──► Stopping ──finish──► Stopped
///      │                                              ▲
///      └──────────────request_stop────────────────────┘
/// ```
///
/// Only the first stop request is recorded; later ones are no-ops.
#[derive(Debug)]
pub struct Lifecycle {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RunState::Constructed,
                stop_kind: None,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.inner.lock().state
    }

    pub fn stop_kind(&self) -> Option<StopKind> {
        self.inner.lock().stop_kind
    }

    /// Enter `Running`.
    ///
    /// Returns `false` when `run()` must return right away: either a stop
    /// arrived before the worker started (the state moves to `Stopped`), or
    /// the application already ran.
    pub fn begin(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            RunState::Constructed => {
                inner.state = RunState::Running;
                self.changed.notify_all();
                true
            }
            RunState::Stopping => {
                inner.state = RunState::Stopped;
                self.changed.notify_all();
                false
            }
            RunState::Running | RunState::Stopped => false,
        }
    }

    /// Record a stop request. Returns `true` for the first request only.
    pub fn request_stop(&self, kind: StopKind) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            RunState::Constructed | RunState::Running => {
                inner.state = RunState::Stopping;
                inner.stop_kind = Some(kind);
                self.changed.notify_all();
                true
            }
            RunState::Stopping | RunState::Stopped => false,
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        matches!(
            self.inner.lock().state,
            RunState::Stopping | RunState::Stopped
        )
    }

    /// Sleep for `timeout` unless a stop request arrives first.
    ///
    /// Returns `true` if a stop was requested.
    pub fn wait_for_stop(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.state == RunState::Running || inner.state == RunState::Constructed {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        matches!(inner.state, RunState::Stopping | RunState::Stopped)
    }

    /// Mark `run()` as returned.
    pub fn finish(&self) {
        let mut inner = self.inner.lock();
        inner.state = RunState::Stopped;
        self.changed.notify_all();
    }

    /// Block until `Stopped` or the timeout elapses. Returns `true` if stopped.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.state != RunState::Stopped {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        inner.state == RunState::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_normal_lifecycle() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), RunState::Constructed);

        assert!(lifecycle.begin());
        assert_eq!(lifecycle.state(), RunState::Running);
        assert!(!lifecycle.is_stop_requested());

        assert!(lifecycle.request_stop(StopKind::Immediate));
        assert_eq!(lifecycle.state(), RunState::Stopping);

        lifecycle.finish();
        assert_eq!(lifecycle.state(), RunState::Stopped);
    }

    #[test]
    fn test_first_stop_request_wins() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin();

        assert!(lifecycle.request_stop(StopKind::Graceful));
        assert!(!lifecycle.request_stop(StopKind::Immediate));
        assert_eq!(lifecycle.stop_kind(), Some(StopKind::Graceful));
    }

    #[test]
    fn test_stop_before_begin() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.request_stop(StopKind::Immediate));

        assert!(!lifecycle.begin());
        assert_eq!(lifecycle.state(), RunState::Stopped);
    }

    #[test]
    fn test_begin_twice() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.begin());
        assert!(!lifecycle.begin());
        assert_eq!(lifecycle.state(), RunState::Running);
    }

    #[test]
    fn test_stop_after_finish_is_noop() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin();
        lifecycle.finish();

        assert!(!lifecycle.request_stop(StopKind::Immediate));
        assert_eq!(lifecycle.state(), RunState::Stopped);
        assert_eq!(lifecycle.stop_kind(), None);
    }

    #[test]
    fn test_wait_for_stop_times_out() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin();

        let start = Instant::now();
        assert!(!lifecycle.wait_for_stop(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_for_stop_wakes_on_request() {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.begin();

        let stopper = {
            let lifecycle = lifecycle.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                lifecycle.request_stop(StopKind::Immediate);
            })
        };

        let start = Instant::now();
        assert!(lifecycle.wait_for_stop(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        stopper.join().unwrap();
    }

    #[test]
    fn test_wait_stopped() {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.begin();
        assert!(!lifecycle.wait_stopped(Duration::from_millis(10)));

        let worker = {
            let lifecycle = lifecycle.clone();
            thread::spawn(move || lifecycle.finish())
        };
        assert!(lifecycle.wait_stopped(Duration::from_secs(5)));
        worker.join().unwrap();
    }
}
