// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OS signal handling.
//!
//! Signals are received on a dedicated thread running a small tokio runtime,
//! never in async-signal context. Each one is translated into a stop request
//! on whatever application the [`AppSlot`] holds at that moment.
//!
//! On Unix, SIGINT, SIGTERM, SIGQUIT and SIGHUP are handled. On Windows,
//! Ctrl+C maps to interrupt and closing the console to terminate.

use super::slot::AppSlot;
use crate::app::Role;
use std::io;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Termination signals the supervisor reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Quit,
    Hangup,
}

impl ShutdownSignal {
    pub const ALL: [ShutdownSignal; 4] = [
        Self::Interrupt,
        Self::Terminate,
        Self::Quit,
        Self::Hangup,
    ];

    /// Numeric signal value, as printed in the stop notice.
    #[cfg(unix)]
    pub fn number(self) -> i32 {
        match self {
            Self::Interrupt => libc::SIGINT,
            Self::Terminate => libc::SIGTERM,
            Self::Quit => libc::SIGQUIT,
            Self::Hangup => libc::SIGHUP,
        }
    }

    #[cfg(not(unix))]
    pub fn number(self) -> i32 {
        match self {
            Self::Interrupt => 2,
            Self::Terminate => 15,
            Self::Quit => 3,
            Self::Hangup => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Quit => "SIGQUIT",
            Self::Hangup => "SIGHUP",
        }
    }
}

/// What a signal asks of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownAction {
    Stop,
    GracefulShutdown,
}

/// SIGTERM lets a publisher drain; every other combination stops at once.
pub fn shutdown_action(role: Role, signal: ShutdownSignal) -> ShutdownAction {
    match (role, signal) {
        (Role::Publisher, ShutdownSignal::Terminate) => ShutdownAction::GracefulShutdown,
        _ => ShutdownAction::Stop,
    }
}

/// Deliver `signal` to the application held by `slot`.
///
/// Returns the action taken, or `None` if the slot was empty.
pub fn dispatch(slot: &AppSlot, signal: ShutdownSignal) -> Option<ShutdownAction> {
    slot.with_app(|app| {
        let role = app.role();
        let action = shutdown_action(role, signal);

        println!(
            "\nSignal {} received, stopping {}.",
            signal.number(),
            role.name()
        );
        info!(category = role.name(), signal = signal.name(), ?action, "Shutdown requested");

        slot.mark_stop_requested();
        match action {
            ShutdownAction::Stop => app.stop(),
            ShutdownAction::GracefulShutdown => app.graceful_shutdown(),
        }
        action
    })
}

/// Installed signal handlers. Dropping the listener uninstalls them.
pub struct SignalListener {
    stop_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SignalListener {
    /// Start listening. Returns once every handler is registered, so a
    /// signal raised after this call is guaranteed to be seen.
    pub fn install(slot: Arc<AppSlot>) -> io::Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<io::Result<()>>();
        let (stop_tx, stop_rx) = oneshot::channel();

        let thread = thread::Builder::new()
            .name("signal-listener".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                runtime.block_on(listen(slot, ready_tx, stop_rx));
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(io::Error::other("signal listener exited during setup"))
            }
        }
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn listen(
    slot: Arc<AppSlot>,
    ready: mpsc::Sender<io::Result<()>>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut signals = match SignalStreams::register() {
        Ok(signals) => signals,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));
    debug!("Signal handlers installed");

    loop {
        tokio::select! {
            received = signals.recv() => match received {
                Some(signal) => {
                    if dispatch(&slot, signal).is_none() {
                        debug!(signal = signal.name(), "No application to stop");
                    }
                }
                None => break,
            },
            _ = &mut stop_rx => break,
        }
    }
    debug!("Signal handlers removed");
}

#[cfg(unix)]
struct SignalStreams {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalStreams {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::select! {
            r = self.interrupt.recv() => r.map(|()| ShutdownSignal::Interrupt),
            r = self.terminate.recv() => r.map(|()| ShutdownSignal::Terminate),
            r = self.quit.recv() => r.map(|()| ShutdownSignal::Quit),
            r = self.hangup.recv() => r.map(|()| ShutdownSignal::Hangup),
        }
    }
}

#[cfg(windows)]
struct SignalStreams {
    ctrl_c: tokio::signal::windows::CtrlC,
    ctrl_close: tokio::signal::windows::CtrlClose,
}

#[cfg(windows)]
impl SignalStreams {
    fn register() -> io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
            ctrl_close: tokio::signal::windows::ctrl_close()?,
        })
    }

    async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::select! {
            r = self.ctrl_c.recv() => r.map(|()| ShutdownSignal::Interrupt),
            r = self.ctrl_close.recv() => r.map(|()| ShutdownSignal::Terminate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{RoleApplication, RunState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        role: Option<Role>,
        stops: AtomicUsize,
        graceful: AtomicUsize,
    }

    impl RoleApplication for Recorder {
        fn role(&self) -> Role {
            self.role.unwrap_or(Role::Subscriber)
        }
        fn run(&self) {}
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        fn graceful_shutdown(&self) {
            self.graceful.fetch_add(1, Ordering::SeqCst);
        }
        fn state(&self) -> RunState {
            RunState::Running
        }
    }

    #[test]
    fn test_only_publisher_sigterm_is_graceful() {
        for role in [Role::Publisher, Role::Subscriber, Role::Server] {
            for signal in ShutdownSignal::ALL {
                let expected = if role == Role::Publisher && signal == ShutdownSignal::Terminate {
                    ShutdownAction::GracefulShutdown
                } else {
                    ShutdownAction::Stop
                };
                assert_eq!(shutdown_action(role, signal), expected, "{role} {signal:?}");
            }
        }
    }

    #[test]
    fn test_dispatch_to_empty_slot() {
        let slot = AppSlot::new();
        assert_eq!(dispatch(&slot, ShutdownSignal::Interrupt), None);
        assert!(slot.stop_requested_at().is_none());
    }

    #[test]
    fn test_dispatch_routes_to_application() {
        let slot = AppSlot::new();
        let publisher = Arc::new(Recorder {
            role: Some(Role::Publisher),
            ..Default::default()
        });
        slot.install(publisher.clone()).ok().unwrap();

        assert_eq!(
            dispatch(&slot, ShutdownSignal::Terminate),
            Some(ShutdownAction::GracefulShutdown)
        );
        assert_eq!(
            dispatch(&slot, ShutdownSignal::Interrupt),
            Some(ShutdownAction::Stop)
        );
        assert_eq!(publisher.graceful.load(Ordering::SeqCst), 1);
        assert_eq!(publisher.stops.load(Ordering::SeqCst), 1);
        assert!(slot.stop_requested_at().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_numbers() {
        assert_eq!(ShutdownSignal::Interrupt.number(), 2);
        assert_eq!(ShutdownSignal::Terminate.number(), 15);
    }

    #[test]
    fn test_listener_install_and_drop() {
        let slot = Arc::new(AppSlot::new());
        let listener = SignalListener::install(slot).unwrap();
        drop(listener);
    }
}
