// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process lifecycle supervision.
//!
//! ```text
//! launch
//!   ├─ start                  build the role, publish it in the slot
//!   ├─ run_worker             RoleApplication::run on its own thread
//!   ├─ install_signal_handlers
//!   ├─ await_completion       join (optionally bounded after a stop request)
//!   └─ logging teardown       always, once the worker is done
//! ```

mod signals;
mod slot;

pub use signals::{dispatch, shutdown_action, ShutdownAction, ShutdownSignal, SignalListener};
pub use slot::AppSlot;

use crate::app::{self, AppError, Role, RoleApplication};
use crate::config::{ConfigError, RoleConfig};
use crate::logging::LogHandle;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// How often a bounded wait re-checks the shutdown deadline.
const COMPLETION_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Give up on the worker this long after the first stop request.
    /// `None` waits indefinitely.
    pub shutdown_timeout: Option<Duration>,

    /// Install OS signal handlers while the worker runs.
    pub handle_signals: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: None,
            handle_signals: true,
        }
    }
}

/// Supervisor error types.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{role} initialization failed: {source}")]
    Initialization {
        role: Role,
        #[source]
        source: AppError,
    },

    #[error("Another application is already supervised")]
    AlreadySupervising,

    #[error("Failed to spawn {role} worker: {source}")]
    Spawn {
        role: Role,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("{role} did not stop within {timeout:?}")]
    ShutdownTimeout { role: Role, timeout: Duration },

    #[error("{role} worker panicked")]
    WorkerPanicked { role: Role },
}

/// A role application running on its worker thread.
pub struct Worker {
    role: Role,
    handle: JoinHandle<()>,
    /// Disconnects when the worker thread exits, normally or by panic.
    done: mpsc::Receiver<()>,
}

/// Drives one role application from construction to teardown.
pub struct Supervisor {
    slot: Arc<AppSlot>,
    options: SupervisorOptions,
    log: Option<LogHandle>,
}

impl Supervisor {
    /// Supervisor bound to the process-wide slot.
    pub fn new(options: SupervisorOptions) -> Self {
        Self::with_slot(AppSlot::global(), options)
    }

    pub fn with_slot(slot: Arc<AppSlot>, options: SupervisorOptions) -> Self {
        Self {
            slot,
            options,
            log: None,
        }
    }

    /// Tear this logger down once supervision ends.
    pub fn with_log_handle(mut self, log: LogHandle) -> Self {
        self.log = Some(log);
        self
    }

    pub fn slot(&self) -> &Arc<AppSlot> {
        &self.slot
    }

    /// Deliver a shutdown signal as if the OS had raised it.
    pub fn deliver(&self, signal: ShutdownSignal) -> Option<ShutdownAction> {
        dispatch(&self.slot, signal)
    }

    /// Run the configured role to completion.
    pub fn launch(&self, config: RoleConfig) -> Result<(), SupervisorError> {
        self.launch_with(config, app::create)
    }

    /// [`launch`](Self::launch) with a custom application factory.
    pub fn launch_with<F>(&self, config: RoleConfig, factory: F) -> Result<(), SupervisorError>
    where
        F: FnOnce(RoleConfig) -> Result<Arc<dyn RoleApplication>, AppError>,
    {
        let result = self.supervise(config, factory);
        if let Err(e) = &result {
            debug!("Supervision ended with error: {}", e);
        }
        self.teardown();
        result
    }

    fn supervise<F>(&self, config: RoleConfig, factory: F) -> Result<(), SupervisorError>
    where
        F: FnOnce(RoleConfig) -> Result<Arc<dyn RoleApplication>, AppError>,
    {
        let samples = config.samples();
        let app = self.start(config, factory)?;
        let role = app.role();

        let worker = match self.run_worker(app) {
            Ok(worker) => worker,
            Err(e) => {
                self.slot.clear();
                return Err(e);
            }
        };

        let signals = if self.options.handle_signals {
            match self.install_signal_handlers() {
                Ok(listener) => Some(listener),
                Err(e) => {
                    error!(category = role.name(), "{}", e);
                    self.slot.mark_stop_requested();
                    self.slot.with_app(|app| app.stop());
                    self.await_completion(worker).ok();
                    return Err(e);
                }
            }
        } else {
            None
        };

        println!("{}", banner(role, samples));

        let result = self.await_completion(worker);
        drop(signals);
        result
    }

    /// Construct the application and publish it in the slot.
    ///
    /// On failure nothing is published, so no worker or signal handler can
    /// ever reach a partially built application.
    pub fn start<F>(&self, config: RoleConfig, factory: F) -> Result<Arc<dyn RoleApplication>, SupervisorError>
    where
        F: FnOnce(RoleConfig) -> Result<Arc<dyn RoleApplication>, AppError>,
    {
        let role = config.role();
        let app = factory(config).map_err(|source| {
            error!(category = role.name(), "{}", source);
            SupervisorError::Initialization { role, source }
        })?;

        self.slot.install(app.clone()).map_err(|_| {
            error!(category = role.name(), "An application is already running");
            SupervisorError::AlreadySupervising
        })?;

        debug!(category = role.name(), "Application constructed");
        Ok(app)
    }

    /// Call `run()` on a dedicated thread.
    pub fn run_worker(&self, app: Arc<dyn RoleApplication>) -> Result<Worker, SupervisorError> {
        let role = app.role();
        let (done_tx, done) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(format!("{:?}-worker", role).to_lowercase())
            .spawn(move || {
                let _done = done_tx;
                app.run();
            })
            .map_err(|source| {
                error!(category = role.name(), "Failed to spawn worker: {}", source);
                SupervisorError::Spawn { role, source }
            })?;

        Ok(Worker { role, handle, done })
    }

    /// Route OS termination signals to the application in the slot.
    pub fn install_signal_handlers(&self) -> Result<SignalListener, SupervisorError> {
        SignalListener::install(self.slot.clone()).map_err(SupervisorError::Signals)
    }

    /// Wait for the worker to finish, then empty the slot.
    ///
    /// With a shutdown timeout, the wait is abandoned once the timeout has
    /// elapsed since the first stop request; the worker thread is detached.
    pub fn await_completion(&self, worker: Worker) -> Result<(), SupervisorError> {
        let Worker { role, handle, done } = worker;

        if let Some(timeout) = self.options.shutdown_timeout {
            loop {
                match done.recv_timeout(COMPLETION_POLL) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        let overdue = self
                            .slot
                            .stop_requested_at()
                            .is_some_and(|at| at.elapsed() >= timeout);
                        if overdue {
                            error!(
                                category = role.name(),
                                "Did not stop within {:?}, abandoning worker", timeout
                            );
                            self.slot.clear();
                            return Err(SupervisorError::ShutdownTimeout { role, timeout });
                        }
                    }
                }
            }
        }

        let joined = handle.join();
        self.slot.clear();

        match joined {
            Ok(()) => {
                info!(category = role.name(), "Execution finished");
                Ok(())
            }
            Err(_) => {
                error!(category = role.name(), "Worker panicked");
                Err(SupervisorError::WorkerPanicked { role })
            }
        }
    }

    fn teardown(&self) {
        if let Some(log) = &self.log {
            log.reset();
        }
    }
}

/// Startup notice printed once the worker is running.
pub fn banner(role: Role, samples: u32) -> String {
    if samples > 0 {
        format!(
            "{} running for {} samples. Press Ctrl+C to stop.",
            role.name(),
            samples
        )
    } else {
        format!("{} running. Press Ctrl+C to stop.", role.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner() {
        assert_eq!(
            banner(Role::Subscriber, 5),
            "Subscriber running for 5 samples. Press Ctrl+C to stop."
        );
        assert_eq!(
            banner(Role::Server, 0),
            "Discovery Server running. Press Ctrl+C to stop."
        );
    }

    #[test]
    fn test_default_options() {
        let options = SupervisorOptions::default();
        assert!(options.shutdown_timeout.is_none());
        assert!(options.handle_signals);
    }

    #[test]
    fn test_error_display() {
        let err = SupervisorError::ShutdownTimeout {
            role: Role::Publisher,
            timeout: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "Publisher did not stop within 2s");
    }
}
