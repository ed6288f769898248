// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Real OS signal delivery.
//!
//! Kept to a single test: signals are process-wide, so nothing else may run
//! in this binary.
#![cfg(unix)]

use hdds_ds_example::app::ServerApp;
use hdds_ds_example::config::{RoleConfig, ServerConfig};
use hdds_ds_example::supervisor::{AppSlot, SignalListener};
use hdds_ds_example::{RoleApplication, RunState, Supervisor, SupervisorOptions};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_sigint_stops_discovery_server() {
    // Take over SIGINT before anything can raise it, so an early signal is
    // swallowed instead of killing the test process.
    drop(SignalListener::install(Arc::new(AppSlot::new())).expect("Failed to install handlers"));

    let slot = Arc::new(AppSlot::new());
    let server: Arc<OnceLock<Arc<ServerApp>>> = Arc::new(OnceLock::new());

    let launched = {
        let supervisor = Supervisor::with_slot(slot.clone(), SupervisorOptions::default());
        let server = server.clone();
        let config = RoleConfig::Server(ServerConfig {
            listening_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..Default::default()
        });
        thread::spawn(move || {
            supervisor.launch_with(config, move |config| {
                let RoleConfig::Server(config) = config else {
                    unreachable!("server config expected");
                };
                let app = Arc::new(ServerApp::new(config)?);
                let _ = server.set(app.clone());
                Ok(app as Arc<dyn RoleApplication>)
            })
        })
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    while server.get().map(|app| app.state()) != Some(RunState::Running) {
        assert!(Instant::now() < deadline, "server never started");
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_secs(1));

    // Handlers are installed right after the worker starts; re-raise until
    // the supervisor returns in case the first one landed too early.
    while !launched.is_finished() {
        assert!(Instant::now() < deadline, "SIGINT never stopped the server");
        // SAFETY: raising a signal on the current thread has no memory effects.
        unsafe {
            libc::raise(libc::SIGINT);
        }
        thread::sleep(Duration::from_millis(200));
    }

    let result = launched.join().expect("supervisor panicked");
    assert!(result.is_ok(), "supervision failed: {result:?}");
    assert!(slot.is_empty());

    let server = server.get().expect("server was constructed");
    assert_eq!(server.state(), RunState::Stopped);
}
