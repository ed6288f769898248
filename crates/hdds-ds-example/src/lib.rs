// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS Discovery Server example
//!
//! A HelloWorld publisher and subscriber that find each other through a
//! discovery server instead of multicast, plus the server itself. One binary
//! runs one role at a time:
//!
//! ```bash
//! # Terminal 1
//! hdds-ds-example server
//!
//! # Terminal 2
//! hdds-ds-example subscriber --samples 10
//!
//! # Terminal 3
//! hdds-ds-example publisher --interval 500
//! ```
//!
//! The process is driven by a [`Supervisor`]: it builds the role, runs it on a
//! worker thread, and turns SIGINT/SIGTERM/SIGQUIT/SIGHUP into a stop request.
//! SIGTERM lets a publisher leave gracefully; everything else stops at once.

pub mod app;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod logging;
pub mod supervisor;

pub use app::{Role, RoleApplication, RunState};
pub use config::RoleConfig;
pub use supervisor::{Supervisor, SupervisorError, SupervisorOptions};
