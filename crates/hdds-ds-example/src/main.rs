// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use clap::Parser;
use hdds_ds_example::cli::Cli;
use hdds_ds_example::logging;
use hdds_ds_example::Supervisor;
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log = match logging::init(cli.log_level) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = match cli.role_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            log.reset();
            return ExitCode::FAILURE;
        }
    };

    let supervisor = Supervisor::new(cli.supervisor_options()).with_log_handle(log);
    match supervisor.launch(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
