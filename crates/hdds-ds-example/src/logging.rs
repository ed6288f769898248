// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide logging setup and teardown.

use clap::ValueEnum;
use std::io::Write;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Default filter: our own crate at `self`, dependencies at warn.
    pub fn filter(self) -> EnvFilter {
        EnvFilter::new(format!("hdds_ds_example={},warn", self.directive()))
    }
}

/// Handle on the installed subscriber, used to shut logging down.
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Silence all further log output and flush pending console output.
    ///
    /// Safe to call more than once.
    pub fn reset(&self) {
        if let Err(e) = self.filter.reload(EnvFilter::new("off")) {
            eprintln!("Failed to reset logging: {}", e);
        }
        std::io::stdout().flush().ok();
        std::io::stderr().flush().ok();
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to install log subscriber: {0}")]
pub struct LogError(#[from] tracing_subscriber::util::TryInitError);

/// Install the global subscriber. `RUST_LOG` overrides `level` when set.
pub fn init(level: LogLevel) -> Result<LogHandle, LogError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.filter());
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_names(true))
        .try_init()?;

    Ok(LogHandle { filter: handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_cli_value() {
        assert_eq!(LogLevel::from_str("warn", true).unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("loud", true).is_err());
    }

    #[test]
    fn test_init_then_reset() {
        // Only one global subscriber per process; a second init must fail.
        let handle = init(LogLevel::Info).unwrap();
        tracing::info!("before reset");
        handle.reset();
        handle.reset();
        tracing::info!("after reset");

        assert!(init(LogLevel::Info).is_err());
    }
}
