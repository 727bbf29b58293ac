// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Logging utilities

use crate::config::LogConfig;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the logging system from FIPS_PROV_LOG_LEVEL / FIPS_PROV_LOG_FILE.
/// Safe to call on every load; only the first call configures anything, and
/// a logger installed by the host process is left alone.
pub fn init_logging() {
    INIT.call_once(|| {
        let config = LogConfig::from_env();

        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&config.filter);
        builder.format_timestamp_millis();

        builder.format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.module_path().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        if let Some(ref path) = config.file {
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(e) => {
                    eprintln!("FIPS Provider: Failed to open log file {}: {}", path.display(), e);
                    eprintln!("FIPS Provider: Falling back to stderr logging");
                }
            }
        }

        if builder.try_init().is_err() {
            log::debug!("init_logging: a logger is already installed");
        }
    });
}

/// Trace logging that skips formatting unless trace is enabled.
/// Used on per-call paths such as digest updates.
#[macro_export]
macro_rules! trace_opt {
    ($($arg:tt)*) => {
        if log::log_enabled!(log::Level::Trace) {
            log::trace!($($arg)*);
        }
    };
}
