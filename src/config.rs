// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Runtime configuration
// The provider takes no configuration from the host; the only knobs are
// environment variables controlling diagnostics.

use std::path::PathBuf;

pub const ENV_LOG_LEVEL: &str = "FIPS_PROV_LOG_LEVEL";
pub const ENV_LOG_FILE: &str = "FIPS_PROV_LOG_FILE";

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// env_logger filter directive
    pub filter: String,
    /// Append to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { filter: DEFAULT_FILTER.to_string(), file: None }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup(ENV_LOG_LEVEL)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(|v| level_filter(&v))
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        let file = lookup(ENV_LOG_FILE)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self { filter, file }
    }
}

// 0..=5 map to off..trace; anything else is taken as a filter directive
fn level_filter(value: &str) -> String {
    match value.parse::<u8>() {
        Ok(0) => "off",
        Ok(1) => "error",
        Ok(2) => "warn",
        Ok(3) => "info",
        Ok(4) => "debug",
        Ok(_) => "trace",
        Err(_) => return value.to_string(),
    }
    .to_string()
}
