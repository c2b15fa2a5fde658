// src/config/env.rs
// Environment-based overrides - GROUPFEED_* variables win over the config file

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use super::Config;

/// Values read from the environment
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// GROUPFEED_COOKIE
    pub cookie: Option<String>,
    /// GROUPFEED_API_BASE
    pub base_url: Option<String>,
    /// GROUPFEED_STATE
    pub state_path: Option<PathBuf>,
    /// GROUPFEED_DEBUG
    pub debug: Option<bool>,
    /// GROUPFEED_BACKFILL_CAP_MS
    pub backfill_cap_ms: Option<u64>,
    /// GROUPFEED_BACKFILL_MAX
    pub backfill_max: Option<u32>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let overrides = Self {
            cookie: read_var("GROUPFEED_COOKIE"),
            base_url: read_var("GROUPFEED_API_BASE"),
            state_path: read_var("GROUPFEED_STATE").map(PathBuf::from),
            debug: parse_bool_env("GROUPFEED_DEBUG"),
            backfill_cap_ms: parse_env("GROUPFEED_BACKFILL_CAP_MS"),
            backfill_max: parse_env("GROUPFEED_BACKFILL_MAX"),
        };
        if overrides.cookie.is_some() {
            debug!("Cookie supplied via GROUPFEED_COOKIE");
        }
        overrides
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(cookie) = &self.cookie {
            config.api.cookie = Some(cookie.clone());
        }
        if let Some(url) = &self.base_url {
            config.api.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(path) = &self.state_path {
            config.state_path = path.clone();
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }
        if let Some(ms) = self.backfill_cap_ms {
            config.filter.backfill.cap_delay = Duration::from_millis(ms);
        }
        if let Some(max) = self.backfill_max {
            config.filter.backfill.max_consecutive = max;
        }
    }
}

/// Whether verbose logging is requested by `--debug` or GROUPFEED_DEBUG.
///
/// Read ahead of `Config::load` so the subscriber is up before config
/// problems are reported.
pub fn debug_requested(cli_flag: bool) -> bool {
    cli_flag || parse_bool_env("GROUPFEED_DEBUG").unwrap_or(false)
}

/// Read a variable, filtering empty values
fn read_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = read_var(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}

fn parse_bool_env(name: &str) -> Option<bool> {
    parse_bool(&read_var(name)?)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
