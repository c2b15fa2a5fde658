// src/config/file.rs
// File-based configuration from ~/.groupfeed/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::Config;
use crate::error::Result;

/// Top-level config structure. Every field is optional; absent values keep
/// the built-in defaults.
#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub filter: FilterSection,
    #[serde(default)]
    pub backfill: BackfillSection,
    pub state_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiSection {
    pub base_url: Option<String>,
    pub referer: Option<String>,
    pub cookie: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct FilterSection {
    pub feed_path: Option<String>,
    pub membership_ttl_secs: Option<u64>,
    pub member_page_delay_ms: Option<u64>,
    pub max_member_pages: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct BackfillSection {
    pub base_delay_ms: Option<u64>,
    pub step_ms: Option<u64>,
    pub cap_delay_ms: Option<u64>,
    pub max_consecutive: Option<u32>,
}

impl FileConfig {
    /// Load config from ~/.groupfeed/config.toml
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from an explicit path, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Parse config file contents
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Get the config file path
    fn config_path() -> PathBuf {
        super::default_home().join("config.toml")
    }

    /// Overlay the values present in the file onto `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.api.base_url {
            config.api.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(referer) = &self.api.referer {
            config.api.referer = referer.clone();
        }
        if let Some(cookie) = self.api.cookie.as_ref().filter(|c| !c.trim().is_empty()) {
            config.api.cookie = Some(cookie.trim().to_string());
        }
        if let Some(secs) = self.api.timeout_secs {
            config.api.timeout = Duration::from_secs(secs);
        }

        if let Some(path) = &self.filter.feed_path {
            config.filter.feed_path = path.clone();
        }
        if let Some(secs) = self.filter.membership_ttl_secs {
            config.filter.membership_ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = self.filter.member_page_delay_ms {
            config.filter.member_page_delay = Duration::from_millis(ms);
        }
        if let Some(pages) = self.filter.max_member_pages {
            config.filter.max_member_pages = pages;
        }

        let policy = &mut config.filter.backfill;
        if let Some(ms) = self.backfill.base_delay_ms {
            policy.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.backfill.step_ms {
            policy.step = Duration::from_millis(ms);
        }
        if let Some(ms) = self.backfill.cap_delay_ms {
            policy.cap_delay = Duration::from_millis(ms);
        }
        if let Some(max) = self.backfill.max_consecutive {
            policy.max_consecutive = max;
        }

        if let Some(path) = &self.state_path {
            config.state_path = path.clone();
        }
    }
}
