// src/config/mod.rs
// Configuration: built-in defaults, overlaid by ~/.groupfeed/config.toml, overlaid by env

pub mod env;
pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::feed::middleware::FEED_PATH;
use crate::tasks::backfill::BackfillPolicy;

pub use env::EnvOverrides;
pub use file::FileConfig;

/// Default API host for the relation and feed endpoints
pub const DEFAULT_API_BASE: &str = "https://api.bilibili.com";

/// Referer the endpoints expect from the dynamic page
pub const DEFAULT_REFERER: &str = "https://t.bilibili.com/";

/// Membership entries are trusted for one hour
pub const DEFAULT_MEMBERSHIP_TTL: Duration = Duration::from_secs(3600);

/// Page size of the group members listing
pub const MEMBER_PAGE_SIZE: usize = 50;

/// Pause between member page requests
pub const DEFAULT_MEMBER_PAGE_DELAY: Duration = Duration::from_millis(50);

/// Ceiling on member pages per load (25k ids at 50 per page)
pub const DEFAULT_MAX_MEMBER_PAGES: usize = 500;

/// Remote endpoint settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub referer: String,
    /// Raw `Cookie` header value (needs at least SESSDATA)
    pub cookie: Option<String>,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            cookie: None,
            timeout: crate::http::DEFAULT_TIMEOUT,
        }
    }
}

/// Membership cache and feed filter settings
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// URL substring identifying the chronological feed listing
    pub feed_path: String,
    pub membership_ttl: Duration,
    pub member_page_size: usize,
    pub member_page_delay: Duration,
    pub max_member_pages: usize,
    pub backfill: BackfillPolicy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            feed_path: FEED_PATH.to_string(),
            membership_ttl: DEFAULT_MEMBERSHIP_TTL,
            member_page_size: MEMBER_PAGE_SIZE,
            member_page_delay: DEFAULT_MEMBER_PAGE_DELAY,
            max_member_pages: DEFAULT_MAX_MEMBER_PAGES,
            backfill: BackfillPolicy::default(),
        }
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub filter: FilterConfig,
    /// Where persisted selection and membership cache live
    pub state_path: PathBuf,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            filter: FilterConfig::default(),
            state_path: default_home().join("state.json"),
            debug: false,
        }
    }
}

impl Config {
    /// Load defaults, then the config file, then environment overrides
    pub fn load() -> Self {
        let mut config = Self::default();
        FileConfig::load().apply(&mut config);
        EnvOverrides::from_env().apply(&mut config);
        debug!(
            base_url = %config.api.base_url,
            state = %config.state_path.display(),
            cookie = config.api.cookie.is_some(),
            "Configuration resolved"
        );
        config
    }
}

/// ~/.groupfeed
pub fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".groupfeed")
}
