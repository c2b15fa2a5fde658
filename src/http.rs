// src/http.rs
// Shared HTTP client for the relation and feed endpoints

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER};
use tracing::warn;

use crate::config::ApiConfig;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Browser-like agent; the endpoints reject the reqwest default
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

/// Create the shared HTTP client with Referer and Cookie baked in.
///
/// This client should be created once at startup and passed to every
/// component that talks to the API. Uses connection pooling internally.
pub fn create_shared_client(api: &ApiConfig) -> reqwest::Client {
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&api.referer) {
        Ok(v) => {
            headers.insert(REFERER, v);
        }
        Err(_) => warn!(referer = %api.referer, "Invalid Referer header, omitting"),
    }
    if let Some(cookie) = &api.cookie {
        match HeaderValue::from_str(cookie) {
            Ok(mut v) => {
                v.set_sensitive(true);
                headers.insert(COOKIE, v);
            }
            Err(_) => warn!("Cookie contains invalid header characters, omitting"),
        }
    }

    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent(USER_AGENT)
        .timeout(api.timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(4)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
