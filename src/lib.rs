// src/lib.rs
// groupfeed - follow-group filter for the dynamic feed

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod api;
pub mod config;
pub mod display;
pub mod error;
pub mod feed;
pub mod http;
pub mod membership;
pub mod store;
pub mod tasks;
pub mod utils;

pub use error::{FeedError, Result};
pub use feed::{FeedFilterEngine, SelectOutcome};
pub use membership::MembershipCache;
