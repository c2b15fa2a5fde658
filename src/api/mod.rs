// src/api/mod.rs
// Remote collaborators: relation (groups + members) and feed endpoints

mod client;

pub use client::BiliClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FeedError, Result};

/// Standard `{code, message, data}` envelope used by every endpoint
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// `code == 0` signals success; anything else becomes `FeedError::Api`
    pub fn into_data(self) -> Result<Option<T>> {
        if self.code != 0 {
            return Err(FeedError::Api {
                code: self.code,
                message: self.message,
            });
        }
        Ok(self.data)
    }
}

/// A follow group as reported by the relation service. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(alias = "tagid")]
    pub id: i64,
    pub name: String,
    #[serde(alias = "count", default)]
    pub reported_count: i64,
}

/// One page of the group members listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberPage {
    /// Number of records the server returned, including ones without a usable id
    pub records: usize,
    /// Normalized member ids
    pub ids: Vec<String>,
}

/// Relation service: group listing and paginated group membership
#[async_trait]
pub trait RelationApi: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<Group>>;

    /// Fetch page `page` (1-based) of `group_id`'s members
    async fn group_members_page(
        &self,
        group_id: i64,
        page: u32,
        page_size: usize,
    ) -> Result<MemberPage>;
}

/// A raw feed response and the URL it was requested from
#[derive(Debug, Clone)]
pub struct FeedResponse {
    pub url: String,
    pub body: Value,
}

/// Chronological feed source
#[async_trait]
pub trait FeedApi: Send + Sync {
    /// Fetch the page following `offset` (first page when `None`)
    async fn fetch_feed_page(&self, offset: Option<&str>) -> Result<FeedResponse>;
}
