// src/api/client.rs
// reqwest implementation of the relation and feed collaborators

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{ApiEnvelope, FeedApi, FeedResponse, Group, MemberPage, RelationApi};
use crate::config::ApiConfig;
use crate::error::Result;
use crate::feed::middleware::FEED_PATH;
use crate::http::create_shared_client;
use crate::utils::normalize_id;

const TAGS_PATH: &str = "/x/relation/tags";
const TAG_MEMBERS_PATH: &str = "/x/relation/tag";

/// Client for the relation and dynamic-feed endpoints
#[derive(Clone)]
pub struct BiliClient {
    http: reqwest::Client,
    base_url: String,
}

impl BiliClient {
    pub fn new(api: &ApiConfig) -> Self {
        Self::with_http_client(create_shared_client(api), &api.base_url)
    }

    /// Create a client on top of an existing shared reqwest client
    pub fn with_http_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_envelope<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let envelope: ApiEnvelope<T> = self
            .http
            .get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        envelope.into_data()
    }
}

#[async_trait]
impl RelationApi for BiliClient {
    async fn list_groups(&self) -> Result<Vec<Group>> {
        let groups: Option<Vec<Group>> = self.get_envelope(&self.url(TAGS_PATH), &[]).await?;
        let groups = groups.unwrap_or_default();
        debug!(count = groups.len(), "Fetched follow groups");
        Ok(groups)
    }

    async fn group_members_page(
        &self,
        group_id: i64,
        page: u32,
        page_size: usize,
    ) -> Result<MemberPage> {
        let query = [
            ("tagid", group_id.to_string()),
            ("pn", page.to_string()),
            ("ps", page_size.to_string()),
        ];
        let records: Option<Vec<Value>> =
            self.get_envelope(&self.url(TAG_MEMBERS_PATH), &query).await?;
        Ok(member_page(records.unwrap_or_default()))
    }
}

#[async_trait]
impl FeedApi for BiliClient {
    async fn fetch_feed_page(&self, offset: Option<&str>) -> Result<FeedResponse> {
        let mut request = self
            .http
            .get(self.url(FEED_PATH))
            .query(&[("type", "all"), ("timezone_offset", "-480")]);
        if let Some(offset) = offset.filter(|o| !o.is_empty()) {
            request = request.query(&[("offset", offset)]);
        }
        let response = request.send().await?.error_for_status()?;
        let url = response.url().to_string();
        let body: Value = response.json().await?;
        Ok(FeedResponse { url, body })
    }
}

/// Build a member page from raw records, keeping the raw count for the
/// "full page means more pages" rule.
fn member_page(records: Vec<Value>) -> MemberPage {
    let ids = records
        .iter()
        .filter_map(|r| r.get("mid").and_then(normalize_id))
        .collect();
    MemberPage {
        records: records.len(),
        ids,
    }
}
