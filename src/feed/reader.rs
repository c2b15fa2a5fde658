// src/feed/reader.rs
// Feed consumer: pulls pages through the transform chain, following
// automatic continuations requested by the backfill driver

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::engine::FeedFilterEngine;
use super::item::next_offset;
use super::middleware::TransformChain;
use crate::api::FeedApi;
use crate::error::Result;

/// Counters from one `FeedReader::read` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Pages requested upstream
    pub pages_fetched: usize,
    /// Pages handed to the sink
    pub pages_delivered: usize,
    pub items_delivered: usize,
    /// Pages fetched because the backfill driver asked for them
    pub continuations: usize,
}

/// Drives the feed like a scrolling client would.
///
/// A page that came back as a backfill placeholder is not delivered; the
/// reader instead waits for the driver's continuation request and fetches
/// the next page.
pub struct FeedReader {
    api: Arc<dyn FeedApi>,
    chain: TransformChain,
    engine: Arc<FeedFilterEngine>,
    continuations: mpsc::UnboundedReceiver<()>,
}

impl FeedReader {
    pub fn new(
        api: Arc<dyn FeedApi>,
        chain: TransformChain,
        engine: Arc<FeedFilterEngine>,
        continuations: mpsc::UnboundedReceiver<()>,
    ) -> Self {
        Self {
            api,
            chain,
            engine,
            continuations,
        }
    }

    /// Read until `max_pages` pages were delivered or the feed ends.
    /// `sink` receives every delivered item in order.
    pub async fn read(&mut self, max_pages: usize, mut sink: impl FnMut(&Value)) -> Result<ReadSummary> {
        let mut summary = ReadSummary::default();
        let mut offset: Option<String> = None;

        while summary.pages_delivered < max_pages {
            let response = self.api.fetch_feed_page(offset.as_deref()).await?;
            summary.pages_fetched += 1;
            let next = next_offset(&response.body);
            let scheduled_before = self.engine.continuations_scheduled();
            let body = self.chain.apply(&response.url, response.body).await;

            if self.engine.continuations_scheduled() > scheduled_before {
                debug!(page = summary.pages_fetched, "Placeholder page, waiting for continuation");
                if self.continuations.recv().await.is_none() || next.is_none() {
                    break;
                }
                summary.continuations += 1;
                offset = next;
                continue;
            }

            let items = body
                .pointer("/data/items")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for item in items {
                sink(item);
            }
            summary.items_delivered += items.len();
            summary.pages_delivered += 1;

            let has_more = body
                .pointer("/data/has_more")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !has_more || next.is_none() {
                break;
            }
            offset = next;
        }

        debug!(?summary, "Feed read finished");
        Ok(summary)
    }
}
