// src/feed/middleware.rs
// Response-transform middleware, invoked only for matching request URLs

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

/// Path of the chronological feed listing call
pub const FEED_PATH: &str = "/x/polymer/web-dynamic/v1/feed/all";

/// A transform over decoded JSON response bodies
#[async_trait]
pub trait ResponseTransform: Send + Sync {
    /// Whether this transform applies to a response for `url`
    fn matches(&self, url: &str) -> bool;

    /// Rewrite the body. Must always return a readable body; on any internal
    /// failure, return the input unchanged.
    async fn transform(&self, body: Value) -> Value;
}

/// Ordered list of transforms applied to every response
#[derive(Clone, Default)]
pub struct TransformChain {
    transforms: Vec<Arc<dyn ResponseTransform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform; transforms run in registration order
    pub fn with(mut self, transform: Arc<dyn ResponseTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Run every matching transform over `body`
    pub async fn apply(&self, url: &str, mut body: Value) -> Value {
        for transform in &self.transforms {
            if transform.matches(url) {
                body = transform.transform(body).await;
            } else {
                trace!(url, "Transform skipped, URL does not match");
            }
        }
        body
    }
}
