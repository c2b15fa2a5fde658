// src/feed/item.rs
// Feed envelope access and author-id extraction

use std::collections::HashSet;

use serde_json::Value;

use crate::utils::normalize_id;

/// Where an item may carry its author id, most specific first.
///
/// Dynamic items from the polymer feed nest the author under `modules`;
/// older or forwarded shapes put it at the top level.
pub const AUTHOR_ID_PATHS: [&str; 4] = [
    "/modules/module_author/mid",
    "/modules/module_author/avatar/mid",
    "/module_author/mid",
    "/author/mid",
];

/// Author id of a feed item: the first present, non-null string or number
/// along `AUTHOR_ID_PATHS`.
pub fn extract_author_id(item: &Value) -> Option<String> {
    AUTHOR_ID_PATHS
        .iter()
        .filter_map(|path| item.pointer(path))
        .filter(|v| !v.is_null())
        .find_map(normalize_id)
}

/// Items whose author belongs to `members`, in original order
pub fn filter_items(items: &[Value], members: &HashSet<String>) -> Vec<Value> {
    items
        .iter()
        .filter(|item| extract_author_id(item).is_some_and(|mid| members.contains(&mid)))
        .cloned()
        .collect()
}

/// The parts of a feed response the filter reads
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub items: Vec<Value>,
    pub more_available: bool,
}

impl FeedPage {
    /// Parse `{code: 0, data: {items: [...], has_more}}`.
    ///
    /// `None` for anything else: missing `code`/`data`/`items`, a non-zero
    /// code, or items that are not an array. A missing `has_more` reads as
    /// the end of the feed.
    pub fn from_envelope(raw: &Value) -> Option<Self> {
        if raw.get("code")?.as_i64()? != 0 {
            return None;
        }
        let data = raw.get("data")?.as_object()?;
        let items = data.get("items")?.as_array()?.clone();
        let more_available = data.get("has_more").and_then(Value::as_bool).unwrap_or(false);
        Some(Self {
            items,
            more_available,
        })
    }
}

/// Replace `data.items` in place (and optionally `data.has_more`), leaving
/// every other field of the envelope as it was.
pub fn rewrite_envelope(raw: &mut Value, items: Vec<Value>, has_more: Option<bool>) {
    let Some(data) = raw.get_mut("data").and_then(Value::as_object_mut) else {
        return;
    };
    data.insert("items".to_string(), Value::Array(items));
    if let Some(more) = has_more {
        data.insert("has_more".to_string(), Value::Bool(more));
    }
}

/// `data.offset` cursor for the next page, if any
pub fn next_offset(raw: &Value) -> Option<String> {
    match raw.pointer("/data/offset")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
