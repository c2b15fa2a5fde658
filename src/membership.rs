// src/membership.rs
// Group membership cache: TTL-bounded, persisted, single-flight per group

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::api::{Group, RelationApi};
use crate::config::FilterConfig;
use crate::store::{KeyValueStore, members_key, members_time_key};
use crate::utils::Clock;

/// Member ids of one group
pub type MemberSet = Arc<HashSet<String>>;

/// A complete membership listing and when it was fetched
#[derive(Debug, Clone)]
pub struct MembershipCacheEntry {
    pub group_id: i64,
    pub member_ids: MemberSet,
    pub fetched_at: DateTime<Utc>,
}

impl MembershipCacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age < ttl,
            Err(_) => true,
        }
    }
}

/// Outcome of a `load`: the ids, and whether they are the full listing
#[derive(Debug, Clone)]
pub struct MembershipLoad {
    pub ids: MemberSet,
    /// False when pagination stopped early on an error
    pub complete: bool,
}

type InFlight = Shared<BoxFuture<'static, MembershipLoad>>;

struct CacheInner {
    api: Arc<dyn RelationApi>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    page_size: usize,
    page_delay: Duration,
    max_pages: usize,
    entries: Mutex<HashMap<i64, MembershipCacheEntry>>,
    in_flight: Mutex<HashMap<i64, InFlight>>,
}

/// Fetches and caches the member-id set of follow groups.
///
/// Cheap to clone; clones share the same cache and in-flight table.
#[derive(Clone)]
pub struct MembershipCache {
    inner: Arc<CacheInner>,
}

impl MembershipCache {
    pub fn new(
        api: Arc<dyn RelationApi>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &FilterConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                api,
                store,
                clock,
                ttl: config.membership_ttl,
                page_size: config.member_page_size.max(1),
                page_delay: config.member_page_delay,
                max_pages: config.max_member_pages.max(1),
                entries: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Member ids of `group_id`.
    ///
    /// Served from cache while the entry is younger than the TTL. Otherwise
    /// the full member listing is paginated; concurrent callers for the same
    /// group share that single pagination. A failed pagination yields the ids
    /// gathered before the failure and leaves the cache untouched.
    pub async fn load(&self, group_id: i64) -> MemberSet {
        self.load_with_status(group_id).await.ids
    }

    /// Like `load`, but also reports whether the listing is complete
    pub async fn load_with_status(&self, group_id: i64) -> MembershipLoad {
        if let Some(entry) = self.inner.fresh_entry(group_id) {
            debug!(group_id, members = entry.member_ids.len(), "Membership cache hit");
            return MembershipLoad {
                ids: entry.member_ids,
                complete: true,
            };
        }

        let fetch = {
            let mut in_flight = match self.inner.in_flight.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(existing) = in_flight.get(&group_id) {
                debug!(group_id, "Joining in-flight membership load");
                existing.clone()
            } else {
                // A load may have stored its entry and left the table since
                // the check above
                if let Some(entry) = self.inner.fresh_entry(group_id) {
                    return MembershipLoad {
                        ids: entry.member_ids,
                        complete: true,
                    };
                }
                let inner = self.inner.clone();
                let fut = async move {
                    let loaded = inner.paginate(group_id).await;
                    if let Ok(mut in_flight) = inner.in_flight.lock() {
                        in_flight.remove(&group_id);
                    }
                    loaded
                }
                .boxed()
                .shared();
                in_flight.insert(group_id, fut.clone());
                fut
            }
        };

        fetch.await
    }

    /// Drop the cached entry for `group_id` so the next `load` refetches
    pub fn invalidate(&self, group_id: i64) {
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.remove(&group_id);
        }
        for key in [members_key(group_id), members_time_key(group_id)] {
            if let Err(e) = self.inner.store.remove(&key) {
                warn!(group_id, error = %e, "Failed to drop persisted membership");
            }
        }
        debug!(group_id, "Membership cache invalidated");
    }

    /// Invalidate every listed group plus any extra ids (e.g. the active one)
    pub fn clear_all(&self, groups: &[Group], extra: impl IntoIterator<Item = i64>) -> usize {
        let ids: HashSet<i64> = groups.iter().map(|g| g.id).chain(extra).collect();
        for id in &ids {
            self.invalidate(*id);
        }
        info!(groups = ids.len(), "Cleared membership cache");
        ids.len()
    }

    /// The cached entry for `group_id`, if still fresh
    pub fn cached(&self, group_id: i64) -> Option<MembershipCacheEntry> {
        self.inner.fresh_entry(group_id)
    }
}

impl CacheInner {
    fn fresh_entry(&self, group_id: i64) -> Option<MembershipCacheEntry> {
        let now = self.clock.now();

        if let Some(entry) = self.entries.lock().ok()?.get(&group_id).cloned() {
            if entry.is_fresh(now, self.ttl) {
                return Some(entry);
            }
        }

        // Fall back to the persisted copy from an earlier run
        let entry = self.persisted_entry(group_id)?;
        if !entry.is_fresh(now, self.ttl) {
            return None;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(group_id, entry.clone());
        }
        Some(entry)
    }

    fn persisted_entry(&self, group_id: i64) -> Option<MembershipCacheEntry> {
        let ids = self.store.get(&members_key(group_id))?;
        let ids: HashSet<String> = ids
            .as_array()?
            .iter()
            .filter_map(crate::utils::normalize_id)
            .collect();
        if ids.is_empty() {
            return None;
        }
        let millis = self
            .store
            .get_or(&members_time_key(group_id), json!(0))
            .as_i64()?;
        let fetched_at = Utc.timestamp_millis_opt(millis).single()?;
        Some(MembershipCacheEntry {
            group_id,
            member_ids: Arc::new(ids),
            fetched_at,
        })
    }

    async fn paginate(&self, group_id: i64) -> MembershipLoad {
        let mut ids = HashSet::new();
        let mut page: u32 = 1;

        loop {
            match self.api.group_members_page(group_id, page, self.page_size).await {
                Ok(result) => {
                    ids.extend(result.ids);
                    if result.records < self.page_size {
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        group_id,
                        page,
                        gathered = ids.len(),
                        error = %e,
                        "Membership pagination failed, returning partial result"
                    );
                    return MembershipLoad {
                        ids: Arc::new(ids),
                        complete: false,
                    };
                }
            }

            if page as usize >= self.max_pages {
                warn!(group_id, pages = page, "Member listing exceeded page ceiling, not caching");
                return MembershipLoad {
                    ids: Arc::new(ids),
                    complete: false,
                };
            }
            page += 1;
            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        let ids = Arc::new(ids);
        if ids.is_empty() {
            debug!(group_id, "Group has no members, nothing cached");
        } else {
            self.store_entry(group_id, ids.clone());
        }
        info!(group_id, members = ids.len(), pages = page, "Loaded group membership");
        MembershipLoad { ids, complete: true }
    }

    fn store_entry(&self, group_id: i64, ids: MemberSet) {
        let fetched_at = self.clock.now();
        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        let list = Value::Array(sorted.into_iter().map(|id| json!(id)).collect());

        if let Err(e) = self
            .store
            .set(&members_key(group_id), list)
            .and_then(|_| {
                self.store
                    .set(&members_time_key(group_id), json!(fetched_at.timestamp_millis()))
            })
        {
            warn!(group_id, error = %e, "Failed to persist membership");
        }

        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                group_id,
                MembershipCacheEntry {
                    group_id,
                    member_ids: ids,
                    fetched_at,
                },
            );
        }
    }
}
