// src/feed/engine.rs
// Feed filter engine: owns the live session and filters feed pages against it

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::item::{FeedPage, filter_items, rewrite_envelope};
use super::middleware::ResponseTransform;
use super::session::{ActiveGroup, FilterSession, SessionGeneration};
use super::stats::FilterStats;
use crate::config::FilterConfig;
use crate::display::{FilterObserver, status_line};
use crate::error::Result;
use crate::membership::MembershipCache;
use crate::store::{self, KeyValueStore, CURRENT_GROUP_ID, CURRENT_GROUP_NAME};
use crate::tasks::backfill::{BackfillDecision, BackfillDriver, BackfillState, ContinuationTrigger};

/// Result of a manual group selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The group is now active
    Selected { members: usize, complete: bool },
    /// The group has no reachable members; the previous session is kept
    Empty,
    /// Another select/clear happened while members were loading
    Superseded,
}

/// Filters feed pages against the active group's membership.
///
/// Starts uninitialized: no page is judged until `initialize` has restored
/// the persisted selection. Pages are handled one at a time in arrival order.
pub struct FeedFilterEngine {
    cache: MembershipCache,
    store: Arc<dyn KeyValueStore>,
    observer: Arc<dyn FilterObserver>,
    backfill: BackfillDriver,
    generation: SessionGeneration,
    /// Ticket of the most recent select/clear/initialize request
    requests: AtomicU64,
    /// Continuations scheduled so far, across sessions
    scheduled: AtomicU64,
    session: Mutex<FilterSession>,
    /// FIFO turn for page processing
    page_turn: Mutex<()>,
    init_started: AtomicBool,
    ready: watch::Sender<bool>,
    feed_path: String,
}

impl FeedFilterEngine {
    /// Build an engine that is not ready yet.
    ///
    /// `on_feed_page` blocks until `initialize` (or `spawn_initialize`) has
    /// run, so whoever feeds pages must start initialization first.
    pub fn new(
        cache: MembershipCache,
        store: Arc<dyn KeyValueStore>,
        observer: Arc<dyn FilterObserver>,
        trigger: Arc<dyn ContinuationTrigger>,
        config: &FilterConfig,
    ) -> Self {
        let generation = SessionGeneration::new();
        let backfill = BackfillDriver::new(
            config.backfill,
            trigger,
            observer.clone(),
            generation.clone(),
        );
        let (ready, _) = watch::channel(false);
        Self {
            cache,
            store,
            observer,
            backfill,
            generation,
            requests: AtomicU64::new(0),
            scheduled: AtomicU64::new(0),
            session: Mutex::new(FilterSession::empty(0)),
            page_turn: Mutex::new(()),
            init_started: AtomicBool::new(false),
            ready,
            feed_path: config.feed_path.clone(),
        }
    }

    // ========================================================================
    // Initialization
    // ========================================================================

    /// Restore the persisted selection, then signal readiness.
    ///
    /// Runs once; later calls just wait for the first to finish. If the
    /// persisted group now loads with no members, the persisted selection is
    /// dropped silently (unlike `select_group`, which reports `Empty`).
    pub async fn initialize(&self) {
        if self.init_started.swap(true, Ordering::SeqCst) {
            self.wait_ready().await;
            return;
        }

        let ticket = self.next_ticket();
        if let Some((group_id, name)) = store::saved_group(self.store.as_ref()) {
            info!(group_id, name = %name, "Restoring saved group");
            let load = self.cache.load_with_status(group_id).await;

            let mut session = self.session.lock().await;
            if !self.is_latest(ticket) {
                debug!(group_id, "Saved group restore superseded by a newer selection");
            } else if load.ids.is_empty() {
                warn!(group_id, "Saved group has no reachable members, dropping selection");
                self.forget_selection();
            } else {
                let group = ActiveGroup { id: group_id, name };
                info!(group_id, members = load.ids.len(), complete = load.complete, "Saved group restored");
                self.commit(&mut session, FilterSession::for_group(group, load.ids, 0));
            }
        }

        self.ready.send_replace(true);
        debug!("Filter engine ready");
    }

    /// Run `initialize` on a background task
    pub fn spawn_initialize(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move { engine.initialize().await })
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|ready| *ready).await;
    }

    // ========================================================================
    // Page filtering
    // ========================================================================

    /// Filter one feed response body.
    ///
    /// Without an active group, or for an envelope that does not look like a
    /// successful feed page, the body is returned untouched.
    pub async fn on_feed_page(&self, raw: Value) -> Value {
        let _turn = self.page_turn.lock().await;
        self.wait_ready().await;

        let mut session = self.session.lock().await;
        let Some(members) = session.active_members().cloned() else {
            return raw;
        };
        let Some(page) = FeedPage::from_envelope(&raw) else {
            warn!("Feed response is not a filterable page, passing through");
            return raw;
        };

        let filtered = filter_items(&page.items, &members);
        let stats = session.stats.record(page.items.len(), filtered.len());
        self.observer.on_stats_changed(stats);
        debug!(
            seen = page.items.len(),
            shown = filtered.len(),
            has_more = page.more_available,
            "Filtered feed page"
        );

        let mut out = raw;
        if filtered.is_empty() && page.more_available {
            let generation = session.generation;
            match self.backfill.enter_backfill(&mut session.backfill, generation) {
                BackfillDecision::Scheduled { .. } => {
                    self.scheduled.fetch_add(1, Ordering::SeqCst);
                    // Keep the page non-empty while the continuation is pending
                    let placeholder = page.items.first().cloned().into_iter().collect();
                    rewrite_envelope(&mut out, placeholder, None);
                }
                BackfillDecision::Terminal => rewrite_envelope(&mut out, filtered, None),
                BackfillDecision::Exhausted => rewrite_envelope(&mut out, filtered, Some(false)),
            }
        } else {
            let had_matches = !filtered.is_empty();
            self.backfill
                .exit_backfill(&mut session.backfill, had_matches, page.more_available);
            rewrite_envelope(&mut out, filtered, None);
        }
        out
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Select a group: refetch its members and, if any, make it the live session.
    ///
    /// An error means the session switched but the selection could not be
    /// persisted.
    pub async fn select_group(&self, group_id: i64, name: &str) -> Result<SelectOutcome> {
        let ticket = self.next_ticket();
        self.cache.invalidate(group_id);
        let load = self.cache.load_with_status(group_id).await;

        let mut session = self.session.lock().await;
        if !self.is_latest(ticket) {
            debug!(group_id, "Group selection superseded while loading members");
            return Ok(SelectOutcome::Superseded);
        }
        if load.ids.is_empty() {
            info!(group_id, "Group has no members, filter not applied");
            return Ok(SelectOutcome::Empty);
        }
        if !load.complete {
            warn!(group_id, members = load.ids.len(), "Activating group with a partial member list");
        }

        let members = load.ids.len();
        let group = ActiveGroup {
            id: group_id,
            name: name.to_string(),
        };
        self.commit(&mut session, FilterSession::for_group(group, load.ids, 0));
        info!(group_id, name, members, "Group selected");

        self.store.set(CURRENT_GROUP_ID, json!(group_id))?;
        self.store.set(CURRENT_GROUP_NAME, json!(name))?;

        Ok(SelectOutcome::Selected {
            members,
            complete: load.complete,
        })
    }

    /// Stop filtering; every page passes through from now on
    pub async fn clear_filter(&self) -> Result<()> {
        self.next_ticket();
        let mut session = self.session.lock().await;
        self.commit(&mut session, FilterSession::empty(0));
        info!("Filter cleared");

        self.store.remove(CURRENT_GROUP_ID)?;
        self.store.remove(CURRENT_GROUP_NAME)?;
        Ok(())
    }

    /// Swap in `next` under a fresh generation and tell the observer
    fn commit(&self, session: &mut FilterSession, mut next: FilterSession) {
        next.generation = self.generation.advance();
        let previous = std::mem::replace(session, next);
        if previous.backfill.loading {
            self.observer.on_backfill_state_changed(false);
        }
        self.observer.on_stats_changed(session.stats.current());
        self.observer.on_group_changed(session.group.as_ref());
    }

    fn forget_selection(&self) {
        for key in [CURRENT_GROUP_ID, CURRENT_GROUP_NAME] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "Failed to drop saved selection");
            }
        }
    }

    fn next_ticket(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.requests.load(Ordering::SeqCst) == ticket
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn cache(&self) -> &MembershipCache {
        &self.cache
    }

    pub async fn stats(&self) -> FilterStats {
        self.session.lock().await.stats.current()
    }

    pub async fn active_group(&self) -> Option<ActiveGroup> {
        self.session.lock().await.group.clone()
    }

    pub async fn backfill_state(&self) -> BackfillState {
        self.session.lock().await.backfill.clone()
    }

    pub async fn is_filtering(&self) -> bool {
        self.session.lock().await.is_filtering()
    }

    /// Number of continuations scheduled so far. A page whose handling bumps
    /// this is a placeholder: the consumer should wait for the continuation.
    pub fn continuations_scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Generation of the live session
    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    pub async fn status_line(&self) -> String {
        let session = self.session.lock().await;
        status_line(session.group.as_ref(), session.stats.current())
    }
}

#[async_trait]
impl ResponseTransform for FeedFilterEngine {
    fn matches(&self, url: &str) -> bool {
        url.contains(&self.feed_path)
    }

    async fn transform(&self, body: Value) -> Value {
        self.on_feed_page(body).await
    }
}
