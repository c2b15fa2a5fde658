// src/tasks/backfill.rs
// Automatic continuation when a filtered page comes back empty

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::display::FilterObserver;
use crate::feed::session::SessionGeneration;

/// Delay and cap policy for automatic continuations.
///
/// The delay grows linearly with the number of consecutive empty pages and
/// saturates at `cap_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillPolicy {
    pub base_delay: Duration,
    pub step: Duration,
    pub cap_delay: Duration,
    /// Consecutive continuations allowed before the session is exhausted
    pub max_consecutive: u32,
}

impl Default for BackfillPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            step: Duration::from_millis(10),
            cap_delay: Duration::from_millis(500),
            max_consecutive: 300,
        }
    }
}

impl BackfillPolicy {
    /// `min(base + consecutive * step, cap)`
    pub fn delay_for(&self, consecutive: u32) -> Duration {
        let grown = self.base_delay.saturating_add(self.step.saturating_mul(consecutive));
        grown.min(self.cap_delay)
    }
}

/// Backfill bookkeeping of one filter session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillState {
    pub consecutive_empty: u32,
    pub more_available: bool,
    /// Upstream reported the end of the feed; no more continuations
    pub terminal: bool,
    /// The consecutive cap was hit; no more continuations
    pub exhausted: bool,
    /// The "loading more" indicator is shown
    pub loading: bool,
}

impl Default for BackfillState {
    fn default() -> Self {
        Self {
            consecutive_empty: 0,
            more_available: true,
            terminal: false,
            exhausted: false,
            loading: false,
        }
    }
}

/// What `enter_backfill` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillDecision {
    /// A continuation fires after `delay`
    Scheduled { delay: Duration, attempt: u32 },
    /// The session already saw the end of the feed
    Terminal,
    /// The consecutive cap is reached
    Exhausted,
}

/// Feed-continuation collaborator: "request next page now"
#[async_trait]
pub trait ContinuationTrigger: Send + Sync {
    async fn request_next_page(&self);
}

/// Trigger that signals a channel; the feed consumer fetches on receipt
#[derive(Debug, Clone)]
pub struct ChannelTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl ChannelTrigger {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ContinuationTrigger for ChannelTrigger {
    async fn request_next_page(&self) {
        if self.tx.send(()).is_err() {
            debug!("Continuation requested after the consumer went away");
        }
    }
}

/// Decides when an emptied page triggers an automatic continuation
pub struct BackfillDriver {
    policy: BackfillPolicy,
    trigger: Arc<dyn ContinuationTrigger>,
    observer: Arc<dyn FilterObserver>,
    generation: SessionGeneration,
}

impl BackfillDriver {
    pub fn new(
        policy: BackfillPolicy,
        trigger: Arc<dyn ContinuationTrigger>,
        observer: Arc<dyn FilterObserver>,
        generation: SessionGeneration,
    ) -> Self {
        Self {
            policy,
            trigger,
            observer,
            generation,
        }
    }

    /// A page filtered to nothing while upstream has more.
    ///
    /// Schedules a continuation tagged with `session_generation`; it is
    /// dropped on wake-up if that session has been replaced.
    pub fn enter_backfill(&self, state: &mut BackfillState, session_generation: u64) -> BackfillDecision {
        if state.exhausted {
            return BackfillDecision::Exhausted;
        }
        if state.terminal {
            return BackfillDecision::Terminal;
        }
        if state.consecutive_empty >= self.policy.max_consecutive {
            warn!(
                consecutive = state.consecutive_empty,
                "Backfill cap reached, giving up on this session"
            );
            state.exhausted = true;
            self.set_loading(state, false);
            self.observer.on_backfill_exhausted();
            return BackfillDecision::Exhausted;
        }

        state.consecutive_empty += 1;
        state.more_available = true;
        let delay = self.policy.delay_for(state.consecutive_empty);
        debug!(
            attempt = state.consecutive_empty,
            delay_ms = delay.as_millis() as u64,
            "Empty page, scheduling continuation"
        );
        self.schedule(delay, session_generation);
        self.set_loading(state, true);

        BackfillDecision::Scheduled {
            delay,
            attempt: state.consecutive_empty,
        }
    }

    /// A page that either had matches or ended the feed
    pub fn exit_backfill(&self, state: &mut BackfillState, had_matches: bool, more_available: bool) {
        state.more_available = more_available;
        if had_matches {
            if state.consecutive_empty > 0 {
                debug!(skipped = state.consecutive_empty, "Backfill found matches");
            }
            state.consecutive_empty = 0;
        }
        if !more_available && !state.terminal {
            info!("Feed reports no more pages");
            state.terminal = true;
        }
        // A real page replaces whatever placeholder was showing
        self.set_loading(state, false);
    }

    fn set_loading(&self, state: &mut BackfillState, loading: bool) {
        if state.loading != loading {
            state.loading = loading;
            self.observer.on_backfill_state_changed(loading);
        }
    }

    fn schedule(&self, delay: Duration, tag: u64) {
        let trigger = self.trigger.clone();
        let generation = self.generation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !generation.is_current(tag) {
                debug!(tag, current = generation.current(), "Dropping stale continuation");
                return;
            }
            trigger.request_next_page().await;
        });
    }
}
