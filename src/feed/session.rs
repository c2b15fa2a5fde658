// src/feed/session.rs
// The single live filter session and its generation counter

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::stats::StatsTracker;
use crate::membership::MemberSet;
use crate::tasks::backfill::BackfillState;

/// The group a session filters against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveGroup {
    pub id: i64,
    pub name: String,
}

/// Monotonic session counter shared by the engine and scheduled work.
///
/// Every committed session gets a new value. Work tagged with an older value
/// belongs to a superseded session and must be dropped.
#[derive(Debug, Clone, Default)]
pub struct SessionGeneration(Arc<AtomicU64>);

impl SessionGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Advance and return the new generation
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, tag: u64) -> bool {
        self.current() == tag
    }
}

/// State of the one live filter session.
///
/// Replaced wholesale on select/clear; never patched field by field from
/// outside the engine.
#[derive(Debug, Default)]
pub struct FilterSession {
    pub group: Option<ActiveGroup>,
    pub members: Option<MemberSet>,
    pub stats: StatsTracker,
    pub backfill: BackfillState,
    pub generation: u64,
}

impl FilterSession {
    /// Session with no active group
    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    /// Session filtering against `members`
    pub fn for_group(group: ActiveGroup, members: MemberSet, generation: u64) -> Self {
        Self {
            group: Some(group),
            members: Some(members),
            generation,
            ..Self::default()
        }
    }

    /// The membership set, only when a group is active and its set non-empty
    pub fn active_members(&self) -> Option<&MemberSet> {
        self.group.as_ref()?;
        self.members.as_ref().filter(|m| !m.is_empty())
    }

    pub fn is_filtering(&self) -> bool {
        self.active_members().is_some()
    }
}
