// src/feed/stats.rs
// Seen/shown counters for the live filter session

use serde::Serialize;

/// Snapshot of the session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total_seen: u64,
    pub total_shown: u64,
}

impl FilterStats {
    /// Items dropped by the filter so far
    pub fn filtered_out(&self) -> u64 {
        self.total_seen - self.total_shown
    }
}

/// Running counters of items seen vs. items shown.
///
/// `total_shown <= total_seen` holds because each page records at most as
/// many shown items as it saw.
#[derive(Debug, Clone, Default)]
pub struct StatsTracker {
    stats: FilterStats,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one filtered page
    pub fn record(&mut self, seen: usize, shown: usize) -> FilterStats {
        let shown = shown.min(seen);
        self.stats.total_seen += seen as u64;
        self.stats.total_shown += shown as u64;
        self.stats
    }

    pub fn reset(&mut self) {
        self.stats = FilterStats::default();
    }

    pub fn current(&self) -> FilterStats {
        self.stats
    }
}
