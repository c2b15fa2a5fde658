// src/display.rs
// Display collaborator: receives filter status changes

use tracing::{debug, info, warn};

use crate::feed::session::ActiveGroup;
use crate::feed::stats::FilterStats;

/// Receives status changes from the filter engine and backfill driver.
///
/// Callbacks run while the engine holds its session lock; implementations
/// must not call back into the engine.
pub trait FilterObserver: Send + Sync {
    fn on_stats_changed(&self, _stats: FilterStats) {}

    /// `true` while an automatic continuation is pending
    fn on_backfill_state_changed(&self, _loading: bool) {}

    /// The consecutive-continuation cap was hit; no more automatic loading
    fn on_backfill_exhausted(&self) {}

    /// A group was selected (`Some`) or the filter cleared (`None`)
    fn on_group_changed(&self, _group: Option<&ActiveGroup>) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl FilterObserver for NullObserver {}

/// Observer that reports status through tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl FilterObserver for TracingObserver {
    fn on_stats_changed(&self, stats: FilterStats) {
        debug!(
            shown = stats.total_shown,
            filtered = stats.filtered_out(),
            "Filter stats updated"
        );
    }

    fn on_backfill_state_changed(&self, loading: bool) {
        if loading {
            debug!("No matches on this page, loading more");
        } else {
            debug!("Backfill idle");
        }
    }

    fn on_backfill_exhausted(&self) {
        warn!("Stopped loading more: too many consecutive pages without a match");
    }

    fn on_group_changed(&self, group: Option<&ActiveGroup>) {
        info!("{}", button_label(group));
    }
}

/// Label of the toggle button: the active group, or the idle prompt
pub fn button_label(group: Option<&ActiveGroup>) -> String {
    match group {
        Some(g) if !g.name.is_empty() => format!("Filtering: {}", g.name),
        Some(g) => format!("Filtering: group {}", g.id),
        None => "Group filter".to_string(),
    }
}

/// One-line status shown under the group list
pub fn status_line(group: Option<&ActiveGroup>, stats: FilterStats) -> String {
    match group {
        Some(_) => format!(
            "Filtering | shown {} item(s), filtered out {}",
            stats.total_shown,
            stats.filtered_out()
        ),
        None => "Select a group to start filtering".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> ActiveGroup {
        ActiveGroup {
            id: 3,
            name: "科技".to_string(),
        }
    }

    #[test]
    fn test_status_line_idle() {
        assert_eq!(
            status_line(None, FilterStats::default()),
            "Select a group to start filtering"
        );
    }

    #[test]
    fn test_status_line_filtering() {
        let stats = FilterStats {
            total_seen: 30,
            total_shown: 4,
        };
        let line = status_line(Some(&group()), stats);
        assert!(line.contains("shown 4"));
        assert!(line.contains("filtered out 26"));
    }

    #[test]
    fn test_button_label() {
        assert_eq!(button_label(Some(&group())), "Filtering: 科技");
        let unnamed = ActiveGroup {
            id: 9,
            name: String::new(),
        };
        assert_eq!(button_label(Some(&unnamed)), "Filtering: group 9");
        assert_eq!(button_label(None), "Group filter");
    }
}
