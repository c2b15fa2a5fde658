// src/utils.rs
// Utility functions module

use chrono::{DateTime, Utc};
use serde_json::Value;

// ============================================================================
// Time source
// ============================================================================

/// Wall-clock source for cache expiry. Swapped out in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time as epoch milliseconds
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// Id normalization
// ============================================================================

/// Normalize an account id to its string form.
///
/// The relation and feed endpoints return `mid` as either a JSON number or a
/// string depending on the endpoint version. Large ids overflow `f64`, so
/// numbers are rendered from their exact JSON text. Anything that is not a
/// string or a number yields `None`.
pub fn normalize_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Truncate a string to max chars with ellipsis
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_numeric_id() {
        assert_eq!(normalize_id(&json!(12345)), Some("12345".to_string()));
    }

    #[test]
    fn test_normalize_large_numeric_id() {
        // Beyond 2^53, must not go through f64
        let v: Value = serde_json::from_str("3493118494116797").unwrap();
        assert_eq!(normalize_id(&v), Some("3493118494116797".to_string()));
    }

    #[test]
    fn test_normalize_string_id() {
        assert_eq!(normalize_id(&json!(" 42 ")), Some("42".to_string()));
        assert_eq!(normalize_id(&json!("")), None);
    }

    #[test]
    fn test_normalize_rejects_other_types() {
        assert_eq!(normalize_id(&Value::Null), None);
        assert_eq!(normalize_id(&json!(true)), None);
        assert_eq!(normalize_id(&json!({"mid": 1})), None);
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("动态分组筛选", 2), "动态...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_system_clock_millis_consistent() {
        let clock = SystemClock;
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(b >= a);
    }
}
