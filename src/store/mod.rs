// src/store/mod.rs
// Persistent key-value collaborator: selection and membership cache survive restarts

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use serde_json::Value;

use crate::error::Result;

/// Key holding the persisted active group id
pub const CURRENT_GROUP_ID: &str = "current_group_id";

/// Key holding the persisted active group display name
pub const CURRENT_GROUP_NAME: &str = "current_group_name";

/// Key holding the cached member-id list of a group
pub fn members_key(group_id: i64) -> String {
    format!("members_{}", group_id)
}

/// Key holding the epoch-millis timestamp of a group's cached member list
pub fn members_time_key(group_id: i64) -> String {
    format!("members_{}_time", group_id)
}

/// Small JSON key-value store. Synchronous: values are tiny and every
/// implementation answers from memory.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Read a key, substituting `default` when absent or null
    fn get_or(&self, key: &str, default: Value) -> Value {
        match self.get(key) {
            Some(Value::Null) | None => default,
            Some(v) => v,
        }
    }
}

/// Persisted selection, if any
pub fn saved_group(store: &dyn KeyValueStore) -> Option<(i64, String)> {
    let id = store.get(CURRENT_GROUP_ID)?.as_i64()?;
    let name = store
        .get(CURRENT_GROUP_NAME)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    Some((id, name))
}
