//! Process-wide state store
//!
//! A small mutex-guarded key/value map plus monotonic counters. Contention is
//! low (status queries and per-completion increments), so a plain std mutex
//! keeps the accessors usable from both sync and async call sites.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serializable snapshot of the store, round-trippable via JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub values: HashMap<String, Value>,
    pub total_tasks_executed: u64,
}

/// Thread-safe string -> value map with execution counters
#[derive(Debug, Default)]
pub struct StateStore {
    values: Mutex<HashMap<String, Value>>,
    total_tasks_executed: AtomicU64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous entry
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut values = self.values.lock().expect("state store poisoned");
        values.insert(key.into(), value.into());
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.lock().expect("state store poisoned");
        values.get(key).cloned()
    }

    /// Remove a value, returning it if present
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut values = self.values.lock().expect("state store poisoned");
        values.remove(key)
    }

    /// Bump the lifetime completed-task counter, returning the new value
    pub fn increment_total_tasks_executed(&self) -> u64 {
        self.total_tasks_executed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn total_tasks_executed(&self) -> u64 {
        self.total_tasks_executed.load(Ordering::SeqCst)
    }

    /// Capture the current contents for persistence
    pub fn snapshot(&self) -> StateSnapshot {
        let values = self.values.lock().expect("state store poisoned");
        StateSnapshot {
            values: values.clone(),
            total_tasks_executed: self.total_tasks_executed(),
        }
    }

    /// Restore contents from a snapshot, replacing the current state
    pub fn restore(&self, snapshot: StateSnapshot) {
        let mut values = self.values.lock().expect("state store poisoned");
        *values = snapshot.values;
        self.total_tasks_executed.store(snapshot.total_tasks_executed, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = StateStore::new();
        store.set("task_count", 3);
        assert_eq!(store.get("task_count"), Some(serde_json::json!(3)));

        assert_eq!(store.remove("task_count"), Some(serde_json::json!(3)));
        assert_eq!(store.get("task_count"), None);
        assert_eq!(store.remove("task_count"), None);
    }

    #[test]
    fn test_set_replaces() {
        let store = StateStore::new();
        store.set("current_task", "a");
        store.set("current_task", "b");
        assert_eq!(store.get("current_task"), Some(serde_json::json!("b")));
    }

    #[test]
    fn test_counter_monotonic() {
        let store = StateStore::new();
        assert_eq!(store.total_tasks_executed(), 0);
        assert_eq!(store.increment_total_tasks_executed(), 1);
        assert_eq!(store.increment_total_tasks_executed(), 2);
        assert_eq!(store.total_tasks_executed(), 2);
    }

    #[test]
    fn test_counter_concurrent_increments() {
        use std::sync::Arc;

        let store = Arc::new(StateStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.increment_total_tasks_executed();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.total_tasks_executed(), 800);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let store = StateStore::new();
        store.set("queued_task_count", 2);
        store.increment_total_tasks_executed();

        let snapshot = store.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: StateSnapshot = serde_json::from_str(&json).unwrap();

        let restored = StateStore::new();
        restored.restore(back);
        assert_eq!(restored.get("queued_task_count"), Some(serde_json::json!(2)));
        assert_eq!(restored.total_tasks_executed(), 1);
    }
}
