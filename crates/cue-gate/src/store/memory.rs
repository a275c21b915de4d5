//! In-process store backend.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use super::{StateStore, StoreError};

enum Slot {
    Text(String),
    Counter(u64),
    /// Hit timestamps (ms) of a sliding window
    Window { hits: VecDeque<i64>, window_ms: u64 },
}

struct Entry {
    slot: Slot,
    /// Epoch ms, None for windows (they expire by their own cutoff)
    expires_at: Option<i64>,
}

impl Entry {
    fn is_live(&self, now_ms: i64) -> bool {
        match (&self.slot, self.expires_at) {
            (Slot::Window { hits, window_ms }, _) => hits
                .iter()
                .any(|&t| t + *window_ms as i64 >= now_ms),
            (_, Some(expires_at)) => expires_at > now_ms,
            (_, None) => true,
        }
    }
}

/// Map-backed store for single-node deployments and tests
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Number of entries currently held (expired ones included until purged)
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn incr(&self, key: &str, ttl_ms: u64) -> Result<u64, StoreError> {
        let now = Self::now_ms();
        let mut entries = self.entries.lock().await;

        let current = match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.slot {
                Slot::Counter(count) => Some((*count, entry.expires_at)),
                Slot::Text(text) => text.parse::<u64>().ok().map(|n| (n, entry.expires_at)),
                Slot::Window { .. } => None,
            },
            _ => None,
        };

        let (count, expires_at) = match current {
            Some((count, expires_at)) => (count + 1, expires_at),
            None => (1, Some(now + ttl_ms as i64)),
        };

        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Counter(count),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn hit_window(&self, key: &str, now_ms: i64, window_ms: u64) -> Result<u64, StoreError> {
        let cutoff = now_ms - window_ms as i64;
        let mut entries = self.entries.lock().await;

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Window {
                hits: VecDeque::new(),
                window_ms,
            },
            expires_at: None,
        });

        if !matches!(entry.slot, Slot::Window { .. }) {
            entry.slot = Slot::Window {
                hits: VecDeque::new(),
                window_ms,
            };
            entry.expires_at = None;
        }

        match &mut entry.slot {
            Slot::Window { hits, window_ms: stored } => {
                *stored = window_ms;
                hits.retain(|&t| t >= cutoff);
                hits.push_back(now_ms);
                Ok(hits.len() as u64)
            }
            _ => Ok(1),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_ms: u64) -> Result<(), StoreError> {
        let now = Self::now_ms();
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at: Some(now + ttl_ms as i64),
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        let now = Self::now_ms();
        let mut entries = self.entries.lock().await;

        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at: Some(now + ttl_ms as i64),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Self::now_ms();
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        if !entry.is_live(now) {
            entries.remove(key);
            return Ok(None);
        }

        Ok(Some(match &entry.slot {
            Slot::Text(text) => text.clone(),
            Slot::Counter(count) => count.to_string(),
            Slot::Window { hits, .. } => hits.len().to_string(),
        }))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Self::now_ms();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expired_text_is_gone() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 0).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        // An expired key can be claimed again
        assert!(store.set_nx_ex("k", "w", 60_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_counter_restarts_after_expiry() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c", 0).await.unwrap(), 1);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(store.incr("c", 60_000).await.unwrap(), 1);
        assert_eq!(store.incr("c", 60_000).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_purge_drops_only_dead_entries() {
        let store = MemoryStore::new();
        store.set_ex("dead", "v", 0).await.unwrap();
        store.set_ex("alive", "v", 60_000).await.unwrap();
        let now = chrono::Utc::now().timestamp_millis();
        store.hit_window("old-window", now - 10_000, 1_000).await.unwrap();
        store.hit_window("new-window", now, 60_000).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let purged = store.purge_expired().await.unwrap();
        assert_eq!(purged, 2);
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("alive").await.unwrap().as_deref(), Some("v"));
    }
}
