//! Identities flagged after repeated failures.

use std::collections::BTreeSet;
use tokio::sync::RwLock;

/// Process-local set of suspicious identities.
/// Members are forced to HIGH risk until an admin clears the set.
#[derive(Default)]
pub struct SuspiciousSet {
    members: RwLock<BTreeSet<String>>,
}

impl SuspiciousSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the identity was newly added
    pub async fn insert(&self, identity: &str) -> bool {
        self.members.write().await.insert(identity.to_string())
    }

    pub async fn contains(&self, identity: &str) -> bool {
        self.members.read().await.contains(identity)
    }

    /// Sorted snapshot of all members
    pub async fn list(&self) -> Vec<String> {
        self.members.read().await.iter().cloned().collect()
    }

    /// Empty the set, returning how many identities were dropped
    pub async fn clear(&self) -> usize {
        let mut members = self.members.write().await;
        let cleared = members.len();
        members.clear();
        cleared
    }
}
