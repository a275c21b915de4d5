//! Background sweeper for expired store keys and idle behavior histories.

use std::sync::Arc;
use std::time::Duration;

use crate::analysis::BehaviorTracker;
use crate::store::StateStore;

/// Janitor settings
#[derive(Debug, Clone, Copy)]
pub struct JanitorConfig {
    pub interval: Duration,
    /// Histories untouched for this long are dropped
    pub history_idle: Duration,
}

/// Runs until the shutdown channel fires
pub async fn janitor_worker(
    store: Arc<dyn StateStore>,
    tracker: Arc<BehaviorTracker>,
    config: JanitorConfig,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!(
        "🧹 Janitor started (every {}s, backend: {})",
        config.interval.as_secs(),
        store.backend()
    );

    let mut ticker = tokio::time::interval(config.interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(store.as_ref(), &tracker, config, chrono::Utc::now().timestamp_millis()).await;
            }
            _ = shutdown.recv() => {
                tracing::info!("🧹 Janitor shutting down...");
                break;
            }
        }
    }
}

/// One maintenance pass
async fn sweep(store: &dyn StateStore, tracker: &BehaviorTracker, config: JanitorConfig, now_ms: i64) {
    match store.purge_expired().await {
        Ok(0) => {}
        Ok(purged) => tracing::debug!(purged, "Purged expired store keys"),
        Err(e) => tracing::error!(error = %e, "Store purge failed"),
    }

    let idle_ms = i64::try_from(config.history_idle.as_millis()).unwrap_or(i64::MAX);
    let pruned = tracker.prune(now_ms, idle_ms).await;
    if pruned > 0 {
        let tracked = tracker.identities().await;
        tracing::debug!(
            pruned,
            tracked,
            "Dropped idle behavior histories"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Attempt;
    use crate::store::MemoryStore;

    fn attempt(timestamp_ms: i64) -> Attempt {
        Attempt {
            timestamp_ms,
            reaction_ms: 400.0,
            accuracy: 0.8,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn test_sweep_drops_idle_histories() {
        let store = MemoryStore::new();
        let tracker = BehaviorTracker::new();
        tracker.record("idle", attempt(1_000)).await;
        tracker.record("busy", attempt(3_500_000)).await;

        let config = JanitorConfig {
            interval: Duration::from_secs(30),
            history_idle: Duration::from_secs(3600),
        };
        sweep(&store, &tracker, config, 3_700_000).await;

        assert_eq!(tracker.identities().await, 1);
        assert!(tracker.detect_anomalies("idle", &attempt(3_700_000)).await.flags.is_empty());
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let (tx, rx) = tokio::sync::broadcast::channel(1);
        let handle = tokio::spawn(janitor_worker(
            Arc::new(MemoryStore::new()),
            Arc::new(BehaviorTracker::new()),
            JanitorConfig {
                interval: Duration::from_millis(10),
                history_idle: Duration::from_secs(1),
            },
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
