//! Per-identity rate limiting and lockout state machine.

use std::sync::Arc;

use cue_common::constants::store_keys::{FAILURES_PREFIX, LOCKOUT_PREFIX, RATELIMIT_PREFIX};
use cue_common::{RiskLevel, VerifyError};

use super::SuspiciousSet;
use crate::config::RateLimitConfig;
use crate::store::{StateStore, StoreError};

/// Gatekeeper in front of the verification pipeline
pub struct RateGuard {
    store: Arc<dyn StateStore>,
    suspicious: Arc<SuspiciousSet>,
    config: RateLimitConfig,
}

impl RateGuard {
    pub fn new(
        store: Arc<dyn StateStore>,
        suspicious: Arc<SuspiciousSet>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            suspicious,
            config,
        }
    }

    /// Admit a request: lockout first, then the sliding window.
    /// Returns the risk level the request is analyzed at.
    pub async fn admit(&self, identity: &str) -> Result<RiskLevel, VerifyError> {
        self.admit_at(identity, chrono::Utc::now().timestamp_millis())
            .await
    }

    pub async fn admit_at(&self, identity: &str, now_ms: i64) -> Result<RiskLevel, VerifyError> {
        if self.is_locked(identity).await {
            tracing::debug!(identity = %identity, "Rejected locked identity");
            return Err(VerifyError::Locked);
        }

        let count = self.increment_at(identity, now_ms).await?;

        if count > self.config.max_requests {
            let failures = self.record_failure(identity).await?;
            self.lock_if_exhausted(identity, failures).await?;
            tracing::debug!(identity = %identity, count = count, "Rate limit exceeded");
            return Err(VerifyError::RateLimited);
        }

        Ok(self.risk_level(identity, count).await)
    }

    /// Count a request at `now_ms` in the identity's sliding window
    pub async fn increment_at(&self, identity: &str, now_ms: i64) -> Result<u64, StoreError> {
        self.store
            .hit_window(
                &format!("{}{}", RATELIMIT_PREFIX, identity),
                now_ms,
                self.config.window_secs * 1000,
            )
            .await
    }

    pub async fn lock(&self, identity: &str, duration_ms: u64) -> Result<(), StoreError> {
        self.store
            .set_ex(&format!("{}{}", LOCKOUT_PREFIX, identity), "1", duration_ms)
            .await
    }

    /// Fails closed: a store error counts as locked
    pub async fn is_locked(&self, identity: &str) -> bool {
        match self
            .store
            .get(&format!("{}{}", LOCKOUT_PREFIX, identity))
            .await
        {
            Ok(marker) => marker.is_some(),
            Err(e) => {
                tracing::error!(identity = %identity, error = %e, "Lockout lookup failed");
                true
            }
        }
    }

    /// Increment the failure counter, returning the new count
    pub async fn record_failure(&self, identity: &str) -> Result<u64, StoreError> {
        self.store
            .incr(
                &format!("{}{}", FAILURES_PREFIX, identity),
                self.config.failure_ttl_secs * 1000,
            )
            .await
    }

    pub async fn reset_failures(&self, identity: &str) -> Result<(), StoreError> {
        self.store
            .delete(&format!("{}{}", FAILURES_PREFIX, identity))
            .await
    }

    /// Record a counted verification failure.
    /// Repeat offenders become suspicious, then locked out.
    pub async fn note_failure(&self, identity: &str) -> Result<u64, StoreError> {
        let failures = self.record_failure(identity).await?;
        if failures > self.config.suspicious_after_failures
            && self.suspicious.insert(identity).await
        {
            tracing::warn!(identity = %identity, failures = failures, "Identity marked suspicious");
        }
        self.lock_if_exhausted(identity, failures).await?;
        Ok(failures)
    }

    /// Failures from rejected verifications and rate excess share one counter
    async fn lock_if_exhausted(&self, identity: &str, failures: u64) -> Result<(), StoreError> {
        if failures <= self.config.max_failures {
            return Ok(());
        }
        self.lock(identity, self.config.lockout_secs * 1000).await?;
        tracing::warn!(
            identity = %identity,
            failures = failures,
            lockout_secs = self.config.lockout_secs,
            "Identity locked out"
        );
        Ok(())
    }

    async fn risk_level(&self, identity: &str, count: u64) -> RiskLevel {
        if self.suspicious.contains(identity).await {
            RiskLevel::High
        } else if count > self.config.medium_risk_requests {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    fn guard() -> (RateGuard, Arc<SuspiciousSet>) {
        let suspicious = Arc::new(SuspiciousSet::new());
        let guard = RateGuard::new(
            Arc::new(MemoryStore::new()),
            suspicious.clone(),
            RateLimitConfig::default(),
        );
        (guard, suspicious)
    }

    #[tokio::test]
    async fn test_hundred_and_first_request_limited() {
        let (guard, _) = guard();
        let now = chrono::Utc::now().timestamp_millis();

        for i in 0..100 {
            assert!(guard.admit_at("1.2.3.4", now + i).await.is_ok(), "request {}", i + 1);
        }
        let err = guard.admit_at("1.2.3.4", now + 100).await.unwrap_err();
        assert!(matches!(err, VerifyError::RateLimited));
        assert_eq!(err.status_code(), 429);

        // Other identities are unaffected
        assert!(guard.admit_at("5.6.7.8", now + 100).await.is_ok());
    }

    #[tokio::test]
    async fn test_sixth_excess_locks_identity() {
        let (guard, _) = guard();
        let now = chrono::Utc::now().timestamp_millis();

        for i in 0..100 {
            guard.admit_at("ip", now + i).await.unwrap();
        }
        for i in 0..6 {
            let err = guard.admit_at("ip", now + 100 + i).await.unwrap_err();
            assert!(matches!(err, VerifyError::RateLimited));
        }
        assert!(guard.is_locked("ip").await);

        let err = guard.admit_at("ip", now + 200).await.unwrap_err();
        assert!(matches!(err, VerifyError::Locked));
    }

    #[tokio::test]
    async fn test_old_hits_leave_the_window() {
        let (guard, _) = guard();
        let start = chrono::Utc::now().timestamp_millis();

        for i in 0..100 {
            guard.admit_at("ip", start + i).await.unwrap();
        }
        // 15 minutes later the window has drained
        let later = start + 15 * 60 * 1000 + 1_000;
        assert_eq!(guard.admit_at("ip", later).await.unwrap(), RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_risk_levels() {
        let (guard, suspicious) = guard();
        let now = chrono::Utc::now().timestamp_millis();

        for i in 0..50 {
            assert_eq!(guard.admit_at("busy", now + i).await.unwrap(), RiskLevel::Low);
        }
        assert_eq!(guard.admit_at("busy", now + 50).await.unwrap(), RiskLevel::Medium);

        suspicious.insert("flagged").await;
        assert_eq!(guard.admit_at("flagged", now).await.unwrap(), RiskLevel::High);
    }

    #[tokio::test]
    async fn test_fourth_failure_marks_suspicious() {
        let (guard, suspicious) = guard();
        for _ in 0..3 {
            guard.note_failure("ip").await.unwrap();
        }
        assert!(!suspicious.contains("ip").await);
        assert_eq!(guard.note_failure("ip").await.unwrap(), 4);
        assert!(suspicious.contains("ip").await);

        guard.reset_failures("ip").await.unwrap();
        assert_eq!(guard.record_failure("ip").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failures_and_excess_share_lockout_counter() {
        let (guard, _) = guard();
        let now = chrono::Utc::now().timestamp_millis();

        for _ in 0..4 {
            guard.note_failure("ip").await.unwrap();
        }
        for i in 0..100 {
            guard.admit_at("ip", now + i).await.unwrap();
        }
        // Fifth failure: a rate excess
        let err = guard.admit_at("ip", now + 100).await.unwrap_err();
        assert!(matches!(err, VerifyError::RateLimited));
        assert!(!guard.is_locked("ip").await);

        // Sixth failure: a rejected verification
        assert_eq!(guard.note_failure("ip").await.unwrap(), 6);
        assert!(guard.is_locked("ip").await);
        let err = guard.admit_at("ip", now + 101).await.unwrap_err();
        assert!(matches!(err, VerifyError::Locked));
    }

    struct BrokenStore;

    #[async_trait]
    impl StateStore for BrokenStore {
        async fn incr(&self, _: &str, _: u64) -> Result<u64, StoreError> {
            Err(broken())
        }
        async fn hit_window(&self, _: &str, _: i64, _: u64) -> Result<u64, StoreError> {
            Err(broken())
        }
        async fn set_ex(&self, _: &str, _: &str, _: u64) -> Result<(), StoreError> {
            Err(broken())
        }
        async fn set_nx_ex(&self, _: &str, _: &str, _: u64) -> Result<bool, StoreError> {
            Err(broken())
        }
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(broken())
        }
        async fn delete(&self, _: &str) -> Result<(), StoreError> {
            Err(broken())
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(broken())
        }
        fn backend(&self) -> &'static str {
            "broken"
        }
    }

    fn broken() -> StoreError {
        StoreError::Redis(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection refused",
        )))
    }

    #[tokio::test]
    async fn test_lockout_fails_closed() {
        let guard = RateGuard::new(
            Arc::new(BrokenStore),
            Arc::new(SuspiciousSet::new()),
            RateLimitConfig::default(),
        );
        assert!(guard.is_locked("ip").await);
        assert!(matches!(guard.admit("ip").await, Err(VerifyError::Locked)));
    }
}
