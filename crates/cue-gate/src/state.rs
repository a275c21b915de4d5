//! Application state and shared resources.

use anyhow::Result;
use std::sync::Arc;

use crate::analysis::BehaviorTracker;
use crate::captcha::{ChallengeStore, ChallengeVerifier, Signer};
use crate::config::AppConfig;
use crate::limits::{RateGuard, SuspiciousSet};
use crate::store::{self, StateStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Key-value backend (memory or Redis)
    pub store: Arc<dyn StateStore>,

    /// Challenge issuance and single-use records
    pub challenges: Arc<ChallengeStore>,

    /// Rate limits and lockouts
    pub guard: Arc<RateGuard>,

    /// Identities forced to HIGH risk
    pub suspicious: Arc<SuspiciousSet>,

    /// Cross-request behavior histories
    pub tracker: Arc<BehaviorTracker>,

    /// Verification pipeline
    pub verifier: Arc<ChallengeVerifier>,
}

impl AppState {
    /// Create new application state, connecting to the configured store
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = store::connect(config.redis_url.as_deref()).await?;
        tracing::info!(backend = store.backend(), "State store ready");

        let signer = match &config.secret_key {
            Some(secret) => Signer::new(secret.as_bytes())?,
            None => {
                tracing::warn!(
                    "No secret_key configured, using an ephemeral secret. \
                     Challenges will not survive a restart or verify on other nodes."
                );
                Signer::ephemeral()?
            }
        };

        Ok(Self::with_parts(config, store, signer))
    }

    /// Wire services over an existing store
    pub fn with_parts(config: AppConfig, store: Arc<dyn StateStore>, signer: Signer) -> Self {
        let challenges = Arc::new(ChallengeStore::new(
            store.clone(),
            signer,
            config.challenge.ttl_secs,
            config.challenge.pow_difficulty,
            config.challenge.tolerance,
        ));
        let suspicious = Arc::new(SuspiciousSet::new());
        let guard = Arc::new(RateGuard::new(
            store.clone(),
            suspicious.clone(),
            config.rate_limit.clone(),
        ));
        let tracker = Arc::new(BehaviorTracker::new());
        let verifier = Arc::new(ChallengeVerifier::new(
            challenges.clone(),
            guard.clone(),
            tracker.clone(),
            config.scoring.clone(),
        ));

        Self {
            config,
            store,
            challenges,
            guard,
            suspicious,
            tracker,
            verifier,
        }
    }
}
