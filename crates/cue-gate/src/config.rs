//! Configuration management for Cue Gate.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use cue_common::constants::{
    AUTOMATION_THRESHOLD, CHALLENGE_TTL_SECS, DEFAULT_LISTEN_ADDR, DEFAULT_POW_DIFFICULTY,
    GESTURE_AUTOMATION_THRESHOLD, LOCKOUT_AFTER_FAILURES, LOCKOUT_SECS, MAX_POW_DIFFICULTY,
    MAX_REACTION_MS, MAX_REQUESTS, MEDIUM_RISK_REQUESTS, MIN_REACTION_MS, RATE_WINDOW_SECS,
    SUSPICIOUS_AFTER_FAILURES,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Redis connection URL. Unset selects the in-process store.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// HMAC secret for challenge signatures.
    /// Unset generates an ephemeral secret at startup.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Token for the admin endpoints. Unset disables them.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Take the client identity from the first X-Forwarded-For hop
    #[serde(default)]
    pub trust_forwarded_for: bool,

    /// Attach score breakdowns to failure responses
    #[serde(default)]
    pub debug_responses: bool,

    /// Restrict CORS to `allowed_origins`
    #[serde(default)]
    pub strict_origin: bool,

    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Challenge issuance
    #[serde(default)]
    pub challenge: ChallengeConfig,

    /// Rate limiting and lockouts
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Verdict thresholds and history housekeeping
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// Challenge-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeConfig {
    /// Challenge validity in seconds
    #[serde(default = "default_challenge_ttl")]
    pub ttl_secs: u64,

    /// Proof-of-work difficulty (leading hex zeros, clamped to 8)
    #[serde(default = "default_pow_difficulty")]
    pub pow_difficulty: u8,

    /// Alignment tolerance in degrees
    #[serde(default = "default_tolerance")]
    pub tolerance: u32,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_challenge_ttl(),
            pow_difficulty: default_pow_difficulty(),
            tolerance: default_tolerance(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Sliding window length in seconds
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// Requests allowed per identity per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Window count above which the identity runs at MEDIUM risk
    #[serde(default = "default_medium_risk")]
    pub medium_risk_requests: u64,

    /// Failures tolerated before a lockout
    #[serde(default = "default_max_failures")]
    pub max_failures: u64,

    /// Lockout duration in seconds
    #[serde(default = "default_lockout")]
    pub lockout_secs: u64,

    /// Failures tolerated before the identity becomes suspicious
    #[serde(default = "default_suspicious_after")]
    pub suspicious_after_failures: u64,

    /// Failure counter expiry in seconds
    #[serde(default = "default_window")]
    pub failure_ttl_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window(),
            max_requests: default_max_requests(),
            medium_risk_requests: default_medium_risk(),
            max_failures: default_max_failures(),
            lockout_secs: default_lockout(),
            suspicious_after_failures: default_suspicious_after(),
            failure_ttl_secs: default_window(),
        }
    }
}

/// Scoring configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Alignment flow rejects at or above this bot score
    #[serde(default = "default_automation_threshold")]
    pub automation_threshold: f64,

    /// Gesture flow rejects at or above this bot score
    #[serde(default = "default_gesture_threshold")]
    pub gesture_automation_threshold: f64,

    #[serde(default = "default_min_reaction")]
    pub min_reaction_ms: f64,

    #[serde(default = "default_max_reaction")]
    pub max_reaction_ms: f64,

    /// Behavior histories idle longer than this are dropped
    #[serde(default = "default_history_idle")]
    pub history_idle_secs: u64,

    /// Janitor sweep interval
    #[serde(default = "default_janitor_interval")]
    pub janitor_interval_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            automation_threshold: default_automation_threshold(),
            gesture_automation_threshold: default_gesture_threshold(),
            min_reaction_ms: default_min_reaction(),
            max_reaction_ms: default_max_reaction(),
            history_idle_secs: default_history_idle(),
            janitor_interval_secs: default_janitor_interval(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_request_timeout() -> u64 { 10 }
fn default_challenge_ttl() -> u64 { CHALLENGE_TTL_SECS }
fn default_pow_difficulty() -> u8 { DEFAULT_POW_DIFFICULTY }
fn default_tolerance() -> u32 { 8 }
fn default_window() -> u64 { RATE_WINDOW_SECS }
fn default_max_requests() -> u64 { MAX_REQUESTS }
fn default_medium_risk() -> u64 { MEDIUM_RISK_REQUESTS }
fn default_max_failures() -> u64 { LOCKOUT_AFTER_FAILURES }
fn default_lockout() -> u64 { LOCKOUT_SECS }
fn default_suspicious_after() -> u64 { SUSPICIOUS_AFTER_FAILURES }
fn default_automation_threshold() -> f64 { AUTOMATION_THRESHOLD }
fn default_gesture_threshold() -> f64 { GESTURE_AUTOMATION_THRESHOLD }
fn default_min_reaction() -> f64 { MIN_REACTION_MS }
fn default_max_reaction() -> f64 { MAX_REACTION_MS }
fn default_history_idle() -> u64 { 3600 } // 1 hour
fn default_janitor_interval() -> u64 { 30 }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = Some(redis_url.clone());
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref secret) = args.secret_key {
            config.secret_key = Some(secret.clone());
        }
        if let Some(ref token) = args.admin_token {
            config.admin_token = Some(token.clone());
        }

        config.challenge.pow_difficulty = config.challenge.pow_difficulty.min(MAX_POW_DIFFICULTY);

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            redis_url: None,
            secret_key: None,
            admin_token: None,
            trust_forwarded_for: false,
            debug_responses: false,
            strict_origin: false,
            allowed_origins: Vec::new(),
            request_timeout_secs: default_request_timeout(),
            challenge: ChallengeConfig::default(),
            rate_limit: RateLimitConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                listen_addr = "0.0.0.0:8080"
                admin_token = "hunter2"

                [rate_limit]
                max_requests = 20
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: AppConfig = settings.try_deserialize().unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.admin_token.as_deref(), Some("hunter2"));
        assert_eq!(config.rate_limit.max_requests, 20);
        assert_eq!(config.rate_limit.window_secs, RATE_WINDOW_SECS);
        assert_eq!(config.challenge.ttl_secs, CHALLENGE_TTL_SECS);
        assert!(config.redis_url.is_none());
        assert!(!config.strict_origin);
    }
}
