//! Shared constants for Align-on-Cue components.

/// Protocol version reported on verification responses
pub const PROTOCOL_VERSION: &str = "2.0.2";

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";

/// Challenge validity in seconds
pub const CHALLENGE_TTL_SECS: u64 = 90;

/// Default proof-of-work difficulty (leading hex zeros)
pub const DEFAULT_POW_DIFFICULTY: u8 = 1;

/// Upper clamp on proof-of-work difficulty
pub const MAX_POW_DIFFICULTY: u8 = 8;

/// Alignment tolerance of gesture challenges (degrees)
pub const GESTURE_ANGLE_TOLERANCE: f64 = 15.0;

/// Fastest plausible reaction time
pub const MIN_REACTION_MS: f64 = 60.0;

/// Slowest accepted reaction time
pub const MAX_REACTION_MS: f64 = 3000.0;

/// Sliding rate window (15 minutes)
pub const RATE_WINDOW_SECS: u64 = 15 * 60;

/// Requests allowed per identity in the rate window
pub const MAX_REQUESTS: u64 = 100;

/// Window count above which an identity is treated as MEDIUM risk
pub const MEDIUM_RISK_REQUESTS: u64 = 50;

/// Failure count above which the identity is locked out
pub const LOCKOUT_AFTER_FAILURES: u64 = 5;

/// Lockout duration in seconds (5 minutes)
pub const LOCKOUT_SECS: u64 = 5 * 60;

/// Failure count above which the identity joins the suspicious set
pub const SUSPICIOUS_AFTER_FAILURES: u64 = 3;

/// Bot score at or above which an alignment verification is rejected
pub const AUTOMATION_THRESHOLD: f64 = 0.65;

/// Bot score at or above which a gesture verification is rejected
pub const GESTURE_AUTOMATION_THRESHOLD: f64 = 0.60;

/// Maximum pointer samples accepted in one request
pub const MAX_MOVEMENT_SAMPLES: usize = 1000;

/// Maximum strokes accepted in one gesture
pub const MAX_GESTURE_STROKES: usize = 16;

/// Behavior history capacity per identity
pub const BEHAVIOR_HISTORY_CAPACITY: usize = 100;

/// Store key prefixes
pub mod store_keys {
    /// Challenge record: challenge:{nonce}
    pub const CHALLENGE_PREFIX: &str = "challenge:";

    /// Used marker: challenge:used:{nonce}
    pub const CHALLENGE_USED_PREFIX: &str = "challenge:used:";

    /// Rate window: rl:{identity}
    pub const RATELIMIT_PREFIX: &str = "rl:";

    /// Failure counter: fail:{identity}
    pub const FAILURES_PREFIX: &str = "fail:";

    /// Lockout marker: lockout:{identity}
    pub const LOCKOUT_PREFIX: &str = "lockout:";
}

/// HTTP header names
pub mod headers {
    /// Admin token header
    pub const X_ADMIN_TOKEN: &str = "X-Admin-Token";

    /// Forwarded client address (first hop wins)
    pub const X_FORWARDED_FOR: &str = "X-Forwarded-For";
}
