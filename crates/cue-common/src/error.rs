//! Verification error taxonomy.
//!
//! Every per-request failure ends up as one of these variants. The HTTP layer
//! turns them into `{ok:false, ...}` bodies; the orchestrator uses
//! [`VerifyError::counts_as_failure`] to drive the failure counter.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::{Flag, ShapeValidation};

/// Replay / tamper failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayKind {
    /// No record for the nonce (never issued, or evicted)
    NotFound,
    /// Record is past `expires_at`
    Expired,
    /// Record was already consumed
    AlreadyUsed,
    /// Record is bound to a different device fingerprint
    FingerprintMismatch,
    /// HMAC over the blob does not match
    BadSignature,
    /// Signed blob disagrees with the server-side record
    BindingMismatch,
}

impl ReplayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::AlreadyUsed => "already_used",
            Self::FingerprintMismatch => "fingerprint_mismatch",
            Self::BadSignature => "bad_signature",
            Self::BindingMismatch => "binding_mismatch",
        }
    }
}

impl fmt::Display for ReplayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores attached to a rejection for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_likelihood: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub flags: Vec<Flag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gesture_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape_validation: Option<ShapeValidation>,
}

/// Errors produced by the verification pipeline
#[derive(Debug, Clone, Error)]
pub enum VerifyError {
    /// Malformed or missing request fields
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Replay, tamper, or lifecycle failure on the challenge
    #[error("Challenge rejected: {0}")]
    Replay(ReplayKind),

    /// Missing or wrong proof-of-work
    #[error("Proof-of-work rejected: {0}")]
    ProofOfWork(String),

    /// Angle or reaction time out of bounds
    #[error("Alignment failed: error {angle_error:.1} deg, tolerance {tolerance} deg, reaction {reaction_ms} ms")]
    Alignment {
        angle_error: f64,
        tolerance: u32,
        reaction_ms: f64,
        detail: Box<RejectionDetail>,
    },

    /// Bot score over threshold, invalid movement, or invalid shape
    #[error("Automated behavior detected")]
    AutomationDetected(Box<RejectionDetail>),

    /// Too many requests in the rate window
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Identity is locked out
    #[error("Identity locked out")]
    Locked,

    /// Unexpected fault (store down, serialization bug)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VerifyError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Replay(_) => 400,
            Self::ProofOfWork(_) => 400,
            Self::Alignment { .. } => 400,
            Self::AutomationDetected(_) => 400,
            Self::RateLimited => 429,
            Self::Locked => 429,
            Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable reason code
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_request",
            Self::Replay(kind) => kind.as_str(),
            Self::ProofOfWork(_) => "invalid_proof_of_work",
            Self::Alignment { .. } => "alignment_failed",
            Self::AutomationDetected(_) => "automation_detected",
            Self::RateLimited => "rate_limited",
            Self::Locked => "locked",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Generic message safe to show to the client
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Missing or invalid parameters",
            Self::ProofOfWork(_) => "Invalid proof-of-work",
            Self::AutomationDetected(_) => "Verification failed - automated behavior detected",
            Self::RateLimited => "Too many attempts",
            Self::Locked => "Too many failed attempts, try later",
            Self::Internal(_) => "internal error",
            Self::Replay(_) | Self::Alignment { .. } => "Verification failed",
        }
    }

    /// Returns true if this error increments the identity's failure counter
    pub fn counts_as_failure(&self) -> bool {
        matches!(
            self,
            Self::Replay(_) | Self::Alignment { .. } | Self::AutomationDetected(_)
        )
    }

    /// Diagnostic scores carried by the rejection, if any
    pub fn detail(&self) -> Option<&RejectionDetail> {
        match self {
            Self::Alignment { detail, .. } => Some(detail),
            Self::AutomationDetected(detail) => Some(detail),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(VerifyError::Validation("x".into()).status_code(), 400);
        assert_eq!(VerifyError::Replay(ReplayKind::AlreadyUsed).status_code(), 400);
        assert_eq!(VerifyError::RateLimited.status_code(), 429);
        assert_eq!(VerifyError::Locked.status_code(), 429);
        assert_eq!(VerifyError::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_failure_accounting() {
        assert!(!VerifyError::Validation("x".into()).counts_as_failure());
        assert!(!VerifyError::ProofOfWork("x".into()).counts_as_failure());
        assert!(!VerifyError::RateLimited.counts_as_failure());
        assert!(!VerifyError::Internal("x".into()).counts_as_failure());
        assert!(VerifyError::Replay(ReplayKind::BadSignature).counts_as_failure());
        assert!(VerifyError::AutomationDetected(Box::default()).counts_as_failure());
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(VerifyError::Replay(ReplayKind::Expired).reason(), "expired");
        assert_eq!(
            VerifyError::Replay(ReplayKind::FingerprintMismatch).to_string(),
            "Challenge rejected: fingerprint_mismatch"
        );
        assert_eq!(VerifyError::Locked.reason(), "locked");
    }
}
