//! Align-and-gesture challenges: issuance, single-use lifecycle and
//! verification.

pub mod codec;
pub mod geometry;
pub mod pow;
mod store;
mod verifier;

pub use codec::Signer;
pub use store::{ChallengeStore, IssuedChallenge};
pub use verifier::{ChallengeVerifier, RequestContext, VerifyRequest};

use cue_common::{ChallengeBlob, GestureChallengeBlob, ReplayKind, VerifyError};
use serde::{Deserialize, Serialize};

/// Which flow a challenge belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    Alignment,
    Gesture,
}

/// Server-side truth for an issued challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub nonce: String,
    pub seed: u32,
    /// Degrees in [0, 360)
    pub target_angle: u32,
    pub pow_difficulty: u8,
    /// Degrees
    pub tolerance: u32,
    /// Epoch seconds
    pub issued_at: i64,
    /// Epoch seconds
    pub expires_at: i64,
    pub used: bool,
    pub bound_fingerprint: Option<String>,
    pub kind: ChallengeKind,
}

impl ChallengeRecord {
    /// Cross-check the signed alignment blob against the record
    pub fn check_alignment_blob(&self, blob: &ChallengeBlob) -> Result<(), VerifyError> {
        let consistent = blob.nonce == self.nonce
            && blob.seed == self.seed
            && geometry::derive_angle(blob.seed) == self.target_angle
            && blob.tolerance == self.tolerance
            && blob.pow_difficulty == self.pow_difficulty;

        if consistent {
            Ok(())
        } else {
            Err(VerifyError::Replay(ReplayKind::BindingMismatch))
        }
    }

    /// Cross-check the signed gesture blob against the record
    pub fn check_gesture_blob(&self, blob: &GestureChallengeBlob) -> Result<(), VerifyError> {
        if blob.id == self.nonce && blob.angle == self.target_angle {
            Ok(())
        } else {
            Err(VerifyError::Replay(ReplayKind::BindingMismatch))
        }
    }
}
