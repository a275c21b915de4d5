//! Proof-of-work check.
//!
//! The client searches for a nonce such that
//! `hex(sha256(challenge + ":" + nonce))` starts with `difficulty` zeros.

use sha2::{Digest, Sha256};

use cue_common::constants::MAX_POW_DIFFICULTY;

/// Hex digest the client is expected to grind on
pub fn pow_digest(challenge: &str, nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(challenge.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a proof-of-work nonce. Difficulty is clamped to [0, 8];
/// difficulty 0 accepts anything, including a missing nonce.
pub fn verify_pow(challenge: &str, nonce: Option<&str>, difficulty: u8) -> bool {
    let difficulty = difficulty.min(MAX_POW_DIFFICULTY) as usize;
    if difficulty == 0 {
        return true;
    }

    let Some(nonce) = nonce.filter(|n| !n.is_empty()) else {
        return false;
    };

    pow_digest(challenge, nonce)
        .bytes()
        .take(difficulty)
        .all(|b| b == b'0')
}

#[cfg(test)]
pub(crate) fn solve(challenge: &str, difficulty: u8) -> String {
    (0u64..)
        .map(|n| n.to_string())
        .find(|nonce| verify_pow(challenge, Some(nonce), difficulty))
        .unwrap_or_default()
}
