//! Challenge issuance and the single-use record lifecycle.

use rand::Rng;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use cue_common::constants::{
    GESTURE_ANGLE_TOLERANCE,
    store_keys::{CHALLENGE_PREFIX, CHALLENGE_USED_PREFIX},
};
use cue_common::{
    ChallengeBlob, ChallengeDifficulty, ChallengeType, GestureChallengeBlob, GestureSpec,
    ReplayKind, VerifyError,
};

use super::codec::{SignedBlob, Signer};
use super::geometry::derive_angle;
use super::{ChallengeKind, ChallengeRecord};
use crate::store::StateStore;

/// Exclusive upper bound of challenge seeds (2^31 - 1)
const SEED_BOUND: u32 = i32::MAX as u32;

/// A freshly issued challenge
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub record: ChallengeRecord,
    pub signed: SignedBlob,
    /// Gesture selection (gesture challenges only)
    pub spec: Option<GestureSpec>,
}

/// Issues signed challenges and enforces at-most-once consumption
pub struct ChallengeStore {
    store: Arc<dyn StateStore>,
    signer: Signer,
    /// Challenge validity in seconds
    ttl_secs: u64,
    /// Proof-of-work difficulty of alignment challenges
    pow_difficulty: u8,
    /// Alignment tolerance in degrees
    tolerance: u32,
}

impl ChallengeStore {
    pub fn new(
        store: Arc<dyn StateStore>,
        signer: Signer,
        ttl_secs: u64,
        pow_difficulty: u8,
        tolerance: u32,
    ) -> Self {
        Self {
            store,
            signer,
            ttl_secs,
            pow_difficulty,
            tolerance,
        }
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Issue an alignment challenge
    pub async fn issue(&self, fingerprint: Option<&str>) -> Result<IssuedChallenge, VerifyError> {
        self.issue_at(fingerprint, chrono::Utc::now().timestamp_millis())
            .await
    }

    pub async fn issue_at(
        &self,
        fingerprint: Option<&str>,
        now_ms: i64,
    ) -> Result<IssuedChallenge, VerifyError> {
        let record = self.new_record(
            ChallengeKind::Alignment,
            fingerprint,
            now_ms,
            self.tolerance,
            self.pow_difficulty,
        );

        let blob = ChallengeBlob {
            nonce: record.nonce.clone(),
            seed: record.seed,
            pow_difficulty: record.pow_difficulty,
            tolerance: record.tolerance,
            issued_at: record.issued_at,
            expires_at: record.expires_at,
        };
        let signed = self.signer.encode_blob(&blob)?;

        self.persist(&record).await?;

        tracing::debug!(
            nonce = %record.nonce,
            target_angle = record.target_angle,
            pow_difficulty = record.pow_difficulty,
            "Issued alignment challenge"
        );

        Ok(IssuedChallenge {
            record,
            signed,
            spec: None,
        })
    }

    /// Issue a gesture challenge
    pub async fn issue_gesture(
        &self,
        fingerprint: Option<&str>,
    ) -> Result<IssuedChallenge, VerifyError> {
        self.issue_gesture_at(fingerprint, chrono::Utc::now().timestamp_millis())
            .await
    }

    pub async fn issue_gesture_at(
        &self,
        fingerprint: Option<&str>,
        now_ms: i64,
    ) -> Result<IssuedChallenge, VerifyError> {
        let record = self.new_record(
            ChallengeKind::Gesture,
            fingerprint,
            now_ms,
            GESTURE_ANGLE_TOLERANCE as u32,
            0,
        );

        // Only the easy circle flow is served for now
        let spec = GestureSpec::new(ChallengeDifficulty::Easy, ChallengeType::AlignCircle);
        let blob = GestureChallengeBlob {
            id: record.nonce.clone(),
            angle: record.target_angle,
            ts: now_ms,
            v2: spec.clone(),
        };
        let signed = self.signer.encode_blob(&blob)?;

        self.persist(&record).await?;

        tracing::debug!(
            nonce = %record.nonce,
            target_angle = record.target_angle,
            challenge_type = ?spec.challenge_type,
            "Issued gesture challenge"
        );

        Ok(IssuedChallenge {
            record,
            signed,
            spec: Some(spec),
        })
    }

    /// Look up a challenge without consuming it
    pub async fn inspect(
        &self,
        nonce: &str,
        kind: ChallengeKind,
        fingerprint: Option<&str>,
        now_ms: i64,
    ) -> Result<ChallengeRecord, VerifyError> {
        let raw = self.store.get(&record_key(nonce)).await?;
        let record: ChallengeRecord = match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| VerifyError::Internal(format!("corrupt challenge record: {}", e)))?,
            None => return Err(VerifyError::Replay(ReplayKind::NotFound)),
        };

        if record.kind != kind {
            return Err(VerifyError::Replay(ReplayKind::NotFound));
        }

        // Store TTL eviction is best effort
        if now_ms > record.expires_at * 1000 {
            return Err(VerifyError::Replay(ReplayKind::Expired));
        }

        if self.store.get(&used_key(nonce)).await?.is_some() {
            return Err(VerifyError::Replay(ReplayKind::AlreadyUsed));
        }

        if let Some(bound) = &record.bound_fingerprint {
            let presented = fingerprint.unwrap_or_default();
            let matches: bool = bound.as_bytes().ct_eq(presented.as_bytes()).into();
            if !matches {
                return Err(VerifyError::Replay(ReplayKind::FingerprintMismatch));
            }
        }

        Ok(record)
    }

    #[cfg(test)]
    pub async fn consume(
        &self,
        nonce: &str,
        kind: ChallengeKind,
        fingerprint: Option<&str>,
    ) -> Result<ChallengeRecord, VerifyError> {
        self.consume_at(nonce, kind, fingerprint, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// Consume a challenge. At most one caller per nonce succeeds.
    pub async fn consume_at(
        &self,
        nonce: &str,
        kind: ChallengeKind,
        fingerprint: Option<&str>,
        now_ms: i64,
    ) -> Result<ChallengeRecord, VerifyError> {
        let mut record = self.inspect(nonce, kind, fingerprint, now_ms).await?;

        // The marker lives exactly as long as the record would
        let remaining_ms = (record.expires_at * 1000 - now_ms).max(1) as u64;
        let claimed = self
            .store
            .set_nx_ex(&used_key(nonce), "1", remaining_ms)
            .await?;

        if !claimed {
            tracing::debug!(nonce = %nonce, "Lost consume race");
            return Err(VerifyError::Replay(ReplayKind::AlreadyUsed));
        }

        record.used = true;
        Ok(record)
    }

    fn new_record(
        &self,
        kind: ChallengeKind,
        fingerprint: Option<&str>,
        now_ms: i64,
        tolerance: u32,
        pow_difficulty: u8,
    ) -> ChallengeRecord {
        let seed = rand::rng().random_range(0..SEED_BOUND);
        let issued_at = now_ms / 1000;

        ChallengeRecord {
            nonce: uuid::Uuid::new_v4().to_string(),
            seed,
            target_angle: derive_angle(seed),
            pow_difficulty,
            tolerance,
            issued_at,
            expires_at: issued_at + self.ttl_secs as i64,
            used: false,
            bound_fingerprint: fingerprint.filter(|fp| !fp.is_empty()).map(str::to_string),
            kind,
        }
    }

    async fn persist(&self, record: &ChallengeRecord) -> Result<(), VerifyError> {
        let data = serde_json::to_string(record)
            .map_err(|e| VerifyError::Internal(format!("record serialization: {}", e)))?;
        self.store
            .set_ex(&record_key(&record.nonce), &data, self.ttl_secs * 1000)
            .await?;
        Ok(())
    }
}

fn record_key(nonce: &str) -> String {
    format!("{}{}", CHALLENGE_PREFIX, nonce)
}

fn used_key(nonce: &str) -> String {
    format!("{}{}", CHALLENGE_USED_PREFIX, nonce)
}
