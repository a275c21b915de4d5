//! Challenge signing and blob encoding.
//!
//! Both challenge variants follow one contract: the server signs the exact
//! JSON bytes that are base64-encoded into the `challenge` field, and on
//! verification re-authenticates those decoded bytes before parsing them.

use anyhow::{Result, anyhow};
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;

use cue_common::{ReplayKind, VerifyError};

type HmacSha256 = Hmac<Sha256>;

/// Base64 challenge plus its base64 HMAC signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBlob {
    pub challenge: String,
    pub sig: String,
}

/// HMAC-SHA256 signer keyed by the server secret
#[derive(Clone)]
pub struct Signer {
    mac: HmacSha256,
}

impl Signer {
    pub fn new(secret: &[u8]) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| anyhow!("HMAC key rejected (length {})", secret.len()))?;
        Ok(Self { mac })
    }

    /// Random per-process secret; signatures do not survive a restart
    pub fn ephemeral() -> Result<Self> {
        let mut secret = [0u8; 32];
        rand::Rng::fill(&mut rand::rng(), &mut secret);
        Self::new(&secret)
    }

    /// Sign bytes, returning the base64 (standard alphabet) tag
    pub fn sign(&self, bytes: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(bytes);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Recompute the tag and compare in constant time
    pub fn verify(&self, bytes: &[u8], signature: &str) -> bool {
        let Ok(tag) = STANDARD.decode(signature) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(bytes);
        mac.verify_slice(&tag).is_ok()
    }

    /// Serialize, base64-encode and sign a challenge blob
    pub fn encode_blob<T: Serialize>(&self, blob: &T) -> Result<SignedBlob, VerifyError> {
        let bytes = serde_json::to_vec(blob)
            .map_err(|e| VerifyError::Internal(format!("blob serialization: {}", e)))?;

        Ok(SignedBlob {
            challenge: STANDARD.encode(&bytes),
            sig: self.sign(&bytes),
        })
    }

    /// Authenticate and parse a challenge blob.
    ///
    /// Undecodable base64 or JSON is a validation error; a signature that
    /// does not match the decoded bytes is a tamper failure.
    pub fn decode_blob<T: DeserializeOwned>(
        &self,
        challenge: &str,
        sig: &str,
    ) -> Result<T, VerifyError> {
        let bytes = STANDARD
            .decode(challenge)
            .map_err(|_| VerifyError::Validation("challenge is not valid base64".to_string()))?;

        if !self.verify(&bytes, sig) {
            return Err(VerifyError::Replay(ReplayKind::BadSignature));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| VerifyError::Validation(format!("malformed challenge: {}", e)))
    }
}
