//! Challenge issuance and verification endpoints.

use axum::{
    Json,
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;

use cue_common::constants::{PROTOCOL_VERSION, headers::X_FORWARDED_FOR};
use cue_common::{GestureSpec, RiskLevel, VerificationSuccess, VerifyError};

use super::ApiError;
use crate::captcha::{IssuedChallenge, RequestContext, VerifyRequest};
use crate::state::AppState;

/// Identity and user agent of the caller.
/// The first `X-Forwarded-For` hop wins when the proxy is trusted.
pub struct Client(pub RequestContext);

impl FromRequestParts<AppState> for Client {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let forwarded = state
            .config
            .trust_forwarded_for
            .then(|| {
                parts
                    .headers
                    .get(X_FORWARDED_FOR)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.split(',').next())
                    .map(str::trim)
                    .filter(|hop| !hop.is_empty())
                    .map(str::to_string)
            })
            .flatten();

        let identity = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Client(RequestContext {
            identity,
            user_agent,
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChallengeRequest {
    /// Informational only
    #[serde(default)]
    client_id: Option<String>,
    /// Binds the challenge to this device when present
    #[serde(default)]
    fingerprint_hash: Option<String>,
}

impl ChallengeRequest {
    /// An empty body is an empty request
    fn parse(body: &Bytes) -> Result<Self, VerifyError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| VerifyError::Validation(format!("malformed challenge request: {}", e)))
    }
}

#[derive(Serialize)]
pub struct ChallengeResponse {
    challenge: String,
    sig: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    v2: Option<GestureSpec>,
}

impl From<IssuedChallenge> for ChallengeResponse {
    fn from(issued: IssuedChallenge) -> Self {
        let gesture = issued.spec.is_some();
        Self {
            challenge: issued.signed.challenge,
            sig: issued.signed.sig,
            version: gesture.then_some(PROTOCOL_VERSION),
            v2: issued.spec,
        }
    }
}

/// Issue an alignment challenge
pub async fn issue_alignment(
    State(state): State<AppState>,
    Client(ctx): Client,
    body: Bytes,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let request = ChallengeRequest::parse(&body)?;
    let issued = state
        .challenges
        .issue(request.fingerprint_hash.as_deref())
        .await?;

    tracing::debug!(
        identity = %ctx.identity,
        client_id = ?request.client_id,
        nonce = %issued.record.nonce,
        "Served alignment challenge"
    );

    Ok(Json(issued.into()))
}

/// Issue an align-and-gesture challenge
pub async fn issue_gesture(
    State(state): State<AppState>,
    Client(ctx): Client,
    body: Bytes,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let request = ChallengeRequest::parse(&body)?;
    let issued = state
        .challenges
        .issue_gesture(request.fingerprint_hash.as_deref())
        .await?;

    tracing::debug!(
        identity = %ctx.identity,
        client_id = ?request.client_id,
        nonce = %issued.record.nonce,
        "Served gesture challenge"
    );

    Ok(Json(issued.into()))
}

/// Lockout and rate admission, then the body.
/// A throttled identity is turned away before its payload is deserialized.
async fn admit_and_parse(
    state: &AppState,
    ctx: &RequestContext,
    body: &Bytes,
) -> Result<(RiskLevel, VerifyRequest), VerifyError> {
    let risk = state.guard.admit(&ctx.identity).await?;
    let request = serde_json::from_slice(body)
        .map_err(|e| VerifyError::Validation(format!("malformed verify request: {}", e)))?;
    Ok((risk, request))
}

/// Verify an alignment-only submission
pub async fn verify_alignment(
    State(state): State<AppState>,
    Client(ctx): Client,
    body: Bytes,
) -> Result<Json<VerificationSuccess>, ApiError> {
    let debug = state.config.debug_responses;
    let (risk, request) = admit_and_parse(&state, &ctx, &body)
        .await
        .map_err(|e| ApiError::new(e, debug))?;

    state
        .verifier
        .verify_alignment(&ctx, risk, &request)
        .await
        .map(Json)
        .map_err(|e| ApiError::new(e, debug))
}

/// Verify an alignment-plus-gesture submission
pub async fn verify_gesture(
    State(state): State<AppState>,
    Client(ctx): Client,
    body: Bytes,
) -> Result<Json<VerificationSuccess>, ApiError> {
    let debug = state.config.debug_responses;
    let (risk, request) = admit_and_parse(&state, &ctx, &body)
        .await
        .map_err(|e| ApiError::new(e, debug))?;

    state
        .verifier
        .verify_gesture(&ctx, risk, &request)
        .await
        .map(Json)
        .map_err(|e| ApiError::new(e, debug))
}
