//! Verification pipeline.
//!
//! Both flows run the same state order:
//! `RATE -> VALIDATE -> SIGNATURE -> LOOKUP -> POW -> ANGLE -> SCORING -> VERDICT`.
//! RATE is [`RateGuard::admit`], run by the caller before the body is parsed;
//! the verifier starts from the risk level it returns.
//! Telemetry is analyzed once right after the proof-of-work check so that an
//! angle rejection can still carry its scores. The first failing state
//! short-circuits; counted failures feed the identity's failure counter.

use serde::Deserialize;
use std::sync::Arc;

use cue_common::constants::{MAX_GESTURE_STROKES, MAX_MOVEMENT_SAMPLES, PROTOCOL_VERSION};
use cue_common::{
    ChallengeBlob, Flag, GestureBreakdown, GestureChallengeBlob, GestureSubmission, PointerSample,
    Recommendation, RejectionDetail, RiskLevel, ShapeReport, Telemetry, VerificationSuccess,
    VerifyError,
};

use super::geometry::angular_distance;
use super::pow::verify_pow;
use super::{ChallengeKind, ChallengeRecord, ChallengeStore};
use crate::analysis::scoring;
use crate::analysis::{
    AnomalyReport, Attempt, BehaviorTracker, ComprehensiveScore, MovementAnalysis, analyze_stroke,
    legacy_score, movement_heuristics, validate_gesture, validate_movements,
};
use crate::config::ScoringConfig;
use crate::limits::RateGuard;

/// Fewest points accepted in the first gesture stroke
const MIN_GESTURE_POINTS: usize = 5;

/// Verification request body (both flows)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub fingerprint_hash: Option<String>,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub sig: Option<String>,
    #[serde(default)]
    pub user_angle: Option<f64>,
    #[serde(default)]
    pub reaction_client_ms: Option<f64>,
    #[serde(default)]
    pub movements: Option<Vec<PointerSample>>,
    #[serde(default)]
    pub telemetry: Option<Telemetry>,
    #[serde(default)]
    pub pow_nonce: Option<String>,
    /// Gesture flow only
    #[serde(default)]
    pub gesture: Option<GestureSubmission>,
}

/// Who is asking
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Peer address or first forwarded hop
    pub identity: String,
    pub user_agent: Option<String>,
}

/// Validated alignment fields of a request
struct Submission<'a> {
    fingerprint: &'a str,
    challenge: &'a str,
    sig: &'a str,
    user_angle: f64,
    reaction_ms: f64,
    samples: &'a [PointerSample],
}

impl VerifyRequest {
    fn submission(&self) -> Result<Submission<'_>, VerifyError> {
        let fingerprint = self
            .fingerprint_hash
            .as_deref()
            .filter(|fp| !fp.is_empty())
            .ok_or_else(|| VerifyError::Validation("fingerprint_hash required".to_string()))?;

        let (Some(challenge), Some(sig), Some(user_angle), Some(reaction_ms)) = (
            self.challenge.as_deref().filter(|c| !c.is_empty()),
            self.sig.as_deref().filter(|s| !s.is_empty()),
            self.user_angle.filter(|a| a.is_finite()),
            self.reaction_client_ms.filter(|r| r.is_finite()),
        ) else {
            return Err(VerifyError::Validation(
                "Missing or invalid parameters".to_string(),
            ));
        };

        let samples = self.movements.as_deref().unwrap_or_default();
        if samples.len() > MAX_MOVEMENT_SAMPLES {
            return Err(VerifyError::Validation(
                "Too many movement samples".to_string(),
            ));
        }

        Ok(Submission {
            fingerprint,
            challenge,
            sig,
            user_angle,
            reaction_ms,
            samples,
        })
    }

    fn gesture_submission(&self) -> Result<&GestureSubmission, VerifyError> {
        let gesture = self
            .gesture
            .as_ref()
            .ok_or_else(|| VerifyError::Validation("Missing or invalid gesture data".to_string()))?;

        match gesture.strokes.first() {
            None => Err(VerifyError::Validation(
                "No gesture strokes provided".to_string(),
            )),
            Some(first) if first.len() < MIN_GESTURE_POINTS => Err(VerifyError::Validation(
                "Insufficient gesture points".to_string(),
            )),
            Some(_) if gesture.strokes.len() > MAX_GESTURE_STROKES => Err(
                VerifyError::Validation("Too many gesture strokes".to_string()),
            ),
            Some(_) => Ok(gesture),
        }
    }
}

/// Alignment-side analysis shared by both flows
struct AlignmentAnalysis {
    movement: MovementAnalysis,
    base: ComprehensiveScore,
    anomaly: AnomalyReport,
    legacy: f64,
    /// Blended and floored alignment bot score
    bot_score: f64,
    flags: Vec<Flag>,
}

/// Orchestrates a verification from rate check to verdict
pub struct ChallengeVerifier {
    challenges: Arc<ChallengeStore>,
    guard: Arc<RateGuard>,
    tracker: Arc<BehaviorTracker>,
    scoring: ScoringConfig,
}

impl ChallengeVerifier {
    pub fn new(
        challenges: Arc<ChallengeStore>,
        guard: Arc<RateGuard>,
        tracker: Arc<BehaviorTracker>,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            challenges,
            guard,
            tracker,
            scoring,
        }
    }

    /// Verify an admitted alignment-only submission
    pub async fn verify_alignment(
        &self,
        ctx: &RequestContext,
        risk: RiskLevel,
        request: &VerifyRequest,
    ) -> Result<VerificationSuccess, VerifyError> {
        self.verify_alignment_at(ctx, risk, request, chrono::Utc::now().timestamp_millis())
            .await
    }

    pub async fn verify_alignment_at(
        &self,
        ctx: &RequestContext,
        risk: RiskLevel,
        request: &VerifyRequest,
        now_ms: i64,
    ) -> Result<VerificationSuccess, VerifyError> {
        let result = self.run_alignment(ctx, risk, request, now_ms).await;
        self.settle(ctx, result).await
    }

    /// Verify an admitted alignment-plus-gesture submission
    pub async fn verify_gesture(
        &self,
        ctx: &RequestContext,
        risk: RiskLevel,
        request: &VerifyRequest,
    ) -> Result<VerificationSuccess, VerifyError> {
        self.verify_gesture_at(ctx, risk, request, chrono::Utc::now().timestamp_millis())
            .await
    }

    pub async fn verify_gesture_at(
        &self,
        ctx: &RequestContext,
        risk: RiskLevel,
        request: &VerifyRequest,
        now_ms: i64,
    ) -> Result<VerificationSuccess, VerifyError> {
        let result = self.run_gesture(ctx, risk, request, now_ms).await;
        self.settle(ctx, result).await
    }

    async fn run_alignment(
        &self,
        ctx: &RequestContext,
        risk: RiskLevel,
        request: &VerifyRequest,
        now_ms: i64,
    ) -> Result<VerificationSuccess, VerifyError> {
        let submission = request.submission()?;

        let blob: ChallengeBlob = self
            .challenges
            .signer()
            .decode_blob(submission.challenge, submission.sig)?;
        let record = self
            .challenges
            .inspect(
                &blob.nonce,
                ChallengeKind::Alignment,
                Some(submission.fingerprint),
                now_ms,
            )
            .await?;
        record.check_alignment_blob(&blob)?;

        self.check_pow(&record, submission.challenge, request.pow_nonce.as_deref())?;

        let analysis = self
            .analyze(ctx, &submission, request.telemetry.as_ref(), risk, now_ms)
            .await;
        let detail = || RejectionDetail {
            bot_score: Some(analysis.bot_score),
            human_likelihood: Some(1.0 - analysis.bot_score),
            flags: analysis.flags.clone(),
            ..Default::default()
        };

        let (angle_error, tolerance) = self.check_angle(&record, risk, &submission, detail)?;

        tracing::debug!(
            identity = %ctx.identity,
            nonce = %record.nonce,
            risk = ?risk,
            base = analysis.base.bot_score,
            breakdown = ?analysis.base.breakdown,
            legacy = analysis.legacy,
            anomaly = analysis.anomaly.score,
            bot_score = analysis.bot_score,
            movement_valid = analysis.movement.valid,
            "Alignment scored"
        );

        if !analysis.movement.valid || analysis.bot_score >= self.scoring.automation_threshold {
            return Err(VerifyError::AutomationDetected(Box::new(detail())));
        }

        self.accept(ctx, &record, submission.fingerprint, now_ms)
            .await?;

        let confidence = scoring::confidence(
            angle_error,
            tolerance,
            analysis.movement.confidence,
            analysis.bot_score,
        );

        tracing::info!(
            identity = %ctx.identity,
            nonce = %record.nonce,
            confidence = confidence,
            "Alignment verified"
        );

        Ok(VerificationSuccess {
            ok: true,
            message: "Verified successfully".to_string(),
            confidence,
            human_likelihood: 1.0 - analysis.bot_score,
            bot_score: analysis.bot_score,
            recommendation: Recommendation::from_score(analysis.bot_score),
            breakdown: None,
            shape_validation: None,
            version: PROTOCOL_VERSION.to_string(),
        })
    }

    async fn run_gesture(
        &self,
        ctx: &RequestContext,
        risk: RiskLevel,
        request: &VerifyRequest,
        now_ms: i64,
    ) -> Result<VerificationSuccess, VerifyError> {
        let submission = request.submission()?;
        let gesture = request.gesture_submission()?;

        let blob: GestureChallengeBlob = self
            .challenges
            .signer()
            .decode_blob(submission.challenge, submission.sig)?;
        let record = self
            .challenges
            .inspect(
                &blob.id,
                ChallengeKind::Gesture,
                Some(submission.fingerprint),
                now_ms,
            )
            .await?;
        record.check_gesture_blob(&blob)?;

        self.check_pow(&record, submission.challenge, request.pow_nonce.as_deref())?;

        let analysis = self
            .analyze(ctx, &submission, request.telemetry.as_ref(), risk, now_ms)
            .await;

        let strokes: Vec<_> = gesture.strokes.iter().map(|s| analyze_stroke(s)).collect();
        let avg_human =
            strokes.iter().map(|s| s.human_score).sum::<f64>() / strokes.len().max(1) as f64;
        let (shape, shape_flag) = validate_gesture(gesture);

        let gesture_score = 1.0 - avg_human;
        let bot_score = scoring::kinematic_floor(
            scoring::blend_gesture(analysis.bot_score, avg_human, shape.valid),
            &analysis.movement,
        );

        let mut flags = analysis.flags.clone();
        flags.extend(strokes.iter().flat_map(|s| s.flags.iter().copied()));
        flags.extend(shape_flag);
        if !shape.valid {
            flags.push(Flag::ShapeValidationFailed);
        }

        let detail = || RejectionDetail {
            bot_score: Some(bot_score),
            human_likelihood: Some(1.0 - bot_score),
            flags: flags.clone(),
            alignment_score: Some(analysis.bot_score),
            gesture_score: Some(gesture_score),
            shape_validation: Some(shape.clone()),
        };

        let (angle_error, tolerance) = self.check_angle(&record, risk, &submission, detail)?;

        tracing::debug!(
            identity = %ctx.identity,
            nonce = %record.nonce,
            risk = ?risk,
            alignment = analysis.bot_score,
            gesture = gesture_score,
            shape_valid = shape.valid,
            bot_score = bot_score,
            "Gesture scored"
        );

        if !analysis.movement.valid
            || !shape.valid
            || bot_score >= self.scoring.gesture_automation_threshold
        {
            return Err(VerifyError::AutomationDetected(Box::new(detail())));
        }

        self.accept(ctx, &record, submission.fingerprint, now_ms)
            .await?;

        let confidence = scoring::confidence(
            angle_error,
            tolerance,
            analysis.movement.confidence,
            bot_score,
        );

        tracing::info!(
            identity = %ctx.identity,
            nonce = %record.nonce,
            confidence = confidence,
            gesture = ?gesture.kind,
            "Gesture verified"
        );

        Ok(VerificationSuccess {
            ok: true,
            message: "Verified successfully with gesture authentication".to_string(),
            confidence,
            human_likelihood: 1.0 - bot_score,
            bot_score,
            recommendation: Recommendation::from_score(bot_score),
            breakdown: Some(GestureBreakdown {
                alignment: analysis.bot_score,
                gesture: gesture_score,
                shape: if shape.valid { 0.0 } else { 0.5 },
            }),
            shape_validation: Some(ShapeReport {
                valid: shape.valid,
                kind: gesture.kind,
                metrics: shape,
            }),
            version: PROTOCOL_VERSION.to_string(),
        })
    }

    fn check_pow(
        &self,
        record: &ChallengeRecord,
        challenge: &str,
        pow_nonce: Option<&str>,
    ) -> Result<(), VerifyError> {
        if verify_pow(challenge, pow_nonce, record.pow_difficulty) {
            Ok(())
        } else if pow_nonce.is_none_or(str::is_empty) {
            Err(VerifyError::ProofOfWork("pow_nonce required".to_string()))
        } else {
            Err(VerifyError::ProofOfWork("digest misses target".to_string()))
        }
    }

    /// Kinematics, client signals and behavioral history for one attempt.
    /// The attempt is recorded in the history whatever the verdict.
    async fn analyze(
        &self,
        ctx: &RequestContext,
        submission: &Submission<'_>,
        telemetry: Option<&Telemetry>,
        risk: RiskLevel,
        now_ms: i64,
    ) -> AlignmentAnalysis {
        let movement = validate_movements(submission.samples, risk);
        let legacy = legacy_score(
            &movement_heuristics(submission.samples),
            movement.confidence,
        );
        let base = scoring::comprehensive_score(telemetry, submission.samples);

        let anomaly = self
            .tracker
            .observe(
                &ctx.identity,
                Attempt {
                    timestamp_ms: now_ms,
                    reaction_ms: submission.reaction_ms,
                    accuracy: movement.confidence,
                    user_agent: ctx.user_agent.clone(),
                },
            )
            .await;

        let bot_score = scoring::kinematic_floor(
            scoring::blend_alignment(base.bot_score, legacy, anomaly.score),
            &movement,
        );

        let flags = movement
            .flags
            .iter()
            .chain(&base.flags)
            .chain(&anomaly.flags)
            .copied()
            .collect();

        AlignmentAnalysis {
            movement,
            base,
            anomaly,
            legacy,
            bot_score,
            flags,
        }
    }

    /// Angle within the effective tolerance and a plausible reaction time.
    /// Returns the angle error and the tolerance applied.
    fn check_angle(
        &self,
        record: &ChallengeRecord,
        risk: RiskLevel,
        submission: &Submission<'_>,
        detail: impl FnOnce() -> RejectionDetail,
    ) -> Result<(f64, u32), VerifyError> {
        let tolerance = effective_tolerance(record.tolerance, risk);
        let angle_error = angular_distance(submission.user_angle, record.target_angle as f64);
        let reaction_ok = (self.scoring.min_reaction_ms..=self.scoring.max_reaction_ms)
            .contains(&submission.reaction_ms);

        if angle_error <= tolerance as f64 && reaction_ok {
            Ok((angle_error, tolerance))
        } else {
            Err(VerifyError::Alignment {
                angle_error,
                tolerance,
                reaction_ms: submission.reaction_ms,
                detail: Box::new(detail()),
            })
        }
    }

    /// Consume the challenge and clear the failure counter
    async fn accept(
        &self,
        ctx: &RequestContext,
        record: &ChallengeRecord,
        fingerprint: &str,
        now_ms: i64,
    ) -> Result<(), VerifyError> {
        self.challenges
            .consume_at(&record.nonce, record.kind, Some(fingerprint), now_ms)
            .await?;

        if let Err(e) = self.guard.reset_failures(&ctx.identity).await {
            tracing::warn!(identity = %ctx.identity, error = %e, "Failed to reset failure counter");
        }
        Ok(())
    }

    /// Failure accounting and logging for a finished verification
    async fn settle(
        &self,
        ctx: &RequestContext,
        result: Result<VerificationSuccess, VerifyError>,
    ) -> Result<VerificationSuccess, VerifyError> {
        let Err(err) = &result else {
            return result;
        };

        if err.counts_as_failure() {
            if let Err(e) = self.guard.note_failure(&ctx.identity).await {
                tracing::error!(identity = %ctx.identity, error = %e, "Failed to record failure");
            }
        }

        match err {
            VerifyError::Internal(cause) => {
                tracing::error!(identity = %ctx.identity, error = %cause, "Verification fault")
            }
            _ => tracing::debug!(
                identity = %ctx.identity,
                reason = err.reason(),
                error = %err,
                "Verification rejected"
            ),
        }

        result
    }
}

/// Record tolerance, tightened for busy or suspicious identities
fn effective_tolerance(record_tolerance: u32, risk: RiskLevel) -> u32 {
    match risk {
        RiskLevel::Low => record_tolerance,
        RiskLevel::Medium | RiskLevel::High => record_tolerance.min(risk.tolerance()),
    }
}
