//! Core types shared across Align-on-Cue components.

use serde::{Deserialize, Serialize};

/// Risk level of a client identity.
/// Controls how much movement evidence is demanded and how tight the
/// alignment tolerance becomes.
///
/// - LOW: default for unknown identities
/// - MEDIUM: busy identities (many requests in the rate window)
/// - HIGH: identities in the suspicious set
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Minimum pointer samples required at this level
    pub fn min_samples(&self) -> usize {
        match self {
            Self::Low => 5,
            Self::Medium => 10,
            Self::High => 15,
        }
    }

    /// Alignment tolerance in degrees at this level
    pub fn tolerance(&self) -> u32 {
        match self {
            Self::Low => 8,
            Self::Medium => 6,
            Self::High => 4,
        }
    }
}

/// Scoring recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Accept,
    Challenge,
    Reject,
}

impl Recommendation {
    /// Map a bot score onto a recommendation
    pub fn from_score(bot_score: f64) -> Self {
        if bot_score > 0.65 {
            Self::Reject
        } else if bot_score > 0.4 {
            Self::Challenge
        } else {
            Self::Accept
        }
    }
}

/// Pointer event kind reported by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Move,
    Click,
    PointerDown,
    PointerUp,
    #[serde(other)]
    Other,
}

impl SampleKind {
    /// Does this sample mark a discrete press?
    pub fn is_press(&self) -> bool {
        matches!(self, Self::Click | Self::PointerDown)
    }
}

/// A pointer-movement sample captured while aligning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    /// Milliseconds, client clock
    #[serde(default)]
    pub timestamp: f64,
    /// Client-reported speed (px/ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SampleKind>,
    /// Synthetic sample emitted by keyboard-only alignment
    #[serde(default)]
    pub keyboard: bool,
}

/// A point of a drawn stroke
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub timestamp: f64,
}

/// Client-side signals gathered by the widget
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    #[serde(default)]
    pub automation: Option<AutomationSignals>,
    #[serde(default)]
    pub honeypot: Option<HoneypotSignals>,
    #[serde(default)]
    pub canvas_analysis: Option<CanvasSignals>,
}

/// Browser automation fingerprints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSignals {
    pub webdriver: bool,
    pub selenium: bool,
    pub headless: bool,
    pub phantom: bool,
    pub nightmare: bool,
}

/// Interactions with invisible trap elements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HoneypotSignals {
    pub invisible_clicked: bool,
    pub hidden_field_filled: bool,
    pub trap_hovered: bool,
}

/// Canvas integrity report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CanvasSignals {
    pub noise_layer_missing: bool,
    pub data_extraction_attempts: u32,
    pub layers_mismatch: bool,
}

/// Gesture shape requested by a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureKind {
    Circle,
    Swipe,
    /// Reserved: path matching is not implemented
    Trace,
    #[serde(other)]
    Unknown,
}

/// Drawn gesture submitted with a verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureSubmission {
    #[serde(rename = "type")]
    pub kind: GestureKind,
    pub strokes: Vec<Vec<StrokePoint>>,
    /// Expected swipe direction in degrees (0 = right, 90 = up)
    #[serde(default)]
    pub expected_angle: Option<f64>,
}

/// Signed alignment challenge sent to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeBlob {
    pub nonce: String,
    pub seed: u32,
    pub pow_difficulty: u8,
    /// Degrees
    pub tolerance: u32,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Signed gesture challenge sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureChallengeBlob {
    pub id: String,
    /// Target bar angle in degrees
    pub angle: u32,
    /// Issue time in epoch milliseconds
    pub ts: i64,
    pub v2: GestureSpec,
}

/// Gesture challenge selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureSpec {
    pub difficulty: ChallengeDifficulty,
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
    pub instruction: String,
    pub config: DifficultyProfile,
}

impl GestureSpec {
    pub fn new(difficulty: ChallengeDifficulty, challenge_type: ChallengeType) -> Self {
        Self {
            difficulty,
            challenge_type,
            instruction: challenge_type.instruction().to_string(),
            config: difficulty.profile(),
        }
    }
}

/// Gesture challenge difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChallengeDifficulty {
    Easy,
    Medium,
    Hard,
}

impl ChallengeDifficulty {
    pub fn profile(&self) -> DifficultyProfile {
        match self {
            Self::Easy => DifficultyProfile {
                challenge_types: vec![ChallengeType::AlignCircle, ChallengeType::AlignSwipe],
                shape_accuracy: 0.65,
                time_limit: 15_000,
                retries: 3,
            },
            Self::Medium => DifficultyProfile {
                challenge_types: vec![ChallengeType::AlignCircleSwipe, ChallengeType::AlignTrace],
                shape_accuracy: 0.75,
                time_limit: 12_000,
                retries: 2,
            },
            Self::Hard => DifficultyProfile {
                challenge_types: vec![
                    ChallengeType::AlignCircleTrace,
                    ChallengeType::AlignMultiGesture,
                ],
                shape_accuracy: 0.85,
                time_limit: 10_000,
                retries: 1,
            },
        }
    }
}

/// Parameters attached to a difficulty level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyProfile {
    pub challenge_types: Vec<ChallengeType>,
    pub shape_accuracy: f64,
    /// Milliseconds
    pub time_limit: u32,
    pub retries: u8,
}

/// Combined align-and-gesture challenge type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    AlignCircle,
    AlignSwipe,
    AlignCircleSwipe,
    AlignTrace,
    AlignCircleTrace,
    AlignMultiGesture,
}

impl ChallengeType {
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::AlignCircle => "Align the lines, then draw a circle around the dot",
            Self::AlignSwipe => "Align the lines, then swipe in the direction shown",
            Self::AlignCircleSwipe => "Align the lines, draw a circle, then swipe right",
            Self::AlignTrace => "Align the lines, then trace the path shown",
            Self::AlignMultiGesture => {
                "Complete all gestures in order: align, circle, then arrow"
            }
            Self::AlignCircleTrace => "Complete the challenge",
        }
    }
}

/// Why a drawn shape was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeReason {
    InsufficientPoints,
    NotCircularEnough,
    TooPerfect,
    TooShort,
    WrongDirection,
    NotStraight,
    TooManyCurves,
}

/// 2D point
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Outcome of the geometric shape check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ShapeReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<Flag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circularity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_angle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle_error: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub straightness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curves: Option<usize>,
}

impl ShapeValidation {
    pub fn rejected(reason: ShapeReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            ..Default::default()
        }
    }

    pub fn passed_with_warning(warning: Flag) -> Self {
        Self {
            valid: true,
            warning: Some(warning),
            ..Default::default()
        }
    }
}

/// Diagnostic flag raised by any analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    // Kinematics
    InsufficientMovements,
    LinearMovement,
    PerfectVelocity,

    // Stroke biometrics
    InsufficientPoints,
    ExcessivePoints,
    TooFast,
    Timeout,
    UnnaturalVelocityVariance,
    ConstantPressure,
    SyntheticPressure,
    NoPressureData,
    NoNaturalTremor,
    NoHesitation,
    TooLinear,

    // Temporal rhythm
    RapidClicking,
    RoboticRhythm,
    NoNaturalHesitation,

    // Micro-behavior
    NoErrorCorrection,
    TooManyPerfectLines,

    // Client signals
    AutomationSignature,
    ClickedInvisibleElement,
    FilledHiddenFormField,
    HoveredTrapElement,
    NoiseLayerRemoved,
    CanvasDataExtraction,
    VisualCryptoTampered,

    // Behavioral history
    VelocityAnomaly,
    MultipleUserAgents,
    SuspiciousReactionTime,
    PerfectAccuracyPattern,
    ConstantAttemptIntervals,
    RapidAttempts,

    // Shape
    CircleInsufficientPoints,
    CircleNotCircularEnough,
    CircleTooPerfect,
    SwipeInsufficientPoints,
    SwipeTooShort,
    SwipeWrongDirection,
    SwipeNotStraight,
    SwipeTooManyCurves,
    ShapeValidationFailed,
    UnknownGestureType,
    ReservedGestureType,
}

/// Weighted contribution of each alignment-scoring component
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentBreakdown {
    pub automation: f64,
    pub temporal: f64,
    pub micro_behavior: f64,
    pub honeypot: f64,
    pub canvas: f64,
}

/// Gesture verification score split
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GestureBreakdown {
    pub alignment: f64,
    pub gesture: f64,
    pub shape: f64,
}

/// Shape section of a gesture verification response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeReport {
    pub valid: bool,
    #[serde(rename = "type")]
    pub kind: GestureKind,
    pub metrics: ShapeValidation,
}

/// Successful verification returned to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSuccess {
    pub ok: bool,
    pub message: String,
    /// 0-100
    pub confidence: u8,
    pub human_likelihood: f64,
    pub bot_score: f64,
    pub recommendation: Recommendation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<GestureBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape_validation: Option<ShapeReport>,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_strictness_grows() {
        assert!(RiskLevel::High.min_samples() > RiskLevel::Medium.min_samples());
        assert!(RiskLevel::High.tolerance() < RiskLevel::Low.tolerance());
        assert_eq!(RiskLevel::default(), RiskLevel::Low);
    }

    #[test]
    fn test_recommendation_thresholds() {
        assert_eq!(Recommendation::from_score(0.66), Recommendation::Reject);
        assert_eq!(Recommendation::from_score(0.65), Recommendation::Challenge);
        assert_eq!(Recommendation::from_score(0.41), Recommendation::Challenge);
        assert_eq!(Recommendation::from_score(0.4), Recommendation::Accept);
    }

    #[test]
    fn test_pointer_sample_wire_format() {
        let sample: PointerSample = serde_json::from_str(
            r#"{"x":1.5,"y":2,"timestamp":10,"type":"pointerdown","pressure":0.4}"#,
        )
        .unwrap();
        assert_eq!(sample.kind, Some(SampleKind::PointerDown));
        assert_eq!(sample.speed, None);
        assert!(!sample.keyboard);

        let odd: PointerSample = serde_json::from_str(r#"{"x":0,"y":0,"type":"wheel"}"#).unwrap();
        assert_eq!(odd.kind, Some(SampleKind::Other));
    }

    #[test]
    fn test_telemetry_camel_case() {
        let telemetry: Telemetry = serde_json::from_str(
            r#"{"automation":{"webdriver":true},
                "honeypot":{"invisibleClicked":true},
                "canvasAnalysis":{"dataExtractionAttempts":2}}"#,
        )
        .unwrap();
        assert!(telemetry.automation.unwrap().webdriver);
        assert!(telemetry.honeypot.unwrap().invisible_clicked);
        assert_eq!(telemetry.canvas_analysis.unwrap().data_extraction_attempts, 2);
    }

    #[test]
    fn test_gesture_unknown_type_deserializes() {
        let gesture: GestureSubmission =
            serde_json::from_str(r#"{"type":"spiral","strokes":[]}"#).unwrap();
        assert_eq!(gesture.kind, GestureKind::Unknown);
    }

    #[test]
    fn test_gesture_spec_wire_format() {
        let spec = GestureSpec::new(ChallengeDifficulty::Easy, ChallengeType::AlignCircle);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["difficulty"], "EASY");
        assert_eq!(json["type"], "align_circle");
        assert_eq!(json["config"]["timeLimit"], 15_000);
    }
}
