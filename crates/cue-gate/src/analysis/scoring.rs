//! Comprehensive bot-likelihood scoring.
//!
//! Five independent components are weighted into a base score:
//!
//! | Component | Weight |
//! |---|---|
//! | automation signatures | 0.25 |
//! | temporal rhythm | 0.20 |
//! | micro-behavior | 0.20 |
//! | honeypot | 0.15 |
//! | canvas integrity | 0.20 |
//!
//! The verifier then blends the base score with the legacy movement score,
//! behavioral anomalies and (for gestures) stroke biometrics and shape.
//! Every function here is pure.

use serde::Serialize;
use std::f64::consts::PI;

use cue_common::{
    AutomationSignals, CanvasSignals, ComponentBreakdown, Flag, HoneypotSignals, PointerSample,
    Recommendation, Telemetry,
};

use super::biometrics::fold_turn;
use super::movement::{MovementAnalysis, cross, mean_variance};

const AUTOMATION_WEIGHT: f64 = 0.25;
const TEMPORAL_WEIGHT: f64 = 0.20;
const MICRO_BEHAVIOR_WEIGHT: f64 = 0.20;
const HONEYPOT_WEIGHT: f64 = 0.15;
const CANVAS_WEIGHT: f64 = 0.20;

/// Press intervals below this are machine-fast
const MAX_CLICK_SPEED_MS: f64 = 50.0;
const MIN_RHYTHM_CV: f64 = 0.15;
/// Natural think-time band between presses
const HESITATION_BAND_MS: (f64, f64) = (100.0, 2000.0);
/// Rhythm needs this many samples before it is judged
const MIN_RHYTHM_SAMPLES: usize = 4;

const MIN_MICRO_SAMPLES: usize = 5;
/// Step length band (px) counted as tremor
const TREMOR_STEP_PX: (f64, f64) = (0.1, 2.0);
const MIN_TREMOR_RATIO: f64 = 0.05;
/// Heading change treated as a correction (about 126 degrees)
const CORRECTION_TURN_RAD: f64 = PI * 0.7;
const MIN_CORRECTIONS: usize = 3;
const PERFECT_LINE_CROSS: f64 = 0.5;
const MAX_PERFECT_LINES: usize = 2;

/// Weighted base score with its component breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveScore {
    /// 0-1
    pub bot_score: f64,
    pub human_likelihood: f64,
    pub breakdown: ComponentBreakdown,
    pub flags: Vec<Flag>,
    pub recommendation: Recommendation,
}

/// Score client telemetry and pointer samples
pub fn comprehensive_score(
    telemetry: Option<&Telemetry>,
    samples: &[PointerSample],
) -> ComprehensiveScore {
    let mut flags = Vec::new();

    let automation = automation_score(telemetry.and_then(|t| t.automation.as_ref()));
    if automation > 0.0 {
        flags.push(Flag::AutomationSignature);
    }
    let temporal = temporal_rhythm(samples, &mut flags);
    let micro = micro_behavior(samples, &mut flags);
    let honeypot = honeypot_score(telemetry.and_then(|t| t.honeypot.as_ref()), &mut flags);
    let canvas = canvas_score(telemetry.and_then(|t| t.canvas_analysis.as_ref()), &mut flags);

    let breakdown = ComponentBreakdown {
        automation: automation * AUTOMATION_WEIGHT,
        temporal: temporal * TEMPORAL_WEIGHT,
        micro_behavior: micro * MICRO_BEHAVIOR_WEIGHT,
        honeypot: honeypot * HONEYPOT_WEIGHT,
        canvas: canvas * CANVAS_WEIGHT,
    };
    let bot_score = (breakdown.automation
        + breakdown.temporal
        + breakdown.micro_behavior
        + breakdown.honeypot
        + breakdown.canvas)
        .min(1.0);

    ComprehensiveScore {
        bot_score,
        human_likelihood: 1.0 - bot_score,
        breakdown,
        flags,
        recommendation: Recommendation::from_score(bot_score),
    }
}

fn automation_score(signals: Option<&AutomationSignals>) -> f64 {
    let Some(signals) = signals else {
        return 0.0;
    };
    let score = [
        (signals.webdriver, 0.4),
        (signals.selenium, 0.4),
        (signals.headless, 0.2),
        (signals.phantom, 0.3),
        (signals.nightmare, 0.3),
    ]
    .iter()
    .filter(|(present, _)| *present)
    .map(|(_, weight)| weight)
    .sum::<f64>();
    score.min(1.0)
}

/// Rhythm of discrete presses
fn temporal_rhythm(samples: &[PointerSample], flags: &mut Vec<Flag>) -> f64 {
    if samples.len() < MIN_RHYTHM_SAMPLES {
        return 0.0;
    }

    let presses: Vec<f64> = samples
        .iter()
        .filter(|s| s.kind.is_some_and(|k| k.is_press()))
        .map(|s| s.timestamp)
        .collect();
    if presses.len() < 2 {
        return 0.0;
    }
    let intervals: Vec<f64> = presses.windows(2).map(|w| w[1] - w[0]).collect();

    let mut suspicion = 0.0;

    let too_fast = intervals.iter().filter(|&&i| i < MAX_CLICK_SPEED_MS).count();
    if too_fast > 0 {
        flags.push(Flag::RapidClicking);
        suspicion += 0.3 * too_fast as f64 / intervals.len() as f64;
    }

    if intervals.len() >= 2 {
        let (mean, variance) = mean_variance(&intervals);
        if mean > 0.0 && variance.sqrt() / mean < MIN_RHYTHM_CV {
            flags.push(Flag::RoboticRhythm);
            suspicion += 0.25;
        }
    }

    let hesitates = intervals
        .iter()
        .any(|i| (HESITATION_BAND_MS.0..=HESITATION_BAND_MS.1).contains(i));
    if !hesitates && intervals.len() > 2 {
        flags.push(Flag::NoNaturalHesitation);
        suspicion += 0.2;
    }

    f64::min(suspicion, 1.0)
}

/// Tremor, error correction and perfectly straight runs
fn micro_behavior(samples: &[PointerSample], flags: &mut Vec<Flag>) -> f64 {
    if samples.len() < MIN_MICRO_SAMPLES {
        return 0.0;
    }

    let mut human: f64 = 0.5;

    let tremor_steps = samples
        .windows(2)
        .map(|w| (w[1].x - w[0].x).hypot(w[1].y - w[0].y))
        .filter(|&d| d > TREMOR_STEP_PX.0 && d < TREMOR_STEP_PX.1)
        .count();
    if tremor_steps as f64 / samples.len() as f64 >= MIN_TREMOR_RATIO {
        human += 0.2;
    } else {
        flags.push(Flag::NoNaturalTremor);
        human -= 0.15;
    }

    let corrections = samples
        .windows(3)
        .filter(|w| {
            let before = (w[1].y - w[0].y).atan2(w[1].x - w[0].x);
            let after = (w[2].y - w[1].y).atan2(w[2].x - w[1].x);
            fold_turn(after - before).abs() > CORRECTION_TURN_RAD
        })
        .count();
    if corrections >= MIN_CORRECTIONS {
        human += 0.15;
    } else if corrections == 0 && samples.len() > 10 {
        flags.push(Flag::NoErrorCorrection);
        human -= 0.2;
    }

    let perfect_lines = samples
        .windows(3)
        .filter(|w| cross(&w[0], &w[1], &w[2]) < PERFECT_LINE_CROSS)
        .count();
    if perfect_lines > MAX_PERFECT_LINES {
        flags.push(Flag::TooManyPerfectLines);
        human -= 0.25;
    }

    1.0 - human.clamp(0.0, 1.0)
}

fn honeypot_score(signals: Option<&HoneypotSignals>, flags: &mut Vec<Flag>) -> f64 {
    let Some(signals) = signals else {
        return 0.0;
    };
    let mut score = 0.0;
    if signals.invisible_clicked {
        flags.push(Flag::ClickedInvisibleElement);
        score += 0.5;
    }
    if signals.hidden_field_filled {
        flags.push(Flag::FilledHiddenFormField);
        score += 0.5;
    }
    if signals.trap_hovered {
        flags.push(Flag::HoveredTrapElement);
        score += 0.2;
    }
    f64::min(score, 1.0)
}

fn canvas_score(signals: Option<&CanvasSignals>, flags: &mut Vec<Flag>) -> f64 {
    let Some(signals) = signals else {
        return 0.0;
    };
    let mut score = 0.0;
    if signals.noise_layer_missing {
        flags.push(Flag::NoiseLayerRemoved);
        score += 0.3;
    }
    if signals.data_extraction_attempts > 0 {
        flags.push(Flag::CanvasDataExtraction);
        score += 0.4;
    }
    if signals.layers_mismatch {
        flags.push(Flag::VisualCryptoTampered);
        score += 0.35;
    }
    f64::min(score, 1.0)
}

/// Alignment verdict score: base blended with the worse of legacy and anomaly
pub fn blend_alignment(base: f64, legacy: f64, anomaly: f64) -> f64 {
    0.6 * base + 0.4 * legacy.max(anomaly)
}

/// Gesture verdict score from alignment, stroke humanity and shape validity
pub fn blend_gesture(alignment: f64, avg_human_score: f64, shape_valid: bool) -> f64 {
    let shape_penalty = if shape_valid { 0.0 } else { 0.5 };
    0.4 * alignment + 0.4 * (1.0 - avg_human_score) + 0.2 * shape_penalty
}

/// A kinematically invalid trace cannot score below `1 - confidence`
pub fn kinematic_floor(score: f64, movement: &MovementAnalysis) -> f64 {
    if movement.valid {
        score
    } else {
        score.max(1.0 - movement.confidence)
    }
}

/// Accept confidence, 0-100
pub fn confidence(angle_error: f64, tolerance: u32, movement_confidence: f64, bot_score: f64) -> u8 {
    let angle_score = if tolerance == 0 {
        if angle_error == 0.0 { 1.0 } else { 0.0 }
    } else {
        (1.0 - angle_error / (tolerance as f64 * 4.0)).max(0.0)
    };
    let raw = 0.7 * angle_score + 0.3 * movement_confidence.clamp(0.0, 1.0);
    let penalty = raw.min(0.2 * bot_score);
    ((raw - penalty).max(0.0) * 100.0).round().min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::movement::tests::{frozen_samples, natural_samples};
    use crate::analysis::movement::validate_movements;
    use cue_common::{RiskLevel, SampleKind};

    fn clicks(timestamps: &[f64]) -> Vec<PointerSample> {
        timestamps
            .iter()
            .enumerate()
            .map(|(i, &timestamp)| PointerSample {
                x: 100.0 + i as f64 * 7.0,
                y: 100.0 + (i % 3) as f64 * 5.0,
                timestamp,
                kind: Some(SampleKind::Click),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_clean_natural_trace_scores_low() {
        let score = comprehensive_score(None, &natural_samples());
        assert!(score.bot_score < 0.1, "bot score {}", score.bot_score);
        assert_eq!(score.recommendation, Recommendation::Accept);
        assert!(score.flags.is_empty(), "{:?}", score.flags);
        assert!((score.human_likelihood + score.bot_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let telemetry = Telemetry {
            honeypot: Some(HoneypotSignals {
                trap_hovered: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let first = comprehensive_score(Some(&telemetry), &natural_samples());
        let second = comprehensive_score(Some(&telemetry), &natural_samples());
        assert_eq!(first, second);
    }

    #[test]
    fn test_automation_signatures() {
        let telemetry = Telemetry {
            automation: Some(AutomationSignals {
                webdriver: true,
                selenium: true,
                headless: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let score = comprehensive_score(Some(&telemetry), &[]);
        assert!((score.breakdown.automation - 0.25).abs() < 1e-12);
        assert_eq!(score.flags, vec![Flag::AutomationSignature]);
    }

    #[test]
    fn test_honeypot_and_canvas() {
        let telemetry = Telemetry {
            honeypot: Some(HoneypotSignals {
                invisible_clicked: true,
                hidden_field_filled: true,
                trap_hovered: true,
            }),
            canvas_analysis: Some(CanvasSignals {
                noise_layer_missing: true,
                data_extraction_attempts: 3,
                layers_mismatch: true,
            }),
            ..Default::default()
        };
        let score = comprehensive_score(Some(&telemetry), &[]);
        // Both components saturate at 1
        assert!((score.breakdown.honeypot - 0.15).abs() < 1e-12);
        assert!((score.breakdown.canvas - 0.20).abs() < 1e-12);
        assert!((score.bot_score - 0.35).abs() < 1e-12);
        for flag in [
            Flag::ClickedInvisibleElement,
            Flag::FilledHiddenFormField,
            Flag::HoveredTrapElement,
            Flag::NoiseLayerRemoved,
            Flag::CanvasDataExtraction,
            Flag::VisualCryptoTampered,
        ] {
            assert!(score.flags.contains(&flag), "missing {:?}", flag);
        }
    }

    #[test]
    fn test_metronome_clicking() {
        let mut flags = Vec::new();
        let suspicion = temporal_rhythm(&clicks(&[0.0, 30.0, 60.0, 90.0, 120.0]), &mut flags);
        assert_eq!(
            flags,
            vec![Flag::RapidClicking, Flag::RoboticRhythm, Flag::NoNaturalHesitation]
        );
        assert!((suspicion - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_human_clicking_rhythm() {
        let mut flags = Vec::new();
        let suspicion = temporal_rhythm(&clicks(&[0.0, 420.0, 610.0, 1_480.0, 1_700.0]), &mut flags);
        assert!(flags.is_empty());
        assert_eq!(suspicion, 0.0);
    }

    #[test]
    fn test_frozen_trace_micro_behavior() {
        let mut flags = Vec::new();
        let suspicion = micro_behavior(&frozen_samples(20), &mut flags);
        assert_eq!(
            flags,
            vec![Flag::NoNaturalTremor, Flag::NoErrorCorrection, Flag::TooManyPerfectLines]
        );
        assert_eq!(suspicion, 1.0);
    }

    #[test]
    fn test_short_traces_are_not_judged() {
        let mut flags = Vec::new();
        assert_eq!(micro_behavior(&frozen_samples(4), &mut flags), 0.0);
        assert_eq!(temporal_rhythm(&clicks(&[0.0, 10.0, 20.0]), &mut flags), 0.0);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_blends() {
        assert!((blend_alignment(0.5, 0.2, 0.7) - 0.58).abs() < 1e-12);
        assert!((blend_gesture(0.5, 0.75, true) - 0.3).abs() < 1e-12);
        assert!((blend_gesture(0.5, 0.75, false) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_kinematic_floor() {
        let frozen = validate_movements(&frozen_samples(20), RiskLevel::Low);
        let floored = kinematic_floor(0.1, &frozen);
        assert!((floored - (1.0 - frozen.confidence)).abs() < 1e-12);

        let natural = validate_movements(&natural_samples(), RiskLevel::Low);
        assert_eq!(kinematic_floor(0.1, &natural), 0.1);
    }

    #[test]
    fn test_confidence() {
        assert_eq!(confidence(0.0, 8, 1.0, 0.0), 100);
        // 0.7 * 0.5 + 0.3 * 0.5 = 0.5, minus 0.2 * 0.5
        assert_eq!(confidence(16.0, 8, 0.5, 0.5), 40);
        assert_eq!(confidence(90.0, 4, 0.0, 1.0), 0);
    }
}
