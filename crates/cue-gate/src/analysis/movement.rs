//! Pointer-movement kinematics.
//!
//! Humans move with jitter and uneven speed. Scripted cursors tend to move
//! in straight lines at constant speed.

use serde::Serialize;

use cue_common::{Flag, PointerSample, RiskLevel};

/// Cross-product magnitude under which a triple counts as linear
const MIN_NATURAL_JITTER: f64 = 0.1;
/// Ratio of linear triples at or above which the trace looks scripted
const MAX_LINEAR_RATIO: f64 = 0.4;
const MIN_SPEED_VARIANCE: f64 = 0.3;
const MIN_ACC_VARIANCE: f64 = 0.05;
const MIN_JERK_VARIANCE: f64 = 0.1;
/// Elapsed-time floor in milliseconds
const MIN_DT_MS: f64 = 1.0;
/// Interval bucket width for the timestamp entropy heuristic
const ENTROPY_BUCKET_MS: f64 = 16.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementStats {
    pub avg_speed: f64,
    pub speed_variance: f64,
    pub acc_variance: f64,
    pub jerk_variance: f64,
    pub pressure_variance: f64,
    pub linear_ratio: f64,
}

/// Verdict of the kinematic check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementAnalysis {
    pub valid: bool,
    /// 0-1
    pub confidence: f64,
    pub flags: Vec<Flag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<MovementStats>,
}

impl MovementAnalysis {
    fn rejected(flag: Flag) -> Self {
        Self {
            valid: false,
            confidence: 0.0,
            flags: vec![flag],
            stats: None,
        }
    }
}

/// Older timing/pressure heuristics, kept as a second opinion
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementHeuristics {
    /// Shannon entropy (bits) of 16ms-bucketed sample intervals
    pub timestamp_entropy: f64,
    pub pressure_variance: f64,
    pub constant_intervals: bool,
}

/// Validate a movement trace at the given risk level
pub fn validate_movements(samples: &[PointerSample], risk: RiskLevel) -> MovementAnalysis {
    // Keyboard-only alignment produces a single synthetic sample
    if let [only] = samples {
        if only.keyboard {
            return MovementAnalysis {
                valid: true,
                confidence: 0.5,
                flags: Vec::new(),
                stats: None,
            };
        }
    }

    if samples.len() < risk.min_samples() {
        return MovementAnalysis::rejected(Flag::InsufficientMovements);
    }

    let mut linear = 0usize;
    let mut speeds = Vec::with_capacity(samples.len());
    let mut accs = Vec::with_capacity(samples.len());
    let mut jerks = Vec::with_capacity(samples.len());
    let mut pressures = Vec::with_capacity(samples.len());

    for window in samples.windows(3) {
        let (p1, p2, p3) = (&window[0], &window[1], &window[2]);

        if cross(p1, p2, p3) < MIN_NATURAL_JITTER {
            linear += 1;
        }

        let dt1 = elapsed_ms(p1, p2);
        let dt2 = elapsed_ms(p2, p3);
        let v2 = speed(p2, p3, dt2);
        let v1 = speed(p1, p2, dt1);
        let v0 = p1.speed.unwrap_or(0.0);

        // Accelerations and jerk in per-second units
        let acc = (v2 - v1) / (dt2 / 1000.0);
        let prev_acc = (v1 - v0) / (dt1 / 1000.0);
        let jerk = (acc - prev_acc) / (dt2 / 1000.0);

        speeds.push(v2);
        accs.push(acc);
        jerks.push(jerk);
        pressures.push(p3.pressure.unwrap_or(0.0));
    }

    let (avg_speed, speed_variance) = mean_variance(&speeds);
    let (_, acc_variance) = mean_variance(&accs);
    let (_, jerk_variance) = mean_variance(&jerks);
    let (_, pressure_variance) = mean_variance(&pressures);
    let linear_ratio = linear as f64 / samples.len() as f64;

    let valid = linear_ratio < MAX_LINEAR_RATIO
        || speed_variance > MIN_SPEED_VARIANCE
        || acc_variance > MIN_ACC_VARIANCE
        || jerk_variance > MIN_JERK_VARIANCE;

    let confidence = (1.0 - linear_ratio
        + speed_variance.min(1.0) * 0.3
        + acc_variance.min(1.0) * 0.2)
        .clamp(0.0, 1.0);

    let mut flags = Vec::new();
    if linear_ratio >= MAX_LINEAR_RATIO {
        flags.push(Flag::LinearMovement);
    }
    if !speeds.is_empty() && speed_variance <= f64::EPSILON {
        flags.push(Flag::PerfectVelocity);
    }

    MovementAnalysis {
        valid,
        confidence,
        flags,
        stats: Some(MovementStats {
            avg_speed,
            speed_variance,
            acc_variance,
            jerk_variance,
            pressure_variance,
            linear_ratio,
        }),
    }
}

/// Interval entropy, pressure variance and constant-interval detection
pub fn movement_heuristics(samples: &[PointerSample]) -> MovementHeuristics {
    if samples.len() < 2 {
        return MovementHeuristics::default();
    }

    let intervals: Vec<f64> = samples
        .windows(2)
        .map(|pair| pair[1].timestamp - pair[0].timestamp)
        .collect();
    let pressures: Vec<f64> = samples[1..]
        .iter()
        .map(|s| s.pressure.unwrap_or(0.0))
        .collect();

    let mut buckets: std::collections::HashMap<i64, usize> = std::collections::HashMap::new();
    for dt in &intervals {
        *buckets.entry((dt / ENTROPY_BUCKET_MS).round() as i64).or_default() += 1;
    }

    let total = intervals.len() as f64;
    let timestamp_entropy = buckets
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum();

    let (_, pressure_variance) = mean_variance(&pressures);
    let constant_intervals = (buckets.len() as f64) < (total * 0.2).max(2.0);

    MovementHeuristics {
        timestamp_entropy,
        pressure_variance,
        constant_intervals,
    }
}

/// Legacy automation score from the heuristics and movement confidence, capped at 1
pub fn legacy_score(heuristics: &MovementHeuristics, confidence: f64) -> f64 {
    let mut score = 0.0;
    if heuristics.timestamp_entropy < 2.0 {
        score += 0.4;
    }
    if heuristics.pressure_variance < 0.01 {
        score += 0.2;
    }
    if heuristics.constant_intervals {
        score += 0.3;
    }
    if confidence < 0.2 {
        score += 0.3;
    }
    f64::min(score, 1.0)
}

/// Twice the area of the triangle p1-p2-p3
pub(crate) fn cross(p1: &PointerSample, p2: &PointerSample, p3: &PointerSample) -> f64 {
    ((p2.y - p1.y) * (p3.x - p1.x) - (p3.y - p1.y) * (p2.x - p1.x)).abs()
}

fn elapsed_ms(from: &PointerSample, to: &PointerSample) -> f64 {
    (to.timestamp - from.timestamp).max(MIN_DT_MS)
}

/// Reported speed of `to`, else displacement over elapsed time
fn speed(from: &PointerSample, to: &PointerSample, dt_ms: f64) -> f64 {
    to.speed
        .unwrap_or_else(|| (to.x - from.x).hypot(to.y - from.y) / dt_ms)
}

/// Population mean and variance; zeros for an empty slice
pub(crate) fn mean_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}
