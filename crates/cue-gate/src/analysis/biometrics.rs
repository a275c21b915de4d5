//! Stroke biometrics for drawn gestures.

use serde::Serialize;
use std::f64::consts::PI;

use cue_common::{Flag, StrokePoint};

const MIN_POINTS: usize = 5;
const MAX_POINTS: usize = 1000;
const MIN_DURATION_MS: f64 = 150.0;
const MAX_DURATION_MS: f64 = 10_000.0;
/// Accepted human band for the velocity coefficient of variation
const VELOCITY_CV_BAND: (f64, f64) = (0.25, 0.8);
/// Below this velocity CV the pen moves at machine-constant speed
const MAX_PERFECT_VELOCITY_CV: f64 = 0.1;
const MIN_PRESSURE_CV: f64 = 0.15;
/// Natural hand tremor band in Hz
const TREMOR_HZ_BAND: (f64, f64) = (6.0, 12.0);
/// Turn (rad) that counts toward tremor
const TREMOR_TURN_RAD: f64 = 0.1;
/// Inter-point gap (ms) that counts as a hesitation
const HESITATION_MS: f64 = 150.0;
/// Turn (rad) that counts as a direction change
const DIRECTION_CHANGE_RAD: f64 = 0.3;
const MIN_DIRECTION_CHANGES: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeMetrics {
    pub duration: f64,
    pub avg_velocity: f64,
    pub velocity_cv: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure_cv: Option<f64>,
    pub tremor_hz: f64,
    pub hesitations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_deviation: Option<f64>,
    pub direction_changes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeAnalysis {
    /// 0-1, higher is more human
    pub human_score: f64,
    pub flags: Vec<Flag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<StrokeMetrics>,
}

impl StrokeAnalysis {
    fn rejected(flag: Flag) -> Self {
        Self {
            human_score: 0.0,
            flags: vec![flag],
            metrics: None,
        }
    }
}

/// Fold a heading difference into [-PI, PI]
pub(crate) fn fold_turn(mut diff: f64) -> f64 {
    while diff > PI {
        diff -= 2.0 * PI;
    }
    while diff < -PI {
        diff += 2.0 * PI;
    }
    diff
}

/// Angle between consecutive segments, folded into [-PI, PI]
pub(crate) fn turn_angles(points: &[StrokePoint]) -> Vec<f64> {
    points
        .windows(3)
        .map(|w| {
            let a1 = (w[1].y - w[0].y).atan2(w[1].x - w[0].x);
            let a2 = (w[2].y - w[1].y).atan2(w[2].x - w[1].x);
            fold_turn(a2 - a1)
        })
        .collect()
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    let (mean, variance) = super::movement::mean_variance(values);
    if mean > 0.0 { variance.sqrt() / mean } else { 0.0 }
}

/// Score one stroke for human-likeness
pub fn analyze_stroke(points: &[StrokePoint]) -> StrokeAnalysis {
    if points.len() < MIN_POINTS {
        return StrokeAnalysis::rejected(Flag::InsufficientPoints);
    }
    if points.len() > MAX_POINTS {
        return StrokeAnalysis::rejected(Flag::ExcessivePoints);
    }

    let mut flags = Vec::new();
    let first = points[0];
    let last = points[points.len() - 1];
    let duration = last.timestamp - first.timestamp;

    if duration < MIN_DURATION_MS {
        flags.push(Flag::TooFast);
    }
    if duration > MAX_DURATION_MS {
        flags.push(Flag::Timeout);
    }

    // Velocity profile
    let velocities: Vec<f64> = points
        .windows(2)
        .map(|w| {
            let dt = w[1].timestamp - w[0].timestamp;
            if dt > 0.0 {
                (w[1].x - w[0].x).hypot(w[1].y - w[0].y) / dt
            } else {
                0.0
            }
        })
        .collect();
    let (avg_velocity, _) = super::movement::mean_variance(&velocities);
    let velocity_cv = coefficient_of_variation(&velocities);

    if velocity_cv < MAX_PERFECT_VELOCITY_CV {
        flags.push(Flag::PerfectVelocity);
    }
    let velocity_natural = (VELOCITY_CV_BAND.0..=VELOCITY_CV_BAND.1).contains(&velocity_cv);
    if !velocity_natural {
        flags.push(Flag::UnnaturalVelocityVariance);
    }

    // Pressure: a missing or zero reading counts as 0.5
    let pressures: Vec<f64> = points
        .iter()
        .map(|p| p.pressure.filter(|&v| v != 0.0).unwrap_or(0.5))
        .filter(|&p| p > 0.0)
        .collect();
    let pressure_cv = if pressures.is_empty() {
        flags.push(Flag::NoPressureData);
        None
    } else {
        let cv = coefficient_of_variation(&pressures);
        if cv < MIN_PRESSURE_CV {
            flags.push(Flag::ConstantPressure);
        }
        if pressures.iter().all(|&p| p == pressures[0]) {
            flags.push(Flag::SyntheticPressure);
        }
        Some(cv)
    };

    // Tremor and direction changes
    let turns = turn_angles(points);
    let tremor_turns = turns.iter().filter(|t| t.abs() > TREMOR_TURN_RAD).count();
    let tremor_hz = if duration > 0.0 {
        tremor_turns as f64 / (duration / 1000.0)
    } else {
        0.0
    };
    if tremor_hz < TREMOR_HZ_BAND.0 {
        flags.push(Flag::NoNaturalTremor);
    }
    let tremor_natural = (TREMOR_HZ_BAND.0..=TREMOR_HZ_BAND.1).contains(&tremor_hz);

    let direction_changes = turns
        .iter()
        .filter(|t| t.abs() > DIRECTION_CHANGE_RAD)
        .count();
    if direction_changes < MIN_DIRECTION_CHANGES && points.len() > 30 {
        flags.push(Flag::TooLinear);
    }

    // Hesitations
    let hesitations = points
        .windows(2)
        .filter(|w| w[1].timestamp - w[0].timestamp > HESITATION_MS)
        .count();
    if hesitations == 0 && points.len() > 20 {
        flags.push(Flag::NoHesitation);
    }

    // Acceleration spread (diagnostic only)
    let accelerations: Vec<f64> = velocities
        .windows(2)
        .zip(points.windows(2).skip(1))
        .map(|(v, p)| {
            let dt = p[1].timestamp - p[0].timestamp;
            if dt > 0.0 { (v[1] - v[0]) / dt } else { 0.0 }
        })
        .collect();
    let acceleration_deviation = (!accelerations.is_empty())
        .then(|| super::movement::mean_variance(&accelerations).1.sqrt());

    let mut human_score: f64 = 1.0;
    for flag in &flags {
        human_score -= match flag {
            Flag::PerfectVelocity => 0.3,
            Flag::ConstantPressure => 0.25,
            Flag::NoNaturalTremor => 0.25,
            Flag::NoHesitation => 0.15,
            Flag::TooLinear => 0.2,
            Flag::TooFast => 0.4,
            Flag::SyntheticPressure => 0.3,
            _ => 0.0,
        };
    }
    if velocity_natural {
        human_score += 0.1;
    }
    if tremor_natural {
        human_score += 0.1;
    }

    StrokeAnalysis {
        human_score: human_score.clamp(0.0, 1.0),
        flags,
        metrics: Some(StrokeMetrics {
            duration,
            avg_velocity,
            velocity_cv,
            pressure_cv,
            tremor_hz,
            hesitations,
            acceleration_deviation,
            direction_changes,
        }),
    }
}
