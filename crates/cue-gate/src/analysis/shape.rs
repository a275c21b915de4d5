//! Geometric validation of drawn gestures.

use cue_common::{
    Flag, GestureKind, GestureSubmission, Point, ShapeReason, ShapeValidation, StrokePoint,
};

use super::biometrics::turn_angles;

const CIRCLE_MIN_POINTS: usize = 10;
/// Circularity must lie strictly inside this band; a perfect circle is plotted
const CIRCULARITY_BAND: (f64, f64) = (0.65, 0.98);
const SWIPE_MIN_POINTS: usize = 5;
const SWIPE_MIN_LENGTH: f64 = 50.0;
const SWIPE_ANGLE_TOLERANCE: f64 = 15.0;
const SWIPE_MIN_STRAIGHTNESS: f64 = 0.5;
/// Turn (rad) that counts as a curve in a swipe
const SWIPE_CURVE_RAD: f64 = 0.5;
const SWIPE_MAX_CURVES: usize = 3;

/// Validate a circle drawn as one stroke
pub fn validate_circle(points: &[StrokePoint]) -> ShapeValidation {
    if points.len() < CIRCLE_MIN_POINTS {
        return ShapeValidation {
            circularity: Some(0.0),
            ..ShapeValidation::rejected(ShapeReason::InsufficientPoints)
        };
    }

    let n = points.len() as f64;
    let center = Point {
        x: points.iter().map(|p| p.x).sum::<f64>() / n,
        y: points.iter().map(|p| p.y).sum::<f64>() / n,
    };

    let radii: Vec<f64> = points
        .iter()
        .map(|p| (p.x - center.x).hypot(p.y - center.y))
        .collect();
    let (radius, variance) = super::movement::mean_variance(&radii);
    let circularity = if radius > 0.0 {
        1.0 - variance.sqrt() / radius
    } else {
        0.0
    };

    let reason = if circularity <= CIRCULARITY_BAND.0 {
        Some(ShapeReason::NotCircularEnough)
    } else if circularity >= CIRCULARITY_BAND.1 {
        Some(ShapeReason::TooPerfect)
    } else {
        None
    };

    ShapeValidation {
        valid: reason.is_none(),
        reason,
        circularity: Some(circularity.clamp(0.0, 1.0)),
        center: Some(center),
        radius: Some(radius),
        ..Default::default()
    }
}

/// Validate a swipe toward `expected_angle` degrees (0 = right, 90 = up)
pub fn validate_swipe(points: &[StrokePoint], expected_angle: f64) -> ShapeValidation {
    if points.len() < SWIPE_MIN_POINTS {
        return ShapeValidation::rejected(ShapeReason::InsufficientPoints);
    }

    let start = points[0];
    let end = points[points.len() - 1];
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    let length = dx.hypot(dy);

    if length < SWIPE_MIN_LENGTH {
        return ShapeValidation {
            length: Some(length),
            ..ShapeValidation::rejected(ShapeReason::TooShort)
        };
    }

    // Screen y grows downward
    let angle = (-dy).atan2(dx).to_degrees().rem_euclid(360.0);
    let diff = (angle - expected_angle).abs();
    let angle_error = diff.min(360.0 - diff);
    let direction_ok = angle_error <= SWIPE_ANGLE_TOLERANCE;

    // Mean distance of the points from the start-end chord
    let avg_deviation = points
        .iter()
        .map(|p| (dy * p.x - dx * p.y + end.x * start.y - end.y * start.x).abs() / length)
        .sum::<f64>()
        / points.len() as f64;
    let straightness = 1.0 - (avg_deviation / (length * 0.1)).min(1.0);

    let curves = turn_angles(points)
        .iter()
        .filter(|t| t.abs() > SWIPE_CURVE_RAD)
        .count();

    let reason = if curves > SWIPE_MAX_CURVES {
        Some(ShapeReason::TooManyCurves)
    } else if !direction_ok {
        Some(ShapeReason::WrongDirection)
    } else if straightness <= SWIPE_MIN_STRAIGHTNESS {
        Some(ShapeReason::NotStraight)
    } else {
        None
    };

    ShapeValidation {
        valid: reason.is_none(),
        reason,
        angle: Some(angle),
        expected_angle: Some(expected_angle),
        angle_error: Some(angle_error),
        length: Some(length),
        straightness: Some(straightness),
        curves: Some(curves),
        ..Default::default()
    }
}

/// Validate the first stroke of a gesture against its declared type.
/// Returns the validation and the flag raised when it fails or is only warned.
pub fn validate_gesture(gesture: &GestureSubmission) -> (ShapeValidation, Option<Flag>) {
    let first = gesture.strokes.first().map(Vec::as_slice).unwrap_or_default();

    match gesture.kind {
        GestureKind::Circle => {
            let validation = validate_circle(first);
            let flag = validation.reason.map(|reason| match reason {
                ShapeReason::InsufficientPoints => Flag::CircleInsufficientPoints,
                ShapeReason::TooPerfect => Flag::CircleTooPerfect,
                _ => Flag::CircleNotCircularEnough,
            });
            (validation, flag)
        }
        GestureKind::Swipe => {
            let validation = validate_swipe(first, gesture.expected_angle.unwrap_or(0.0));
            let flag = validation.reason.map(|reason| match reason {
                ShapeReason::InsufficientPoints => Flag::SwipeInsufficientPoints,
                ShapeReason::TooShort => Flag::SwipeTooShort,
                ShapeReason::WrongDirection => Flag::SwipeWrongDirection,
                ShapeReason::TooManyCurves => Flag::SwipeTooManyCurves,
                _ => Flag::SwipeNotStraight,
            });
            (validation, flag)
        }
        // Path matching for traces is not implemented; accept with a warning
        GestureKind::Trace => (
            ShapeValidation::passed_with_warning(Flag::ReservedGestureType),
            Some(Flag::ReservedGestureType),
        ),
        GestureKind::Unknown => (
            ShapeValidation::passed_with_warning(Flag::UnknownGestureType),
            Some(Flag::UnknownGestureType),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::biometrics::tests::human_circle;
    use std::f64::consts::PI;

    fn polar(n: usize, radius: impl Fn(f64) -> f64) -> Vec<StrokePoint> {
        (0..n)
            .map(|i| {
                let theta = i as f64 / n as f64 * 2.0 * PI;
                let r = radius(theta);
                StrokePoint {
                    x: 300.0 + r * theta.cos(),
                    y: 300.0 + r * theta.sin(),
                    pressure: None,
                    timestamp: i as f64 * 25.0,
                }
            })
            .collect()
    }

    fn line(n: usize, dx: f64, dy: f64, wobble: f64) -> Vec<StrokePoint> {
        (0..n)
            .map(|i| StrokePoint {
                x: 100.0 + dx * i as f64,
                y: 100.0 + dy * i as f64 + if i % 2 == 0 { 0.0 } else { wobble },
                pressure: None,
                timestamp: i as f64 * 20.0,
            })
            .collect()
    }

    #[test]
    fn test_hand_drawn_circle_passes() {
        let validation = validate_circle(&human_circle());
        assert!(validation.valid, "{:?}", validation);
        let circularity = validation.circularity.unwrap();
        assert!(circularity > 0.9 && circularity < 0.98);
        assert!((validation.radius.unwrap() - 50.0).abs() < 2.0);
    }

    #[test]
    fn test_too_perfect_circle_rejected() {
        let validation = validate_circle(&polar(64, |theta| 50.0 + 0.5 * (3.0 * theta).sin()));
        assert!(!validation.valid);
        assert_eq!(validation.reason, Some(ShapeReason::TooPerfect));
        assert!(validation.circularity.unwrap() > 0.99);
    }

    #[test]
    fn test_blob_not_circular_enough() {
        // Long thin ellipse
        let points: Vec<StrokePoint> = (0..40)
            .map(|i| {
                let theta = i as f64 / 40.0 * 2.0 * PI;
                StrokePoint {
                    x: 120.0 * theta.cos(),
                    y: 8.0 * theta.sin(),
                    pressure: None,
                    timestamp: i as f64 * 20.0,
                }
            })
            .collect();
        let validation = validate_circle(&points);
        assert_eq!(validation.reason, Some(ShapeReason::NotCircularEnough));
    }

    #[test]
    fn test_circle_needs_ten_points() {
        let validation = validate_circle(&human_circle()[..9]);
        assert_eq!(validation.reason, Some(ShapeReason::InsufficientPoints));
    }

    #[test]
    fn test_swipe_right_passes() {
        let validation = validate_swipe(&line(12, 10.0, 0.0, 1.5), 0.0);
        assert!(validation.valid, "{:?}", validation);
        assert!(validation.angle_error.unwrap() < 1.0);
    }

    #[test]
    fn test_swipe_up_is_ninety_degrees() {
        let validation = validate_swipe(&line(12, 0.0, -10.0, 0.0), 90.0);
        assert!(validation.valid);
        assert!((validation.angle.unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_swipe_failures() {
        let short = validate_swipe(&line(6, 5.0, 0.0, 0.0), 0.0);
        assert_eq!(short.reason, Some(ShapeReason::TooShort));

        let wrong_way = validate_swipe(&line(12, -10.0, 0.0, 0.0), 0.0);
        assert_eq!(wrong_way.reason, Some(ShapeReason::WrongDirection));

        // Zig-zag: every turn is sharp
        let zigzag = validate_swipe(&line(12, 10.0, 0.0, 12.0), 0.0);
        assert_eq!(zigzag.reason, Some(ShapeReason::TooManyCurves));
    }

    #[test]
    fn test_reserved_and_unknown_types_pass_with_warning() {
        let mut gesture = GestureSubmission {
            kind: GestureKind::Trace,
            strokes: vec![human_circle()],
            expected_angle: None,
        };
        let (validation, flag) = validate_gesture(&gesture);
        assert!(validation.valid);
        assert_eq!(flag, Some(Flag::ReservedGestureType));

        gesture.kind = GestureKind::Unknown;
        let (validation, flag) = validate_gesture(&gesture);
        assert!(validation.valid);
        assert_eq!(validation.warning, Some(Flag::UnknownGestureType));
        assert_eq!(flag, Some(Flag::UnknownGestureType));
    }

    #[test]
    fn test_gesture_flags() {
        let gesture = GestureSubmission {
            kind: GestureKind::Circle,
            strokes: vec![polar(64, |theta| 50.0 + 0.5 * (3.0 * theta).sin())],
            expected_angle: None,
        };
        let (validation, flag) = validate_gesture(&gesture);
        assert!(!validation.valid);
        assert_eq!(flag, Some(Flag::CircleTooPerfect));
    }
}
