//! Target-angle derivation and angle arithmetic.
//!
//! The alignment bar is a line, so angles are compared modulo 180 degrees.

use sha2::{Digest, Sha256};

/// Derive the target angle in [0, 360) from a challenge seed
pub fn derive_angle(seed: u32) -> u32 {
    let digest = Sha256::digest(seed.to_string().as_bytes());
    let head = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    head % 360
}

/// Fold any angle into [0, 180)
pub fn normalize(angle: f64) -> f64 {
    angle.rem_euclid(360.0) % 180.0
}

/// Smallest distance between two line angles, in [0, 90]
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let diff = (normalize(a) - normalize(b)).abs();
    diff.min(180.0 - diff)
}
