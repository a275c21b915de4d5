//! Telemetry analysis: kinematics, stroke biometrics, shape geometry,
//! behavioral history and the combined bot score.

pub mod biometrics;
pub mod history;
pub mod movement;
pub mod scoring;
pub mod shape;

pub use biometrics::analyze_stroke;
pub use history::{Attempt, AnomalyReport, BehaviorTracker};
pub use movement::{MovementAnalysis, legacy_score, movement_heuristics, validate_movements};
pub use scoring::ComprehensiveScore;
pub use shape::validate_gesture;
