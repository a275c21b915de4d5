//! # Align-on-Cue Common
//!
//! Shared types, errors, and constants used across Align-on-Cue components.
//!
//! ## Modules
//! - `types` - Wire types (challenge blobs, telemetry, flags, verdicts)
//! - `error` - Verification error taxonomy
//! - `constants` - Protocol defaults and store key prefixes

pub mod constants;
pub mod error;
pub mod types;

pub use error::{RejectionDetail, ReplayKind, VerifyError};
pub use types::*;
