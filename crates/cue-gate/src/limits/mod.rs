//! Rate limiting, lockouts and the suspicious-identity set.
//!
//! Tracks request volume and failures per client identity and derives the
//! risk level the analyzers run at.

mod guard;
mod suspicious;

pub use guard::RateGuard;
pub use suspicious::SuspiciousSet;
