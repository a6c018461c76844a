// src/healing/mod.rs

//! The self-healing execution strategy and its collaborators.
//!
//! - [`strategy`] drives initial scheduling and the round-robin poll loop.
//! - [`decision`] is the pure retry-eligibility core.
//! - [`patterns`] compiles and applies the flaky-log patterns.
//! - [`ledger`] tracks per-configuration retry counters.
//! - [`annotation`] records auto-healed runs on the parent build.

use crate::outcome::SeverityBand;

pub mod annotation;
pub mod decision;
pub mod ledger;
pub mod patterns;
pub mod strategy;

pub use annotation::{HealedAnnotation, HealedRun};
pub use decision::RetryVerdict;
pub use ledger::RetryLedger;
pub use patterns::LogPatterns;
pub use strategy::SelfHealingStrategy;

/// Validated parameters of the self-healing strategy.
///
/// Produced by config validation; invariants (retry clamp, band clamp,
/// compilable patterns) are established there, not re-checked at run time.
#[derive(Debug, Clone)]
pub struct HealingSettings {
    /// Newline-delimited regex source; compiled once per run.
    pub log_patterns: String,
    /// Severity band of results eligible for retry.
    pub band: SeverityBand,
    /// Retry budget per configuration.
    pub max_retries: u32,
    /// Stop retrying fleet-wide once one configuration exhausts its budget.
    pub stop_retrying_after_one_fails: bool,
}

impl Default for HealingSettings {
    fn default() -> Self {
        Self {
            log_patterns: String::new(),
            band: SeverityBand::default(),
            max_retries: 1,
            stop_retrying_after_one_fails: false,
        }
    }
}
