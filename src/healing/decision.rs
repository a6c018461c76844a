// src/healing/decision.rs

//! Pure retry-eligibility core.
//!
//! This is the deterministic heart of the strategy, separated from the
//! polling shell so it can be unit tested without tokio, adapters or real
//! logs. The evaluation order is significant: the fleet-wide latch is
//! checked first, then the severity band, and the log is only read when
//! both pass — log IO is fallible and must not run for ineligible results.

use crate::healing::HealingSettings;
use crate::outcome::BuildOutcome;

/// What to do with a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// Re-schedule with this (already incremented) retry count.
    Retry { retry_count: u32 },
    /// Eligible, but the retry budget is spent: accept, and possibly flip
    /// the fleet-wide latch.
    Exhausted,
    /// In the severity band, but no log line matched a pattern.
    LogDidNotMatch,
    /// Result severity outside the configured band.
    OutsideBand,
    /// The fleet-wide stop-retrying latch is down.
    RetryingStopped,
}

/// Evaluate retry eligibility for one finished run.
///
/// `log_matches` is only invoked when the latch and the severity band both
/// allow a retry; its error (log IO) propagates and fails the strategy.
pub fn evaluate<E>(
    settings: &HealingSettings,
    continue_retrying: bool,
    result: BuildOutcome,
    retried_count: u32,
    log_matches: impl FnOnce() -> Result<bool, E>,
) -> Result<RetryVerdict, E> {
    if !continue_retrying {
        return Ok(RetryVerdict::RetryingStopped);
    }
    if !settings.band.contains(result) {
        return Ok(RetryVerdict::OutsideBand);
    }
    if !log_matches()? {
        return Ok(RetryVerdict::LogDidNotMatch);
    }
    if retried_count < settings.max_retries {
        Ok(RetryVerdict::Retry {
            retry_count: retried_count + 1,
        })
    } else {
        Ok(RetryVerdict::Exhausted)
    }
}
