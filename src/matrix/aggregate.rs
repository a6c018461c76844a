// src/matrix/aggregate.rs

//! Start/end lifecycle notification for pluggable result aggregators.
//!
//! Aggregators observe the whole matrix build: their start hook runs before
//! anything is scheduled and may veto the build outright; their end hook runs
//! once per accepted child run and may force the build to abort.

use crate::errors::{HealmatrixError, Result};
use crate::matrix::{BuildListener, MatrixRun};

/// A pluggable per-build result aggregator.
pub trait Aggregator: Send {
    /// Name used when narrating a veto.
    fn name(&self) -> &str;

    /// Called once before any configuration is scheduled.
    ///
    /// Returning false vetoes the whole build.
    fn start_build(&mut self) -> Result<bool>;

    /// Called once per accepted (non-superseded) child run.
    ///
    /// Returning false aborts the whole build.
    fn end_run(&mut self, run: &dyn MatrixRun) -> Result<bool>;
}

/// Trigger the start hook on all aggregators, in order.
///
/// Returns false as soon as one aggregator vetoes; the remaining aggregators
/// are not called.
pub fn notify_start_build(
    aggregators: &mut [Box<dyn Aggregator>],
    listener: &dyn BuildListener,
) -> Result<bool> {
    for aggregator in aggregators.iter_mut() {
        if !aggregator.start_build()? {
            listener.error(&format!("Aggregator terminated build: {}", aggregator.name()));
            return Ok(false);
        }
    }
    Ok(true)
}

/// Trigger the end hook on all aggregators for a finished run.
///
/// A missing run (the configuration was cancelled before it started) is a
/// no-op. An aggregator veto escalates to a fatal abort of the strategy.
pub fn notify_end_run(
    run: Option<&dyn MatrixRun>,
    aggregators: &mut [Box<dyn Aggregator>],
    listener: &dyn BuildListener,
) -> Result<()> {
    let Some(run) = run else {
        return Ok(());
    };
    for aggregator in aggregators.iter_mut() {
        if !aggregator.end_run(run)? {
            let name = aggregator.name().to_string();
            listener.error(&format!("Aggregator terminated build: {name}"));
            return Err(HealmatrixError::AggregatorVeto(name));
        }
    }
    Ok(())
}
