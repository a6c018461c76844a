// src/matrix/mod.rs

//! Capability contracts for the external build system.
//!
//! The strategy never holds concrete build-system objects; it talks to a
//! [`MatrixConfiguration`] / [`MatrixRun`] trait pair the same way the
//! runtime in the executor module talks to a backend trait. Production code
//! uses the process-backed adapter in [`crate::exec::local`]; tests provide
//! scripted fakes.

use std::io;
use std::io::BufRead;
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;

use crate::errors::{HealmatrixError, Result};
use crate::healing::annotation::HealedAnnotation;
use crate::outcome::BuildOutcome;

pub mod aggregate;

pub use aggregate::Aggregator;

/// Why a run was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildCause {
    /// Initial schedule, triggered by the parent build.
    Upstream { parent_build: u64 },
    /// Replacement schedule after an auto-heal decision.
    SelfHealed { parent_build: u64, retry_count: u32 },
}

impl BuildCause {
    pub fn parent_build(&self) -> u64 {
        match *self {
            BuildCause::Upstream { parent_build } => parent_build,
            BuildCause::SelfHealed { parent_build, .. } => parent_build,
        }
    }

    /// Retry count carried by the cause (0 for the initial schedule).
    pub fn retry_count(&self) -> u32 {
        match *self {
            BuildCause::Upstream { .. } => 0,
            BuildCause::SelfHealed { retry_count, .. } => retry_count,
        }
    }

    pub fn short_description(&self) -> String {
        match *self {
            BuildCause::Upstream { parent_build } => {
                format!("Started by upstream build #{parent_build}")
            }
            BuildCause::SelfHealed {
                parent_build,
                retry_count,
            } => format!("Started by upstream build #{parent_build} (Self Healed #{retry_count})"),
        }
    }
}

/// A queued-but-not-started build of a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub id: u64,
    pub task_name: String,
    /// Human-readable reason the item has not started yet, if any.
    pub why: Option<String>,
}

impl QueueItem {
    /// Composite key used to deduplicate queue-blockage narration.
    pub fn blockage_key(&self) -> String {
        format!("{} {}", self.task_name, self.id)
    }
}

/// One child configuration of the matrix, as seen by the strategy.
pub trait MatrixConfiguration: Send + Sync {
    /// Stable identity of this configuration within the matrix.
    fn id(&self) -> &str;

    fn display_name(&self) -> String {
        self.id().to_string()
    }

    /// Current run for the given parent build number, if one has started.
    ///
    /// A retried configuration returns the replacement run once scheduled;
    /// the superseded run is no longer reachable here.
    fn run_for(&self, parent_build: u64) -> Option<Box<dyn MatrixRun>>;

    /// Queue state, if a build of this configuration is waiting to start.
    fn queue_item(&self) -> Option<QueueItem>;

    /// Ask the build system to schedule a build.
    ///
    /// Returns false when the queue transiently refuses (e.g. throttling, a
    /// duplicate already queued); the caller retries with backoff.
    fn schedule_build(&self, cause: BuildCause) -> bool;
}

/// One concrete execution attempt of a configuration.
pub trait MatrixRun: Send {
    fn display_name(&self) -> String;

    fn is_building(&self) -> bool;

    /// Result severity, present once the run has finished.
    fn result(&self) -> Option<BuildOutcome>;

    /// Open the stored log for a one-shot, line-oriented read.
    fn open_log(&self) -> io::Result<Box<dyn BufRead + Send>>;

    /// Snapshot of the last `max_lines` lines of the stored log.
    fn last_log_lines(&self, max_lines: usize) -> io::Result<Vec<String>>;

    /// Remove this run's record from its configuration and delete it.
    ///
    /// Returns false when the parent configuration reference is unexpectedly
    /// gone — a host-platform inconsistency the caller logs but survives.
    fn remove_and_delete(&self) -> bool;
}

/// Per-configuration veto of initial scheduling.
pub trait BuildGate: Send + Sync {
    fn should_build(&self, configuration: &dyn MatrixConfiguration) -> bool;
}

/// The parent build's live log.
///
/// Retry, acceptance and exhaustion decisions are narrated here so an
/// operator can audit why each configuration was or wasn't retried.
pub trait BuildListener: Send + Sync {
    fn println(&self, line: &str);
    fn error(&self, line: &str);
}

/// Listener that forwards parent-log lines to `tracing`.
#[derive(Debug, Default)]
pub struct TracingListener;

impl BuildListener for TracingListener {
    fn println(&self, line: &str) {
        tracing::info!(target: "healmatrix::build_log", "{line}");
    }

    fn error(&self, line: &str) {
        tracing::error!(target: "healmatrix::build_log", "{line}");
    }
}

/// Everything the strategy needs to drive one parent build.
pub struct MatrixExecution {
    pub build_number: u64,
    pub configurations: Vec<Arc<dyn MatrixConfiguration>>,
    pub aggregators: Vec<Box<dyn Aggregator>>,
    pub listener: Arc<dyn BuildListener>,
    gate: Option<Box<dyn BuildGate>>,
    abort: Option<watch::Receiver<bool>>,
    healed: OnceLock<HealedAnnotation>,
}

impl MatrixExecution {
    pub fn new(
        build_number: u64,
        configurations: Vec<Arc<dyn MatrixConfiguration>>,
        listener: Arc<dyn BuildListener>,
    ) -> Self {
        Self {
            build_number,
            configurations,
            aggregators: Vec::new(),
            listener,
            gate: None,
            abort: None,
            healed: OnceLock::new(),
        }
    }

    pub fn with_aggregators(mut self, aggregators: Vec<Box<dyn Aggregator>>) -> Self {
        self.aggregators = aggregators;
        self
    }

    pub fn with_gate(mut self, gate: Box<dyn BuildGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Attach an abort signal; flipping it to true interrupts the strategy
    /// at its next suspension point.
    pub fn with_abort(mut self, abort: watch::Receiver<bool>) -> Self {
        self.abort = Some(abort);
        self
    }

    /// Whether the gate admits this configuration into the build.
    pub fn should_build(&self, configuration: &dyn MatrixConfiguration) -> bool {
        match &self.gate {
            Some(gate) => gate.should_build(configuration),
            None => true,
        }
    }

    /// Propagate a requested abort as [`HealmatrixError::Interrupted`].
    pub fn check_abort(&self) -> Result<()> {
        if let Some(abort) = &self.abort {
            if *abort.borrow() {
                return Err(HealmatrixError::Interrupted);
            }
        }
        Ok(())
    }

    /// The healed-runs annotation, created lazily exactly once.
    pub fn healed_annotation(&self) -> &HealedAnnotation {
        self.healed.get_or_init(HealedAnnotation::new)
    }

    /// The annotation if any run was healed; does not create the slot.
    pub fn healed(&self) -> Option<&HealedAnnotation> {
        self.healed.get()
    }
}
