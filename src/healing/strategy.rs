// src/healing/strategy.rs

//! The self-healing scheduling loop.
//!
//! `run` schedules every admitted configuration, then polls the pending set
//! round-robin: a configuration found still building or queued goes to the
//! back of the ring, and a full pass with no progress sleeps briefly so the
//! build system isn't polled too often. Finished configurations are either
//! re-scheduled (flaky failure, budget left) or accepted into the combined
//! result.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::healing::decision::{self, RetryVerdict};
use crate::healing::{HealedRun, HealingSettings, LogPatterns, RetryLedger};
use crate::matrix::{aggregate, BuildCause, BuildListener, MatrixConfiguration, MatrixExecution};
use crate::outcome::BuildOutcome;

/// Sleep between full no-progress passes over the pending ring.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Backoff between refused schedule requests.
const SCHEDULE_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// How many trailing log lines of a superseded run are echoed to the parent
/// log before the run record is deleted.
const HEALED_LOG_TAIL: usize = 100;

/// Matrix execution strategy that automatically reruns flaky failures.
#[derive(Debug, Clone, Default)]
pub struct SelfHealingStrategy {
    settings: HealingSettings,
}

impl SelfHealingStrategy {
    /// Registration hook: how the strategy announces itself to the host.
    pub const DISPLAY_NAME: &'static str = "Self Healing";

    pub fn new(settings: HealingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &HealingSettings {
        &self.settings
    }

    /// Run the whole matrix build and return the combined result.
    pub async fn run(&self, execution: &mut MatrixExecution) -> Result<BuildOutcome> {
        info!(
            build_number = execution.build_number,
            configurations = execution.configurations.len(),
            "self-healing matrix strategy started"
        );

        let listener = Arc::clone(&execution.listener);
        if !aggregate::notify_start_build(&mut execution.aggregators, listener.as_ref())? {
            return Ok(BuildOutcome::Failure);
        }

        let patterns = LogPatterns::compile(&self.settings.log_patterns)?;
        let mut ledger = RetryLedger::new();
        let pending = self.schedule_matrix_runs(execution, &mut ledger).await?;
        self.wait_for_matrix_runs(execution, &patterns, &mut ledger, pending)
            .await
    }

    /// Schedule the initial run of every admitted configuration.
    ///
    /// Each scheduled configuration gets a zero retry counter and a place in
    /// the pending ring. The returned set is a subset of the active
    /// configurations, since the gate can reject individual ones.
    async fn schedule_matrix_runs(
        &self,
        execution: &mut MatrixExecution,
        ledger: &mut RetryLedger,
    ) -> Result<VecDeque<Arc<dyn MatrixConfiguration>>> {
        let mut pending: VecDeque<Arc<dyn MatrixConfiguration>> = VecDeque::new();
        let configurations = execution.configurations.clone();
        let cause = BuildCause::Upstream {
            parent_build: execution.build_number,
        };

        for configuration in configurations {
            if !execution.should_build(configuration.as_ref()) {
                debug!(
                    configuration = configuration.id(),
                    "gate rejected configuration; skipping"
                );
                continue;
            }
            ledger.record_scheduled(configuration.id());
            self.schedule_configuration_build(execution, configuration.as_ref(), cause)
                .await?;
            pending.push_back(configuration);
        }

        info!(scheduled = pending.len(), "initial matrix runs scheduled");
        Ok(pending)
    }

    /// Poll the pending ring until every configuration reaches a terminal,
    /// accepted state, retrying flaky failures along the way.
    async fn wait_for_matrix_runs(
        &self,
        execution: &mut MatrixExecution,
        patterns: &LogPatterns,
        ledger: &mut RetryLedger,
        mut pending: VecDeque<Arc<dyn MatrixConfiguration>>,
    ) -> Result<BuildOutcome> {
        let listener = Arc::clone(&execution.listener);

        // Last narrated queue-blockage reason per queue item, so reasons are
        // only printed when they change.
        let mut why_blocked: HashMap<String, String> = HashMap::new();

        let mut combined = BuildOutcome::Success;
        let mut continue_retrying = true;

        // Invariant: number of consecutive still-building polls. Reaching
        // pending.len() + 1 means a full pass over the ring finished with no
        // configuration completing, and the loop sleeps before the next pass.
        let mut polled_without_progress = 0usize;

        while let Some(configuration) = pending.pop_front() {
            execution.check_abort()?;

            if self.is_building(
                configuration.as_ref(),
                execution.build_number,
                listener.as_ref(),
                &mut why_blocked,
            ) {
                polled_without_progress += 1;
                if polled_without_progress > pending.len() {
                    polled_without_progress = 0;
                    self.pause(execution, POLL_INTERVAL).await?;
                }
                pending.push_back(configuration);
                continue;
            }
            polled_without_progress = 0;

            let run = configuration.run_for(execution.build_number);
            let Some(run) = run else {
                // No run and nothing queued: cancelled before it started.
                listener.println(&format!(
                    "Configuration {} was cancelled before it started. Accepting ABORTED.",
                    configuration.display_name()
                ));
                aggregate::notify_end_run(None, &mut execution.aggregators, listener.as_ref())?;
                combined = combined.combine(BuildOutcome::Aborted);
                continue;
            };

            let result = match run.result() {
                Some(result) => result,
                None => {
                    warn!(
                        configuration = configuration.id(),
                        run = %run.display_name(),
                        "finished run reported no result; treating as NOT_BUILT"
                    );
                    BuildOutcome::NotBuilt
                }
            };

            let verdict = decision::evaluate(
                &self.settings,
                continue_retrying,
                result,
                ledger.count(configuration.id()),
                || -> Result<bool> {
                    let log = run.open_log()?;
                    Ok(patterns.matches(log)?)
                },
            )?;
            debug!(
                configuration = configuration.id(),
                result = %result,
                ?verdict,
                "poll found finished run"
            );

            match verdict {
                RetryVerdict::Retry { retry_count } => {
                    ledger.increment(configuration.id());
                    listener.error(&format!(
                        "{} was {}. Matched pattern to rerun. Rerunning ({}).",
                        run.display_name(),
                        result,
                        retry_count
                    ));

                    // Echo the tail of the superseded log before deleting the
                    // run, so the parent log keeps the evidence.
                    for line in run.last_log_lines(HEALED_LOG_TAIL)? {
                        listener.println(&line);
                    }

                    execution.healed_annotation().append(HealedRun {
                        configuration: configuration.id().to_string(),
                        run: run.display_name(),
                        retry_count,
                    });

                    if !run.remove_and_delete() {
                        error!(
                            configuration = configuration.id(),
                            "couldn't remove old run, parent reference was missing; \
                             this is a host platform defect"
                        );
                    }

                    let cause = BuildCause::SelfHealed {
                        parent_build: execution.build_number,
                        retry_count,
                    };
                    self.schedule_configuration_build(execution, configuration.as_ref(), cause)
                        .await?;
                    pending.push_back(configuration);
                    continue;
                }
                RetryVerdict::Exhausted => {
                    listener.error(&format!(
                        "{} was {}. Matched pattern to rerun, but the max number of retries ({}) has been met.",
                        run.display_name(),
                        result,
                        self.settings.max_retries
                    ));
                    if self.settings.stop_retrying_after_one_fails {
                        listener.error("Not retrying any more builds.");
                        continue_retrying = false;
                    }
                }
                RetryVerdict::LogDidNotMatch => {
                    listener.println(&format!(
                        "{} was {}. It did not match the pattern to rerun. Accepting result.",
                        run.display_name(),
                        result
                    ));
                }
                RetryVerdict::OutsideBand | RetryVerdict::RetryingStopped => {}
            }

            aggregate::notify_end_run(
                Some(run.as_ref()),
                &mut execution.aggregators,
                listener.as_ref(),
            )?;
            combined = combined.combine(result);
        }

        info!(combined = %combined, "all matrix runs accepted");
        Ok(combined)
    }

    /// Whether the configuration's build is still running or queued.
    ///
    /// While queued, the blockage reason is narrated once per change, keyed
    /// by the queue item, so a stuck queue doesn't flood the parent log.
    fn is_building(
        &self,
        configuration: &dyn MatrixConfiguration,
        parent_build: u64,
        listener: &dyn BuildListener,
        why_blocked: &mut HashMap<String, String>,
    ) -> bool {
        if let Some(run) = configuration.run_for(parent_build) {
            return run.is_building();
        }

        if let Some(item) = configuration.queue_item() {
            let key = item.blockage_key();
            match item.why {
                None => {
                    why_blocked.remove(&key);
                }
                Some(why) => {
                    if why_blocked.get(&key) != Some(&why) {
                        listener.println(&format!(
                            "Configuration {} is still in the queue: {}",
                            configuration.display_name(),
                            why
                        ));
                        why_blocked.insert(key, why);
                    }
                }
            }
            return true;
        }

        false
    }

    /// Request a schedule, retrying with a fixed backoff until the queue
    /// accepts. Losing a configuration here would under-build the matrix, so
    /// refusals are never surfaced as errors; the abort signal is the escape
    /// hatch if the queue never accepts.
    async fn schedule_configuration_build(
        &self,
        execution: &MatrixExecution,
        configuration: &dyn MatrixConfiguration,
        cause: BuildCause,
    ) -> Result<()> {
        let listener = &execution.listener;
        listener.println(&format!("Triggering {}", configuration.display_name()));

        while !configuration.schedule_build(cause) {
            listener.error(&format!(
                "Unable to schedule build {}. Retrying.",
                configuration.display_name()
            ));
            self.pause(execution, SCHEDULE_RETRY_BACKOFF).await?;
        }
        Ok(())
    }

    /// Abort-aware sleep used at the loop's suspension points.
    async fn pause(&self, execution: &MatrixExecution, duration: Duration) -> Result<()> {
        execution.check_abort()?;
        tokio::time::sleep(duration).await;
        execution.check_abort()
    }
}
