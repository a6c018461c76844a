//! Scripted fake build system for strategy tests.
//!
//! A [`FakeConfiguration`] plays back a script instead of running real
//! processes:
//! - it can refuse the first N schedule requests (exercising the strategy's
//!   schedule backoff),
//! - it can sit in a fake queue for a few polls, with per-poll blockage
//!   reasons (exercising the dedup narration),
//! - each accepted schedule consumes the next [`ScriptedRun`], which reports
//!   "building" for a configurable number of polls and then finishes with
//!   the scripted outcome and log text.
//!
//! Tests keep their own `Arc<FakeConfiguration>` to inspect recorded
//! schedule causes and deleted runs after the strategy returns.

use std::collections::VecDeque;
use std::io::{self, BufRead, Cursor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use healmatrix::matrix::{
    Aggregator, BuildCause, BuildListener, MatrixConfiguration, MatrixRun, QueueItem,
};
use healmatrix::errors::Result;
use healmatrix::outcome::BuildOutcome;

/// One scripted execution attempt.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub outcome: BuildOutcome,
    pub log: String,
    /// How many polls the run reports "still building" before finishing.
    pub building_polls: u32,
}

impl ScriptedRun {
    pub fn new(outcome: BuildOutcome, log: &str) -> Self {
        Self {
            outcome,
            log: log.to_string(),
            building_polls: 0,
        }
    }

    pub fn building_polls(mut self, polls: u32) -> Self {
        self.building_polls = polls;
        self
    }
}

struct FakeRunState {
    display_name: String,
    outcome: BuildOutcome,
    log: String,
    polls_left: Mutex<u32>,
    deleted: AtomicBool,
}

#[derive(Default)]
struct FakeInner {
    script: VecDeque<ScriptedRun>,
    refuse_schedules: u32,
    queued_whys: VecDeque<Option<String>>,
    cancel_next_schedule: bool,
    fail_remove: bool,

    pending_start: bool,
    current: Option<Arc<FakeRunState>>,
    run_seq: u32,

    schedules: Vec<BuildCause>,
    refused: u32,
    deleted: Vec<String>,
}

impl FakeInner {
    fn start_next_run(&mut self, name: &str) {
        let scripted = self
            .script
            .pop_front()
            .unwrap_or_else(|| ScriptedRun::new(BuildOutcome::Success, ""));
        self.current = Some(Arc::new(FakeRunState {
            display_name: format!("{} run #{}", name, self.run_seq),
            outcome: scripted.outcome,
            log: scripted.log,
            polls_left: Mutex::new(scripted.building_polls),
            deleted: AtomicBool::new(false),
        }));
        self.pending_start = false;
    }
}

/// Scripted stand-in for one child configuration.
pub struct FakeConfiguration {
    name: String,
    inner: Arc<Mutex<FakeInner>>,
}

impl FakeConfiguration {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Arc::new(Mutex::new(FakeInner::default())),
        }
    }

    /// Append a scripted run; each accepted schedule consumes one.
    pub fn with_run(self, run: ScriptedRun) -> Self {
        self.inner.lock().unwrap().script.push_back(run);
        self
    }

    /// Refuse the first `n` schedule requests before accepting.
    pub fn refuse_schedules(self, n: u32) -> Self {
        self.inner.lock().unwrap().refuse_schedules = n;
        self
    }

    /// Sit in the queue for one poll per entry, reporting these blockage
    /// reasons (a `None` clears the remembered reason).
    pub fn queued(self, whys: Vec<Option<&str>>) -> Self {
        self.inner.lock().unwrap().queued_whys =
            whys.into_iter().map(|w| w.map(str::to_string)).collect();
        self
    }

    /// The next accepted schedule produces neither a run nor a queue item,
    /// as if the build was cancelled before it started.
    pub fn cancel_next_schedule(self) -> Self {
        self.inner.lock().unwrap().cancel_next_schedule = true;
        self
    }

    /// Make `remove_and_delete` report a missing parent reference.
    pub fn fail_remove(self) -> Self {
        self.inner.lock().unwrap().fail_remove = true;
        self
    }

    /// Causes of all accepted schedule requests, in order.
    pub fn scheduled_causes(&self) -> Vec<BuildCause> {
        self.inner.lock().unwrap().schedules.clone()
    }

    /// How many schedule requests were refused.
    pub fn refused_schedules(&self) -> u32 {
        self.inner.lock().unwrap().refused
    }

    /// Display names of runs that were removed and deleted.
    pub fn deleted_runs(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted.clone()
    }
}

impl MatrixConfiguration for FakeConfiguration {
    fn id(&self) -> &str {
        &self.name
    }

    fn run_for(&self, _parent_build: u64) -> Option<Box<dyn MatrixRun>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.pending_start && inner.queued_whys.is_empty() {
            let name = self.name.clone();
            inner.start_next_run(&name);
        }
        let state = inner.current.as_ref()?;
        Some(Box::new(FakeRun {
            state: Arc::clone(state),
            configuration: Arc::downgrade(&self.inner),
        }))
    }

    fn queue_item(&self) -> Option<QueueItem> {
        let mut inner = self.inner.lock().unwrap();
        if inner.current.is_some() || !inner.pending_start {
            return None;
        }
        let why = inner.queued_whys.pop_front()?;
        Some(QueueItem {
            id: u64::from(inner.run_seq),
            task_name: self.name.clone(),
            why,
        })
    }

    fn schedule_build(&self, cause: BuildCause) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.refuse_schedules > 0 {
            inner.refuse_schedules -= 1;
            inner.refused += 1;
            return false;
        }

        inner.schedules.push(cause);
        inner.run_seq += 1;
        inner.current = None;

        if inner.cancel_next_schedule {
            inner.cancel_next_schedule = false;
            inner.pending_start = false;
        } else {
            inner.pending_start = true;
        }
        true
    }
}

/// Handle to one scripted run.
pub struct FakeRun {
    state: Arc<FakeRunState>,
    configuration: Weak<Mutex<FakeInner>>,
}

impl MatrixRun for FakeRun {
    fn display_name(&self) -> String {
        self.state.display_name.clone()
    }

    fn is_building(&self) -> bool {
        let mut polls_left = self.state.polls_left.lock().unwrap();
        if *polls_left > 0 {
            *polls_left -= 1;
            true
        } else {
            false
        }
    }

    fn result(&self) -> Option<BuildOutcome> {
        Some(self.state.outcome)
    }

    fn open_log(&self) -> io::Result<Box<dyn BufRead + Send>> {
        Ok(Box::new(Cursor::new(self.state.log.clone().into_bytes())))
    }

    fn last_log_lines(&self, max_lines: usize) -> io::Result<Vec<String>> {
        let lines: Vec<String> = self.state.log.lines().map(str::to_string).collect();
        let skip = lines.len().saturating_sub(max_lines);
        Ok(lines[skip..].to_vec())
    }

    fn remove_and_delete(&self) -> bool {
        let Some(inner) = self.configuration.upgrade() else {
            return false;
        };
        let mut inner = inner.lock().unwrap();
        if inner.fail_remove {
            return false;
        }
        self.state.deleted.store(true, Ordering::SeqCst);
        if let Some(current) = &inner.current {
            if Arc::ptr_eq(current, &self.state) {
                inner.current = None;
            }
        }
        let name = self.state.display_name.clone();
        inner.deleted.push(name);
        true
    }
}

/// Listener that records every narrated line for assertions.
#[derive(Default)]
pub struct CollectingListener {
    lines: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl CollectingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl BuildListener for CollectingListener {
    fn println(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn error(&self, line: &str) {
        self.errors.lock().unwrap().push(line.to_string());
    }
}

/// What a [`RecordingAggregator`] observed.
#[derive(Debug, Default)]
pub struct AggregatorLog {
    pub starts: u32,
    pub runs: Vec<String>,
}

/// Aggregator with scripted verdicts that records what it saw.
pub struct RecordingAggregator {
    name: String,
    start_ok: bool,
    end_ok: bool,
    log: Arc<Mutex<AggregatorLog>>,
}

impl RecordingAggregator {
    pub fn new(name: &str) -> (Self, Arc<Mutex<AggregatorLog>>) {
        let log = Arc::new(Mutex::new(AggregatorLog::default()));
        (
            Self {
                name: name.to_string(),
                start_ok: true,
                end_ok: true,
                log: Arc::clone(&log),
            },
            log,
        )
    }

    pub fn veto_start(mut self) -> Self {
        self.start_ok = false;
        self
    }

    pub fn veto_end(mut self) -> Self {
        self.end_ok = false;
        self
    }
}

impl Aggregator for RecordingAggregator {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_build(&mut self) -> Result<bool> {
        self.log.lock().unwrap().starts += 1;
        Ok(self.start_ok)
    }

    fn end_run(&mut self, run: &dyn MatrixRun) -> Result<bool> {
        self.log.lock().unwrap().runs.push(run.display_name());
        Ok(self.end_ok)
    }
}
