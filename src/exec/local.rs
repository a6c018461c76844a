// src/exec/local.rs

//! Local process-backed matrix adapter.
//!
//! Each configuration is a shell command. Scheduling enqueues a build that
//! waits for one of a bounded number of executor slots; while it waits the
//! configuration reports a queue item whose reason feeds the strategy's
//! blockage narration. The process's stdout/stderr are captured to one log
//! file per run, which is what the retry patterns are matched against.
//!
//! The replacement run of a healed configuration sees `HEALMATRIX_RETRY` in
//! its environment, carrying the retry count from its build cause.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::model::ConfigFile;
use crate::errors::Result;
use crate::matrix::{BuildCause, MatrixConfiguration, MatrixRun, QueueItem};
use crate::outcome::BuildOutcome;

/// The whole local matrix: one process-backed configuration per
/// `[configuration.<name>]` entry, sharing an executor-slot pool.
pub struct LocalMatrix {
    configurations: Vec<Arc<LocalConfiguration>>,
    log_dir: PathBuf,
}

impl LocalMatrix {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        fs::create_dir_all(&cfg.config.log_dir)?;

        let slots = Arc::new(Semaphore::new(cfg.config.executor_slots));
        let next_queue_id = Arc::new(AtomicU64::new(1));

        let configurations = cfg
            .configuration
            .iter()
            .map(|(name, configuration)| {
                Arc::new(LocalConfiguration {
                    name: name.clone(),
                    cmd: configuration.cmd.clone(),
                    log_dir: cfg.config.log_dir.clone(),
                    slots: Arc::clone(&slots),
                    next_queue_id: Arc::clone(&next_queue_id),
                    state: Arc::new(Mutex::new(ConfigurationState::default())),
                })
            })
            .collect();

        Ok(Self {
            configurations,
            log_dir: cfg.config.log_dir.clone(),
        })
    }

    /// The adapter's configurations, as the capability trait objects the
    /// strategy consumes.
    pub fn configurations(&self) -> Vec<Arc<dyn MatrixConfiguration>> {
        self.configurations
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn MatrixConfiguration>)
            .collect()
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Mutable side of one configuration, behind its lock.
#[derive(Default)]
struct ConfigurationState {
    queue_item: Option<QueueItem>,
    run: Option<Arc<RunRecord>>,
    /// Total schedules accepted for this configuration, used to name runs
    /// and their log files.
    attempts: u32,
}

/// Immutable-after-creation record of one run.
struct RunRecord {
    display_name: String,
    log_path: PathBuf,
    parent_build: u64,
    building: AtomicBool,
    outcome: OnceLock<BuildOutcome>,
}

/// One process-backed configuration.
pub struct LocalConfiguration {
    name: String,
    cmd: String,
    log_dir: PathBuf,
    slots: Arc<Semaphore>,
    next_queue_id: Arc<AtomicU64>,
    state: Arc<Mutex<ConfigurationState>>,
}

impl MatrixConfiguration for LocalConfiguration {
    fn id(&self) -> &str {
        &self.name
    }

    fn run_for(&self, parent_build: u64) -> Option<Box<dyn MatrixRun>> {
        let state = self.state.lock().expect("configuration state lock poisoned");
        let record = state.run.as_ref()?;
        if record.parent_build != parent_build {
            return None;
        }
        Some(Box::new(LocalRun {
            record: Arc::clone(record),
            configuration: Arc::downgrade(&self.state),
        }))
    }

    fn queue_item(&self) -> Option<QueueItem> {
        self.state
            .lock()
            .expect("configuration state lock poisoned")
            .queue_item
            .clone()
    }

    fn schedule_build(&self, cause: BuildCause) -> bool {
        let mut state = self.state.lock().expect("configuration state lock poisoned");
        if state.queue_item.is_some() {
            // A build is already waiting; the queue refuses duplicates and
            // the caller retries with backoff.
            return false;
        }

        state.attempts += 1;
        let attempt = state.attempts;
        state.queue_item = Some(QueueItem {
            id: self.next_queue_id.fetch_add(1, Ordering::SeqCst),
            task_name: self.name.clone(),
            why: Some("Waiting for next available executor slot".to_string()),
        });
        drop(state);

        debug!(
            configuration = %self.name,
            attempt,
            cause = %cause.short_description(),
            "local build queued"
        );

        tokio::spawn(run_build(
            self.name.clone(),
            self.cmd.clone(),
            self.log_dir.clone(),
            Arc::clone(&self.slots),
            Arc::clone(&self.state),
            cause,
            attempt,
        ));
        true
    }
}

/// Waits for an executor slot, then runs the configuration's command with
/// its output captured to the run's log file.
async fn run_build(
    name: String,
    cmd: String,
    log_dir: PathBuf,
    slots: Arc<Semaphore>,
    state: Arc<Mutex<ConfigurationState>>,
    cause: BuildCause,
    attempt: u32,
) {
    let permit = match slots.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            // Slot pool shut down; leave the queue so the poll loop can
            // observe a cancelled build instead of spinning forever.
            let mut state = state.lock().expect("configuration state lock poisoned");
            state.queue_item = None;
            return;
        }
    };

    let log_path = log_dir.join(format!("{}-{}-{}.log", name, cause.parent_build(), attempt));
    let record = Arc::new(RunRecord {
        display_name: format!("{} #{}.{}", name, cause.parent_build(), attempt),
        log_path: log_path.clone(),
        parent_build: cause.parent_build(),
        building: AtomicBool::new(true),
        outcome: OnceLock::new(),
    });

    {
        let mut state = state.lock().expect("configuration state lock poisoned");
        state.queue_item = None;
        state.run = Some(Arc::clone(&record));
    }

    let outcome = match execute_command(&name, &cmd, &log_path, cause).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(configuration = %name, error = %err, "failed to run configuration process");
            let _ = fs::write(
                &log_path,
                format!("healmatrix: failed to start configuration process: {err}\n"),
            );
            BuildOutcome::NotBuilt
        }
    };

    // Publish the outcome before flipping `building`, so a poller that sees
    // the run finished always finds a result.
    let _ = record.outcome.set(outcome);
    record.building.store(false, Ordering::SeqCst);
    drop(permit);
}

async fn execute_command(
    name: &str,
    cmd: &str,
    log_path: &Path,
    cause: BuildCause,
) -> io::Result<BuildOutcome> {
    let log = File::create(log_path)?;
    let log_stderr = log.try_clone()?;

    // Build a shell command appropriate for the platform.
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .env("HEALMATRIX_RETRY", cause.retry_count().to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_stderr))
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let status = child.wait().await?;

    let outcome = if status.success() {
        BuildOutcome::Success
    } else if status.code().is_some() {
        BuildOutcome::Failure
    } else {
        // Killed by a signal: the platform aborted the run.
        BuildOutcome::Aborted
    };

    info!(
        configuration = %name,
        exit_code = ?status.code(),
        outcome = %outcome,
        "configuration process exited"
    );
    Ok(outcome)
}

/// Handle to one run of a [`LocalConfiguration`].
pub struct LocalRun {
    record: Arc<RunRecord>,
    configuration: Weak<Mutex<ConfigurationState>>,
}

impl MatrixRun for LocalRun {
    fn display_name(&self) -> String {
        self.record.display_name.clone()
    }

    fn is_building(&self) -> bool {
        self.record.building.load(Ordering::SeqCst)
    }

    fn result(&self) -> Option<BuildOutcome> {
        self.record.outcome.get().copied()
    }

    fn open_log(&self) -> io::Result<Box<dyn BufRead + Send>> {
        let file = File::open(&self.record.log_path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn last_log_lines(&self, max_lines: usize) -> io::Result<Vec<String>> {
        if max_lines == 0 {
            return Ok(Vec::new());
        }
        let file = File::open(&self.record.log_path)?;
        let reader = BufReader::new(file);

        let mut tail: VecDeque<String> = VecDeque::with_capacity(max_lines);
        for line in reader.lines() {
            let line = line?;
            if tail.len() == max_lines {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        Ok(tail.into())
    }

    fn remove_and_delete(&self) -> bool {
        let Some(configuration) = self.configuration.upgrade() else {
            return false;
        };

        {
            let mut state = configuration
                .lock()
                .expect("configuration state lock poisoned");
            if let Some(current) = &state.run {
                if Arc::ptr_eq(current, &self.record) {
                    state.run = None;
                }
            }
        }

        if let Err(err) = fs::remove_file(&self.record.log_path) {
            warn!(
                run = %self.record.display_name,
                error = %err,
                "could not delete superseded run log"
            );
        }
        true
    }
}
