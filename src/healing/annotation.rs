// src/healing/annotation.rs

//! Parent-build annotation listing the runs that were auto-healed.

use std::sync::Mutex;

/// One child run that was replaced by a self-healed retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealedRun {
    /// Identity of the configuration the run belonged to.
    pub configuration: String,
    /// Display name of the superseded run.
    pub run: String,
    /// Retry count of the replacement that was scheduled.
    pub retry_count: u32,
}

/// Append-only record of auto-healed runs on the parent build.
///
/// The annotation itself is created at most once per parent build (see
/// `MatrixExecution::healed_annotation`, which lazily initialises the slot);
/// appends go through the annotation's own lock.
#[derive(Debug, Default)]
pub struct HealedAnnotation {
    healed: Mutex<Vec<HealedRun>>,
}

impl HealedAnnotation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, run: HealedRun) {
        let mut healed = self.healed.lock().expect("healed annotation lock poisoned");
        healed.push(run);
    }

    /// Snapshot of the healed runs recorded so far.
    pub fn healed_runs(&self) -> Vec<HealedRun> {
        self.healed
            .lock()
            .expect("healed annotation lock poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.healed
            .lock()
            .expect("healed annotation lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
