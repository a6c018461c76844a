// src/outcome.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Outcome of one run, ordered by severity.
///
/// The derive order is the total order: `Success` is the best outcome and
/// `Aborted` the worst, so `a.max(b)` is "worse of the two".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildOutcome {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    Aborted,
}

impl BuildOutcome {
    /// All outcomes, best to worst. Exposed for configuration surfaces that
    /// enumerate the valid severity bounds.
    pub const ALL: [BuildOutcome; 5] = [
        BuildOutcome::Success,
        BuildOutcome::Unstable,
        BuildOutcome::Failure,
        BuildOutcome::NotBuilt,
        BuildOutcome::Aborted,
    ];

    /// Worse of the two outcomes.
    pub fn combine(self, other: BuildOutcome) -> BuildOutcome {
        self.max(other)
    }

    pub fn is_worse_or_equal_to(self, other: BuildOutcome) -> bool {
        self >= other
    }

    pub fn is_better_or_equal_to(self, other: BuildOutcome) -> bool {
        self <= other
    }

    /// Canonical upper-case name, e.g. `NOT_BUILT`.
    pub fn as_str(self) -> &'static str {
        match self {
            BuildOutcome::Success => "SUCCESS",
            BuildOutcome::Unstable => "UNSTABLE",
            BuildOutcome::Failure => "FAILURE",
            BuildOutcome::NotBuilt => "NOT_BUILT",
            BuildOutcome::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SUCCESS" => Ok(BuildOutcome::Success),
            "UNSTABLE" => Ok(BuildOutcome::Unstable),
            "FAILURE" => Ok(BuildOutcome::Failure),
            "NOT_BUILT" => Ok(BuildOutcome::NotBuilt),
            "ABORTED" => Ok(BuildOutcome::Aborted),
            other => Err(format!(
                "invalid build outcome: {other} (expected SUCCESS, UNSTABLE, FAILURE, NOT_BUILT or ABORTED)"
            )),
        }
    }
}

/// Inclusive range of outcomes eligible for retry consideration.
///
/// `at_least` is the "worse than or equal to" bound and `at_most` the
/// "better than or equal to" bound. An inverted pair is clamped at
/// construction so the band is never looser than `at_least`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityBand {
    at_least: BuildOutcome,
    at_most: BuildOutcome,
}

impl SeverityBand {
    pub fn new(at_least: BuildOutcome, at_most: BuildOutcome) -> Self {
        let at_most = if at_most.is_worse_or_equal_to(at_least) {
            at_most
        } else {
            at_least
        };
        Self { at_least, at_most }
    }

    /// Default band: FAILURE-or-worse, but not ABORTED.
    pub fn failure_to_not_built() -> Self {
        Self::new(BuildOutcome::Failure, BuildOutcome::NotBuilt)
    }

    pub fn at_least(&self) -> BuildOutcome {
        self.at_least
    }

    pub fn at_most(&self) -> BuildOutcome {
        self.at_most
    }

    pub fn contains(&self, outcome: BuildOutcome) -> bool {
        outcome.is_worse_or_equal_to(self.at_least) && outcome.is_better_or_equal_to(self.at_most)
    }
}

impl Default for SeverityBand {
    fn default() -> Self {
        SeverityBand::failure_to_not_built()
    }
}
