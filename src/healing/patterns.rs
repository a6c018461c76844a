// src/healing/patterns.rs

//! Compiled retry patterns for scanning run logs.
//!
//! The user-facing configuration is a newline-delimited string; every
//! non-empty line compiles to an independent regular expression. A run's log
//! is scanned line by line and matching is a partial match (`Regex::is_match`
//! searches anywhere in the line). An empty pattern set is the "match
//! everything" sentinel: any result in the severity band is retry-eligible
//! regardless of log content.

use std::io::BufRead;

use regex::Regex;

/// Compile-once pattern set derived from the strategy's pattern source.
#[derive(Debug, Default)]
pub struct LogPatterns {
    patterns: Vec<Regex>,
}

impl LogPatterns {
    /// Compile each non-empty line of `source` as a regular expression.
    pub fn compile(source: &str) -> Result<Self, regex::Error> {
        let mut patterns = Vec::new();
        for line in source.lines() {
            if line.is_empty() {
                continue;
            }
            patterns.push(Regex::new(line)?);
        }
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether any line of `log` matches any pattern.
    ///
    /// Streams the log; returns on the first matching line. The reader is
    /// dropped on return, early or not, so the underlying log handle is
    /// closed even when an IO error propagates.
    pub fn matches<R: BufRead>(&self, log: R) -> std::io::Result<bool> {
        if self.patterns.is_empty() {
            // No specific patterns specified. Accept everything.
            return Ok(true);
        }

        for line in log.lines() {
            let line = line?;
            if self.patterns.iter().any(|p| p.is_match(&line)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
