// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile, StrategySection};
use crate::errors::{HealmatrixError, Result};
use crate::healing::{HealingSettings, LogPatterns};
use crate::outcome::{BuildOutcome, SeverityBand};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::HealmatrixError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let strategy = settings_from_section(&raw.strategy);
        Ok(ConfigFile::new_unchecked(
            raw.config,
            strategy,
            raw.configuration,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_configurations(cfg)?;
    validate_executor_config(cfg)?;
    validate_patterns(cfg)?;
    Ok(())
}

fn ensure_has_configurations(cfg: &RawConfigFile) -> Result<()> {
    if cfg.configuration.is_empty() {
        return Err(HealmatrixError::ConfigError(
            "config must contain at least one [configuration.<name>] section".to_string(),
        ));
    }
    for (name, configuration) in cfg.configuration.iter() {
        if configuration.cmd.trim().is_empty() {
            return Err(HealmatrixError::ConfigError(format!(
                "configuration '{}' has an empty `cmd`",
                name
            )));
        }
    }
    Ok(())
}

fn validate_executor_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.executor_slots == 0 {
        return Err(HealmatrixError::ConfigError(
            "[config].executor_slots must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_patterns(cfg: &RawConfigFile) -> Result<()> {
    // Compile here so a bad pattern fails the load, not the running build.
    LogPatterns::compile(&cfg.strategy.log_patterns)?;
    Ok(())
}

/// Clamp and translate the raw `[strategy]` section.
///
/// - A negative retry budget clamps to 1, never 0, so a misconfigured job
///   still heals once.
/// - The severity band's upper bound is clamped by [`SeverityBand::new`] so
///   it is never looser than the lower bound.
fn settings_from_section(section: &StrategySection) -> HealingSettings {
    let at_least = section
        .worse_than_or_equal_to
        .unwrap_or(BuildOutcome::Failure);
    let at_most = section
        .better_than_or_equal_to
        .unwrap_or(BuildOutcome::NotBuilt);

    let max_retries = if section.max_retries < 0 {
        1
    } else {
        u32::try_from(section.max_retries).unwrap_or(u32::MAX)
    };

    HealingSettings {
        log_patterns: section.log_patterns.clone(),
        band: SeverityBand::new(at_least, at_most),
        max_retries,
        stop_retrying_after_one_fails: section.stop_retrying_after_one_fails,
    }
}
