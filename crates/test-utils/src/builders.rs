#![allow(dead_code)]

use healmatrix::healing::HealingSettings;
use healmatrix::outcome::{BuildOutcome, SeverityBand};

/// Builder for `HealingSettings` to simplify test setup.
///
/// Defaults match the validated config defaults: empty patterns, the
/// FAILURE..NOT_BUILT band, one retry, no fleet-wide stop.
pub struct SettingsBuilder {
    settings: HealingSettings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: HealingSettings::default(),
        }
    }

    pub fn patterns(mut self, source: &str) -> Self {
        self.settings.log_patterns = source.to_string();
        self
    }

    pub fn band(mut self, at_least: BuildOutcome, at_most: BuildOutcome) -> Self {
        self.settings.band = SeverityBand::new(at_least, at_most);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.settings.max_retries = max_retries;
        self
    }

    pub fn stop_after_one_fails(mut self, stop: bool) -> Self {
        self.settings.stop_retrying_after_one_fails = stop;
        self
    }

    pub fn build(self) -> HealingSettings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
