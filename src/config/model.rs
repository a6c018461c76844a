// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::healing::HealingSettings;
use crate::outcome::BuildOutcome;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// executor_slots = 2
/// log_dir = ".healmatrix"
///
/// [strategy]
/// log_patterns = """
/// OutOfMemoryError
/// Connection (reset|refused)
/// """
/// max_retries = 1
/// stop_retrying_after_one_fails = false
///
/// [configuration.linux]
/// cmd = "./ci.sh linux"
/// ```
///
/// All sections except `[configuration.<name>]` are optional and have
/// defaults. Use [`ConfigFile::try_from`] to validate.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Local executor behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Strategy parameters from `[strategy]`.
    #[serde(default)]
    pub strategy: StrategySection,

    /// All matrix configurations from `[configuration.<name>]`.
    ///
    /// Keys are the configuration names (e.g. `"linux"`, `"windows"`).
    #[serde(default)]
    pub configuration: BTreeMap<String, ConfigurationConfig>,
}

/// `[config]` section: behaviour of the local process executor.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// How many configurations may build concurrently.
    #[serde(default = "default_executor_slots")]
    pub executor_slots: usize,

    /// Directory that receives one log file per run.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_executor_slots() -> usize {
    2
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".healmatrix")
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            executor_slots: default_executor_slots(),
            log_dir: default_log_dir(),
        }
    }
}

/// `[strategy]` section: the self-healing parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategySection {
    /// Newline-delimited regular expressions; a failing run is only retried
    /// when some log line matches one of them. Empty means "retry any
    /// failing result in the severity band".
    #[serde(default)]
    pub log_patterns: String,

    /// Lower severity bound of the retry band ("worse than or equal to").
    #[serde(default)]
    pub worse_than_or_equal_to: Option<BuildOutcome>,

    /// Upper severity bound of the retry band ("better than or equal to").
    /// Clamped during validation so the band is never looser than the lower
    /// bound.
    #[serde(default)]
    pub better_than_or_equal_to: Option<BuildOutcome>,

    /// Retry budget per configuration; negative values clamp to 1.
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,

    /// Once one configuration exhausts its budget, stop retrying everywhere.
    #[serde(default)]
    pub stop_retrying_after_one_fails: bool,
}

fn default_max_retries() -> i64 {
    1
}

impl Default for StrategySection {
    fn default() -> Self {
        Self {
            log_patterns: String::new(),
            worse_than_or_equal_to: None,
            better_than_or_equal_to: None,
            max_retries: default_max_retries(),
            stop_retrying_after_one_fails: false,
        }
    }
}

/// One `[configuration.<name>]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigurationConfig {
    /// Shell command run for this configuration.
    pub cmd: String,
}

/// Validated configuration.
///
/// Invariants established by validation:
/// - at least one configuration, each with a non-empty command
/// - `executor_slots >= 1`
/// - every pattern line compiles
/// - strategy settings are clamped (retry budget, severity band)
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub strategy: HealingSettings,
    pub configuration: BTreeMap<String, ConfigurationConfig>,
}

impl ConfigFile {
    /// Construct without re-validating. Only `validate.rs` should call this.
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        strategy: HealingSettings,
        configuration: BTreeMap<String, ConfigurationConfig>,
    ) -> Self {
        Self {
            config,
            strategy,
            configuration,
        }
    }
}
