// tests/config_validation.rs

use std::io::Write;

use healmatrix::config::{load_and_validate, ConfigFile, RawConfigFile};
use healmatrix::errors::HealmatrixError;
use healmatrix::outcome::BuildOutcome;

fn parse(toml_text: &str) -> RawConfigFile {
    toml::from_str(toml_text).expect("raw config should deserialize")
}

fn validate(toml_text: &str) -> Result<ConfigFile, HealmatrixError> {
    ConfigFile::try_from(parse(toml_text))
}

const MINIMAL: &str = r#"
[configuration.linux]
cmd = "echo linux"
"#;

#[test]
fn minimal_config_gets_defaults() {
    let cfg = validate(MINIMAL).unwrap();

    assert_eq!(cfg.config.executor_slots, 2);
    assert_eq!(cfg.config.log_dir, std::path::PathBuf::from(".healmatrix"));
    assert_eq!(cfg.strategy.max_retries, 1);
    assert!(!cfg.strategy.stop_retrying_after_one_fails);
    assert!(cfg.strategy.log_patterns.is_empty());
    assert_eq!(cfg.strategy.band.at_least(), BuildOutcome::Failure);
    assert_eq!(cfg.strategy.band.at_most(), BuildOutcome::NotBuilt);
    assert_eq!(cfg.configuration.len(), 1);
}

#[test]
fn negative_max_retries_clamps_to_one() {
    let cfg = validate(
        r#"
[strategy]
max_retries = -5

[configuration.linux]
cmd = "echo linux"
"#,
    )
    .unwrap();
    assert_eq!(cfg.strategy.max_retries, 1);
}

#[test]
fn zero_max_retries_is_preserved() {
    let cfg = validate(
        r#"
[strategy]
max_retries = 0

[configuration.linux]
cmd = "echo linux"
"#,
    )
    .unwrap();
    assert_eq!(cfg.strategy.max_retries, 0);
}

#[test]
fn inverted_band_is_clamped_at_load_time() {
    let cfg = validate(
        r#"
[strategy]
worse_than_or_equal_to = "ABORTED"
better_than_or_equal_to = "SUCCESS"

[configuration.linux]
cmd = "echo linux"
"#,
    )
    .unwrap();
    assert_eq!(cfg.strategy.band.at_least(), BuildOutcome::Aborted);
    assert_eq!(cfg.strategy.band.at_most(), BuildOutcome::Aborted);
}

#[test]
fn band_bounds_can_be_widened_to_aborted() {
    let cfg = validate(
        r#"
[strategy]
better_than_or_equal_to = "ABORTED"

[configuration.linux]
cmd = "echo linux"
"#,
    )
    .unwrap();
    assert!(cfg.strategy.band.contains(BuildOutcome::Aborted));
}

#[test]
fn config_without_configurations_is_rejected() {
    let err = validate("").unwrap_err();
    assert!(matches!(err, HealmatrixError::ConfigError(_)));
}

#[test]
fn empty_command_is_rejected() {
    let err = validate(
        r#"
[configuration.linux]
cmd = "   "
"#,
    )
    .unwrap_err();
    assert!(matches!(err, HealmatrixError::ConfigError(_)));
}

#[test]
fn zero_executor_slots_is_rejected() {
    let err = validate(
        r#"
[config]
executor_slots = 0

[configuration.linux]
cmd = "echo linux"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, HealmatrixError::ConfigError(_)));
}

#[test]
fn bad_pattern_fails_the_load_not_the_build() {
    let err = validate(
        r#"
[strategy]
log_patterns = "(unclosed"

[configuration.linux]
cmd = "echo linux"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, HealmatrixError::PatternError(_)));
}

#[test]
fn load_and_validate_reads_a_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[strategy]
log_patterns = "OutOfMemoryError"
max_retries = 3

[configuration.linux]
cmd = "echo linux"

[configuration.windows]
cmd = "echo windows"
"#
    )
    .unwrap();

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.strategy.max_retries, 3);
    assert_eq!(cfg.configuration.len(), 2);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("does/not/exist/Healmatrix.toml").unwrap_err();
    assert!(matches!(err, HealmatrixError::IoError(_)));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not [valid toml").unwrap();

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, HealmatrixError::TomlError(_)));
}
