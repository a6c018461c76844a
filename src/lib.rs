// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod healing;
pub mod logging;
pub mod matrix;
pub mod outcome;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::exec::LocalMatrix;
use crate::healing::SelfHealingStrategy;
use crate::matrix::{MatrixExecution, TracingListener};
use crate::outcome::BuildOutcome;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the local process-backed matrix adapter
/// - the self-healing strategy
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<BuildOutcome> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(BuildOutcome::Success);
    }

    let matrix = LocalMatrix::from_config(&cfg)?;

    // Ctrl-C → abort the polling loop at its next suspension point.
    let (abort_tx, abort_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        let _ = abort_tx.send(true);
    });

    let strategy = SelfHealingStrategy::new(cfg.strategy.clone());
    let mut execution = MatrixExecution::new(
        args.build_number,
        matrix.configurations(),
        Arc::new(TracingListener),
    )
    .with_abort(abort_rx);

    let combined = strategy.run(&mut execution).await?;

    if let Some(healed) = execution.healed() {
        for run in healed.healed_runs() {
            info!(
                configuration = %run.configuration,
                run = %run.run,
                retry = run.retry_count,
                "run was auto-healed"
            );
        }
    }

    // The combined result is the one line that goes to stdout.
    println!("{combined}");
    Ok(combined)
}

/// Simple dry-run output: print the strategy settings and the matrix.
fn print_dry_run(cfg: &ConfigFile) {
    println!("healmatrix dry-run ({})", SelfHealingStrategy::DISPLAY_NAME);
    println!("  strategy.max_retries = {}", cfg.strategy.max_retries);
    println!(
        "  strategy.stop_retrying_after_one_fails = {}",
        cfg.strategy.stop_retrying_after_one_fails
    );
    println!(
        "  strategy.band = [{} .. {}]",
        cfg.strategy.band.at_least(),
        cfg.strategy.band.at_most()
    );
    if cfg.strategy.log_patterns.is_empty() {
        println!("  strategy.log_patterns = (empty: any result in band reruns)");
    } else {
        println!("  strategy.log_patterns:");
        for line in cfg.strategy.log_patterns.lines().filter(|l| !l.is_empty()) {
            println!("    {line}");
        }
    }
    println!("  config.executor_slots = {}", cfg.config.executor_slots);
    println!("  config.log_dir = {}", cfg.config.log_dir.display());
    println!();

    println!("configurations ({}):", cfg.configuration.len());
    for (name, configuration) in cfg.configuration.iter() {
        println!("  - {name}");
        println!("      cmd: {}", configuration.cmd);
    }
}
