// src/main.rs

use healmatrix::outcome::BuildOutcome;
use healmatrix::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(BuildOutcome::Success) => {}
        Ok(_) => std::process::exit(1),
        Err(err) => {
            eprintln!("healmatrix error: {err:?}");
            std::process::exit(2);
        }
    }
}

async fn run_main() -> anyhow::Result<BuildOutcome> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
