//! snowdrift CLI: stage, bulk-load and cluster files into warehouse tables.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use snowdrift::{CliArgs, Config, Loader, SnowflakeEngine, init_tracing, open_source};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let paths = args.config_paths();
    if paths.is_empty() {
        eprintln!("Error: no config files or directories specified");
        return ExitCode::FAILURE;
    }

    info!("Loading config from {} source(s)", paths.len());

    let config = match Config::from_paths(&paths) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let source = match open_source(&config.source, config.loader.probe_bytes) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to open source: {e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = match SnowflakeEngine::new(&config.warehouse, config.loader.poll_policy()) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            eprintln!("Failed to create SQL engine: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut loader = Loader::new(&config, engine, source);
    loader.log_startup_info();

    match loader.run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Load failed: {e}");
            ExitCode::FAILURE
        }
    }
}
