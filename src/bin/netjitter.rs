use anyhow::{Context, Result};
use clap::Parser;
use netjitter::client::{run_client, ClientError, Reporter};
use netjitter::config::{Cli, RunConfig};
use netjitter::logging::init_logging_with_config;
use netjitter::server::{run_server, ServerError};
use netjitter::shutdown::Shutdown;
use tracing::{error, info};

/// Exit code for failures that are not attributed to a role.
const RUNTIME_EXIT_CODE: i32 = 2;

fn main() {
    // Help and version go to stdout with status 0; anything else is a usage error.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_logging_with_config(cli.effective_log_level(), cli.is_json_format());

    let config = match RunConfig::from_cli(&cli).and_then(|c| c.prepare_output().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = run(&config) {
        error!(error = %e, "Run failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

fn run(config: &RunConfig) -> Result<()> {
    let shutdown = Shutdown::install().context("Failed to install interrupt handler")?;

    if config.is_server() {
        run_server(config, &shutdown)
            .with_context(|| format!("Echo server on {} failed", config.address()))?;
        info!("Server stopped");
        return Ok(());
    }

    let report = run_client(config, &shutdown)
        .with_context(|| format!("Measurement against {} failed", config.address()))?;
    Reporter.print_results(&report);
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<ClientError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<ServerError>() {
        e.exit_code()
    } else {
        RUNTIME_EXIT_CODE
    }
}
