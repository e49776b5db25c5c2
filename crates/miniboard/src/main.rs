mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use miniboard_core::{Session, SessionConfig};

use crate::cli::{Cli, Command};
use crate::commands::Remote;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a host connection
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "miniboard", &mut std::io::stdout());
            Ok(())
        }

        // All other commands run over one session
        cmd => {
            let session_config = build_session_config(&cli.global)?;
            let url = session_config.connection.url.to_string();
            let timeout = session_config.request_timeout;

            let mut session = Session::new(session_config);
            let handles = session.install_default_handlers();
            let running = session.start();

            let mut remote = Remote {
                handles,
                state: running.subscribe_state(),
                url,
                timeout,
            };

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &mut remote, &cli.global).await;

            running.shutdown();
            running.join().await;
            result
        }
    }
}

/// Build a `SessionConfig` from the config file, environment, and CLI overrides.
fn build_session_config(global: &cli::GlobalOpts) -> Result<SessionConfig, CliError> {
    let cfg = commands::config_cmd::effective(global)?;
    Ok(cfg.to_session_config()?)
}
