//! Config subcommand handlers.

use std::path::PathBuf;

use dialoguer::{Confirm, Input};

use miniboard_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn target_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

/// Effective configuration: file and environment, then command-line overrides.
pub fn effective(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = config::load_config_from(&target_path(global))?;
    if let Some(ref host) = global.host {
        cfg.host.clone_from(host);
    }
    if let Some(port) = global.port {
        cfg.port = port;
    }
    if let Some(timeout) = global.timeout {
        cfg.request_timeout_secs = timeout;
    }
    Ok(cfg)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = effective(global)?;
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&cfg).map_err(|e| CliError::Serialize(e.to_string()))?
                }
                ref format => output::render_single(format, &cfg, |_| String::new(), |_| String::new())?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&target_path(global).display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Init => {
            let path = target_path(global);
            let mut cfg = effective(global)?;

            if !global.yes {
                eprintln!("miniboard configuration");
                eprintln!("   Config path: {}\n", path.display());

                if path.exists()
                    && !Confirm::new()
                        .with_prompt("A config file already exists. Overwrite it?")
                        .default(false)
                        .interact()
                        .map_err(prompt_err)?
                {
                    return Ok(());
                }

                cfg.host = Input::new()
                    .with_prompt("Host")
                    .default(cfg.host.clone())
                    .interact_text()
                    .map_err(prompt_err)?;

                cfg.port = Input::new()
                    .with_prompt("Port")
                    .default(cfg.port)
                    .interact_text()
                    .map_err(prompt_err)?;

                cfg.echo_on_ready = Confirm::new()
                    .with_prompt("Send a greeting on every connect?")
                    .default(cfg.echo_on_ready)
                    .interact()
                    .map_err(prompt_err)?;
            }

            // Refuse to write something the client could not use.
            cfg.to_session_config()?;
            config::save_config_to(&cfg, &path)?;
            tracing::info!(path = %path.display(), "config written");

            if !global.quiet {
                eprintln!("Config saved to {}", path.display());
            }
            Ok(())
        }
    }
}
