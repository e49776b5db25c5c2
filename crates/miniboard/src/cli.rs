//! Clap derive structures for the `miniboard` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// miniboard -- administer a game-server host from the command line
#[derive(Debug, Parser)]
#[command(
    name = "miniboard",
    version,
    about = "Administer a miniboard game-server host from the command line",
    long_about = "Talks to the host's administration channel over a single WebSocket:\n\
        list, create, start and stop game-server instances, browse save files,\n\
        and watch host load and instance output live.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Host running the admin server (overrides config)
    #[arg(long, short = 'H', env = "MINIBOARD_HOST", global = true)]
    pub host: Option<String>,

    /// Admin server port (overrides config)
    #[arg(long, short = 'P', env = "MINIBOARD_PORT", global = true)]
    pub port: Option<u16>,

    /// Config file to use instead of the default location
    #[arg(long, env = "MINIBOARD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "MINIBOARD_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Seconds to wait for the host to answer (overrides config)
    #[arg(long, env = "MINIBOARD_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage game-server instances
    #[command(alias = "inst", alias = "i")]
    Instances(InstancesArgs),

    /// List save files available on the host
    Saves,

    /// Stream host load, notifications and instance output until Ctrl-C
    Watch,

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Instances ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct InstancesArgs {
    #[command(subcommand)]
    pub command: InstancesCommand,
}

#[derive(Debug, Subcommand)]
pub enum InstancesCommand {
    /// List all instances
    #[command(alias = "ls")]
    List,

    /// Show one instance (by id or name)
    Get { instance: String },

    /// Start an instance; refused while another one runs
    Start { instance: String },

    /// Stop a running instance
    Kill { instance: String },

    /// Delete a stopped instance
    #[command(alias = "rm")]
    Delete { instance: String },

    /// Create an instance, or update one when INSTANCE is given
    Save(SaveInstanceArgs),

    /// List game ports not used by any instance
    Ports,
}

#[derive(Debug, Args)]
pub struct SaveInstanceArgs {
    /// Existing instance to update (id or name)
    pub instance: Option<String>,

    /// Instance name (required when creating)
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Game port (defaults to the first free one when creating)
    #[arg(long)]
    pub port: Option<u16>,

    /// Save file to run
    #[arg(long, short = 's')]
    pub save: Option<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a config file interactively
    Init,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
