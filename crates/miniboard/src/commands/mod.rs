//! Command dispatch: bridges CLI args -> the running session -> output formatting.

pub mod config_cmd;
pub mod instances;
pub mod saves;
pub mod util;
pub mod watch;

use std::time::Duration;

use tokio::sync::watch as state_watch;

use miniboard_core::{ConnectionState, Handles};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Everything a host-bound command needs from the running session.
pub struct Remote {
    pub handles: Handles,
    pub state: state_watch::Receiver<ConnectionState>,
    /// Endpoint, for error messages.
    pub url: String,
    /// How long to wait for any one reply.
    pub timeout: Duration,
}

/// Dispatch a host-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    remote: &mut Remote,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Instances(args) => instances::handle(remote, args, global).await,
        Command::Saves => saves::handle(remote, global).await,
        Command::Watch => watch::handle(remote, global).await,
        // Config and Completions never reach a session
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
