//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

use miniboard_core::{BoardView, BoundInstance, CoreError, ManageEvent, Notification, NotificationLevel};

use super::Remote;
use crate::error::CliError;

fn timeout_error(remote_url: &str, timeout: Duration) -> CliError {
    CliError::Timeout {
        url: remote_url.to_owned(),
        seconds: timeout.as_secs(),
    }
}

/// Wait for the first full instance listing of this connection.
pub async fn loaded_board(remote: &Remote) -> Result<Arc<BoardView>, CliError> {
    let view = tokio::time::timeout(remote.timeout, remote.handles.manage.wait_loaded())
        .await
        .map_err(|_| timeout_error(&remote.url, remote.timeout))??;
    Ok(view)
}

/// Resolve an instance identifier (id or name) against the loaded board.
pub fn resolve_instance<'a>(
    view: &'a BoardView,
    identifier: &str,
) -> Result<&'a BoundInstance, CliError> {
    view.find(identifier).ok_or_else(|| CliError::NotFound {
        resource_type: "instance".into(),
        identifier: identifier.into(),
        list_command: "instances list".into(),
    })
}

/// How long an `error` notification waits for the matching reply before it
/// is taken as the host's answer. The host pushes unrelated errors too (an
/// instance dying on its own), and a request it accepted still gets its reply.
const REJECTION_GRACE: Duration = Duration::from_millis(500);

/// Listens for the reply to one request. Create it before sending so the
/// reply cannot slip past.
pub struct ReplyWatcher {
    events: broadcast::Receiver<ManageEvent>,
    notifications: broadcast::Receiver<Notification>,
    url: String,
    timeout: Duration,
}

impl ReplyWatcher {
    pub fn new(remote: &Remote) -> Self {
        Self::from_parts(
            remote.handles.manage.events(),
            // Only errors raised after this point count against the request.
            remote.handles.notifications.resubscribe(),
            remote.url.clone(),
            remote.timeout,
        )
    }

    fn from_parts(
        events: broadcast::Receiver<ManageEvent>,
        notifications: broadcast::Receiver<Notification>,
        url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            events,
            notifications,
            url,
            timeout,
        }
    }

    /// Wait for the first manage event accepted by `matches`.
    ///
    /// An error notification fails the request only if the matching reply
    /// does not follow within [`REJECTION_GRACE`].
    pub async fn wait_for(
        self,
        matches: impl Fn(&ManageEvent) -> bool,
    ) -> Result<ManageEvent, CliError> {
        let Self {
            mut events,
            mut notifications,
            url,
            timeout,
        } = self;

        let wait = async {
            let mut rejection: Option<(String, Instant)> = None;
            loop {
                let deadline = rejection
                    .as_ref()
                    .map_or_else(Instant::now, |(_, at)| *at);
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) if matches(&event) => return Ok(event),
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => return Err(CliError::from(CoreError::SessionClosed)),
                    },
                    note = notifications.recv() => match note {
                        Ok(note) if note.level == NotificationLevel::Error => {
                            tracing::debug!(message = %note.message, "host error while waiting for a reply");
                            if rejection.is_none() {
                                rejection = Some((note.message, Instant::now() + REJECTION_GRACE));
                            }
                        }
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => return Err(CliError::from(CoreError::SessionClosed)),
                    },
                    () = tokio::time::sleep_until(deadline), if rejection.is_some() => {
                        let message = rejection.take().map(|(message, _)| message).unwrap_or_default();
                        return Err(CliError::Rejected { message });
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| timeout_error(&url, timeout))?
    }
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}
