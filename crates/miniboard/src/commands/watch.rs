//! Live stream of host load, notifications, instance output and connection
//! state, until Ctrl-C.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use miniboard_core::{ConnectionState, LogLine, ManageEvent, Notification, NotificationLevel, SystemUsage};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::Remote;

/// One streamed line. Structured formats emit these as JSON lines.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WatchEvent {
    Connection { state: &'static str },
    Usage { cpu: f64, mem: f64 },
    Notification(Notification),
    Log(LogLine),
}

fn state_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connecting => "connecting",
        ConnectionState::Open => "open",
        ConnectionState::Closed => "closed",
    }
}

fn clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn emit(&self, event: &WatchEvent) -> Result<(), CliError> {
        let line = match self.format {
            OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
                output::render_json(event, true)?
            }
            OutputFormat::Table | OutputFormat::Plain => self.human(event),
        };
        output::print_output(&line, self.quiet);
        Ok(())
    }

    fn human(&self, event: &WatchEvent) -> String {
        let now = clock(Utc::now());
        match event {
            WatchEvent::Connection { state } => {
                output::paint_dim(&format!("{now} connection {state}"), self.color)
            }
            WatchEvent::Usage { cpu, mem } => format!("{now} cpu {cpu:5.1}%  mem {mem:5.1}%"),
            WatchEvent::Notification(note) => {
                let text = format!(
                    "{} [{}] {}: {}",
                    clock(note.received_at),
                    note.level,
                    note.source,
                    note.message
                );
                if note.level == NotificationLevel::Error {
                    output::paint_error(&text, self.color)
                } else {
                    text
                }
            }
            WatchEvent::Log(line) => {
                let text = format!("{} | {}", clock(line.received_at), line.text);
                if line.is_error {
                    output::paint_error(&text, self.color)
                } else {
                    text
                }
            }
        }
    }
}

pub async fn handle(remote: &mut Remote, global: &GlobalOpts) -> Result<(), CliError> {
    let printer = Printer {
        format: global.output.clone(),
        color: output::should_color(&global.color),
        quiet: global.quiet,
    };

    // Replay what is already buffered before streaming new lines.
    for line in remote.handles.manage.logs() {
        printer.emit(&WatchEvent::Log(line))?;
    }

    let mut events = remote.handles.manage.events();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::debug!("interrupted, leaving watch");
                break;
            }

            changed = remote.state.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *remote.state.borrow_and_update();
                printer.emit(&WatchEvent::Connection { state: state_label(state) })?;
            }

            changed = remote.handles.usage.changed() => {
                if changed.is_err() {
                    break;
                }
                let usage: Option<SystemUsage> = *remote.handles.usage.borrow_and_update();
                if let Some(usage) = usage {
                    printer.emit(&WatchEvent::Usage { cpu: usage.cpu, mem: usage.mem })?;
                }
            }

            note = remote.handles.notifications.recv() => match note {
                Ok(note) => printer.emit(&WatchEvent::Notification(note))?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification stream lagged");
                }
                Err(RecvError::Closed) => break,
            },

            event = events.recv() => match event {
                Ok(ManageEvent::Log(line)) => printer.emit(&WatchEvent::Log(line))?,
                Ok(other) => tracing::debug!(event = ?other, "manage event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "manage event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_events_are_tagged_by_kind() {
        let json = output::render_json(&WatchEvent::Usage { cpu: 1.5, mem: 2.0 }, true);
        assert_eq!(
            json.ok().as_deref(),
            Some(r#"{"kind":"usage","cpu":1.5,"mem":2.0}"#)
        );

        let json = output::render_json(&WatchEvent::Connection { state: "open" }, true);
        assert_eq!(
            json.ok().as_deref(),
            Some(r#"{"kind":"connection","state":"open"}"#)
        );
    }

    #[test]
    fn error_log_lines_are_plain_without_color() {
        let printer = Printer {
            format: OutputFormat::Plain,
            color: false,
            quiet: false,
        };
        let text = printer.human(&WatchEvent::Log(LogLine::new("[ERROR] boom")));
        assert!(text.ends_with("| [ERROR] boom"));
    }
}
