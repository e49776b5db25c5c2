//! Instance command handlers.

use serde::Serialize;
use tabled::Tabled;

use miniboard_core::{BoundInstance, InstanceDraft, ManageEvent};

use crate::cli::{GlobalOpts, InstancesArgs, InstancesCommand, SaveInstanceArgs};
use crate::error::CliError;
use crate::output;

use super::Remote;
use super::util::{self, ReplyWatcher};

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Save")]
    save: String,
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Start")]
    start: String,
}

impl InstanceRow {
    fn new(obj: &BoundInstance, color: bool) -> Self {
        let inst = &obj.instance;
        Self {
            id: inst.id.clone(),
            name: inst.name.clone(),
            save: inst.save.clone().unwrap_or_else(|| "-".into()),
            port: inst.port.clone().unwrap_or_else(|| "-".into()),
            status: output::paint_status(
                &inst.status.to_string(),
                inst.status.is_running(),
                color,
            ),
            start: if obj.start_available { "yes" } else { "no" }.into(),
        }
    }
}

#[derive(Tabled, Serialize)]
struct PortRow {
    #[tabled(rename = "Free port")]
    port: u16,
}

fn detail(obj: &BoundInstance) -> String {
    let inst = &obj.instance;
    let mut lines = vec![
        format!("ID:      {}", inst.id),
        format!("Name:    {}", inst.name),
        format!("Status:  {}", inst.status),
        format!("Port:    {}", inst.port.as_deref().unwrap_or("-")),
        format!("Save:    {}", inst.save.as_deref().unwrap_or("-")),
    ];
    if let Some(ref save) = obj.save {
        lines.push(format!("Saved:   {} ({})", save.date, save.size));
    }
    lines.push(format!(
        "Start:   {}",
        if obj.start_available { "available" } else { "blocked" }
    ));
    lines.join("\n")
}

fn label(obj: &BoundInstance) -> String {
    if obj.instance.name.is_empty() {
        obj.instance.id.clone()
    } else {
        obj.instance.name.clone()
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    remote: &mut Remote,
    args: InstancesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let view = util::loaded_board(remote).await?;
    let manage = remote.handles.manage.clone();

    match args.command {
        InstancesCommand::List => {
            let color = output::should_color(&global.color);
            let out = output::render_list(
                &global.output,
                &view.instances,
                |obj| InstanceRow::new(obj, color),
                |obj| obj.instance.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        InstancesCommand::Get { instance } => {
            let obj = util::resolve_instance(&view, &instance)?;
            let out = output::render_single(&global.output, obj, detail, |o| o.instance.id.clone())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        InstancesCommand::Start { instance } => {
            let obj = util::resolve_instance(&view, &instance)?;
            let id = obj.instance.id.clone();

            let reply = ReplyWatcher::new(remote);
            manage.start(&id)?;
            reply
                .wait_for(|event| matches!(event, ManageEvent::Started(Some(acked)) if *acked == id))
                .await?;
            if !global.quiet {
                eprintln!("Instance '{}' started", label(obj));
            }
            Ok(())
        }

        InstancesCommand::Kill { instance } => {
            let obj = util::resolve_instance(&view, &instance)?;
            let id = obj.instance.id.clone();
            if !util::confirm(&format!("Stop instance '{}'?", label(obj)), "kill", global.yes)? {
                return Ok(());
            }

            let reply = ReplyWatcher::new(remote);
            manage.kill(&id)?;
            reply
                .wait_for(|event| matches!(event, ManageEvent::Killed(Some(acked)) if *acked == id))
                .await?;
            if !global.quiet {
                eprintln!("Instance '{}' stopped", label(obj));
            }
            Ok(())
        }

        InstancesCommand::Delete { instance } => {
            let obj = util::resolve_instance(&view, &instance)?;
            let id = obj.instance.id.clone();
            if !util::confirm(
                &format!("Delete instance '{}'? This is destructive.", label(obj)),
                "delete",
                global.yes,
            )? {
                return Ok(());
            }

            let reply = ReplyWatcher::new(remote);
            manage.delete(&id)?;
            reply
                .wait_for(|event| matches!(event, ManageEvent::Deleted(gone) if *gone == id))
                .await?;
            if !global.quiet {
                eprintln!("Instance '{}' deleted", label(obj));
            }
            Ok(())
        }

        InstancesCommand::Save(save_args) => save(remote, &view, save_args, global).await,

        InstancesCommand::Ports => {
            let ports: Vec<PortRow> = manage
                .available_ports()
                .into_iter()
                .map(|port| PortRow { port })
                .collect();
            let out = output::render_list(
                &global.output,
                &ports,
                |row| PortRow { port: row.port },
                |row| row.port.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

/// Create a new instance, or update an existing one through the edit workflow.
async fn save(
    remote: &Remote,
    view: &miniboard_core::BoardView,
    args: SaveInstanceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let manage = &remote.handles.manage;

    if let Some(ref save) = args.save {
        if !view.saves.iter().any(|s| s.name == *save) {
            return Err(CliError::NotFound {
                resource_type: "save".into(),
                identifier: save.clone(),
                list_command: "saves".into(),
            });
        }
    }

    match args.instance {
        Some(identifier) => {
            let obj = util::resolve_instance(view, &identifier)?;
            let id = obj.instance.id.clone();

            let mut draft = manage.begin_edit(&id)?;
            if let Some(name) = args.name {
                draft.name = name;
            }
            if let Some(port) = args.port {
                draft.port = Some(port.to_string());
            }
            if args.save.is_some() {
                draft.save = args.save;
            }

            let reply = ReplyWatcher::new(remote);
            if let Err(err) = manage.submit_edit(&id, draft) {
                // Leave the object displayable again.
                let _ = manage.cancel_edit(&id);
                return Err(err.into());
            }
            reply
                .wait_for(|event| matches!(event, ManageEvent::Saved(ids) if ids.contains(&id)))
                .await?;
            if !global.quiet {
                eprintln!("Instance '{}' updated", label(obj));
            }
            Ok(())
        }

        None => {
            let name = args.name.ok_or_else(|| CliError::Validation {
                field: "name".into(),
                reason: "--name is required when creating an instance".into(),
            })?;
            let port = match args.port {
                Some(port) => port,
                None => manage
                    .available_ports()
                    .first()
                    .copied()
                    .ok_or_else(|| CliError::Validation {
                        field: "port".into(),
                        reason: "every configured game port is taken; pass --port".into(),
                    })?,
            };
            let draft = InstanceDraft {
                id: None,
                name,
                port: Some(port.to_string()),
                save: args.save,
            };

            let reply = ReplyWatcher::new(remote);
            manage.save(draft)?;
            let event = reply
                .wait_for(|event| matches!(event, ManageEvent::Saved(_)))
                .await?;
            if let ManageEvent::Saved(ids) = event {
                tracing::debug!(?ids, "instance created");
                if !global.quiet {
                    eprintln!("Instance created on port {port}");
                }
                output::print_output(&ids.join("\n"), global.quiet);
            }
            Ok(())
        }
    }
}
