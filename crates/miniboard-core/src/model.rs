// ── Domain model ──
//
// Types carried in handler payloads: managed instances, save files,
// system usage, and the notification / log records surfaced to consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;

// ── Instance ─────────────────────────────────────────────────────────

/// Run state reported by the host for one instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InstanceStatus {
    Running,
    #[default]
    Stopped,
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

/// A managed game-server instance as the host knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Name of the save file this instance runs.
    #[serde(default)]
    pub save: Option<String>,

    /// Game port. The host stores it as text but may send a number.
    #[serde(default, deserialize_with = "string_or_number")]
    pub port: Option<String>,

    #[serde(default)]
    pub status: InstanceStatus,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}

/// Fields sent with a `save` action. Without `_id` the host creates a new
/// instance; with one it updates that instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstanceDraft {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub port: Option<String>,
    pub save: Option<String>,
}

impl InstanceDraft {
    /// A draft pre-filled from an existing instance.
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            id: Some(instance.id.clone()),
            name: instance.name.clone(),
            port: instance.port.clone(),
            save: instance.save.clone(),
        }
    }

    /// A name is the only required field.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "instance name must not be empty".into(),
            });
        }
        Ok(())
    }
}

// ── Saves ────────────────────────────────────────────────────────────

/// A saved game available on the host, as listed by `listsaves`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveFile {
    pub name: String,
    /// Human-formatted modification date.
    #[serde(default)]
    pub date: String,
    /// Human-formatted archive size.
    #[serde(default)]
    pub size: String,
}

// ── System usage ─────────────────────────────────────────────────────

/// Host CPU and memory load in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemUsage {
    #[serde(rename = "CPU")]
    pub cpu: f64,
    #[serde(rename = "MEM")]
    pub mem: f64,
}

// ── Notifications / logs ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Error,
}

/// A transient message meant for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    /// Key of the handler that raised it.
    pub source: String,
    pub message: String,
    pub received_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, source: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            source: source.to_owned(),
            message: message.into(),
            received_at: Utc::now(),
        }
    }
}

/// Marker the host puts in front of error output from a running instance.
const ERROR_LOG_PREFIX: &str = "[ERROR]";

/// One line of output from the running instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub text: String,
    pub is_error: bool,
    pub received_at: DateTime<Utc>,
}

impl LogLine {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            is_error: text.starts_with(ERROR_LOG_PREFIX),
            text,
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn instance_accepts_numeric_port_and_missing_fields() {
        let inst: Instance = serde_json::from_value(json!({
            "_id": "a1",
            "name": "Main",
            "port": 34197,
            "status": "running"
        }))
        .unwrap();
        assert_eq!(inst.port.as_deref(), Some("34197"));
        assert_eq!(inst.save, None);
        assert!(inst.status.is_running());

        let bare: Instance = serde_json::from_value(json!({"_id": "b"})).unwrap();
        assert_eq!(bare.status, InstanceStatus::Stopped);
        assert_eq!(bare.port, None);
    }

    #[test]
    fn unknown_status_is_tolerated() {
        let inst: Instance =
            serde_json::from_value(json!({"_id": "a", "status": "crashed"})).unwrap();
        assert_eq!(inst.status, InstanceStatus::Unknown);
        assert!(!inst.status.is_running());
    }

    #[test]
    fn status_display_matches_wire() {
        assert_eq!(InstanceStatus::Running.to_string(), "running");
        assert_eq!("stopped".parse::<InstanceStatus>().unwrap(), InstanceStatus::Stopped);
    }

    #[test]
    fn draft_omits_missing_id() {
        let draft = InstanceDraft {
            id: None,
            name: "New".into(),
            port: Some("34198".into()),
            save: Some("world".into()),
        };
        assert_eq!(
            serde_json::to_value(&draft).unwrap(),
            json!({"name": "New", "port": "34198", "save": "world"})
        );
    }

    #[test]
    fn draft_requires_a_name() {
        let draft = InstanceDraft {
            name: "   ".into(),
            ..InstanceDraft::default()
        };
        assert!(draft.validate().is_err());
    }

    #[test]
    fn system_usage_uses_uppercase_fields() {
        let usage: SystemUsage = serde_json::from_value(json!({"CPU": 3.5, "MEM": 61.2})).unwrap();
        assert!((usage.cpu - 3.5).abs() < f64::EPSILON);
        assert!((usage.mem - 61.2).abs() < f64::EPSILON);
    }

    #[test]
    fn log_line_flags_error_prefix() {
        assert!(LogLine::new("[ERROR] map failed to load").is_error);
        assert!(!LogLine::new("Hosting game at port 34197").is_error);
    }
}
