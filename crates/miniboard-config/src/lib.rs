//! Shared configuration for miniboard tools.
//!
//! A TOML file in the platform config dir, layered over built-in defaults
//! and `MINIBOARD_`-prefixed environment variables, and translated to
//! `miniboard_core::SessionConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use miniboard_core::{ReconnectPolicy, SessionConfig, endpoint_url};

/// Prefix for environment overrides. Nested keys use `__`
/// (`MINIBOARD_RECONNECT__MODE=backoff`).
pub const ENV_PREFIX: &str = "MINIBOARD_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Host running the admin server.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Milliseconds between a usage reply and the next poll.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Send the echo greeting on every connect.
    #[serde(default)]
    pub echo_on_ready: bool,

    /// Instance log lines kept in memory.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Ports offered when creating an instance.
    #[serde(default = "default_game_ports")]
    pub game_ports: Vec<u16>,

    /// Seconds to wait for a reply to a one-shot command.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            poll_interval_ms: default_poll_interval_ms(),
            echo_on_ready: false,
            log_capacity: default_log_capacity(),
            game_ports: default_game_ports(),
            request_timeout_secs: default_request_timeout_secs(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

/// Reconnect behaviour after the connection closes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ReconnectSettings {
    #[default]
    Immediate,
    Backoff {
        #[serde(default = "default_initial_delay_ms")]
        initial_delay_ms: u64,
        #[serde(default = "default_max_delay_ms")]
        max_delay_ms: u64,
    },
}

impl ReconnectSettings {
    pub fn to_policy(&self) -> ReconnectPolicy {
        match *self {
            Self::Immediate => ReconnectPolicy::Immediate,
            Self::Backoff {
                initial_delay_ms,
                max_delay_ms,
            } => ReconnectPolicy::Backoff {
                initial_delay: Duration::from_millis(initial_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms),
            },
        }
    }
}

fn default_host() -> String {
    "localhost".into()
}
fn default_port() -> u16 {
    6666
}
fn default_poll_interval_ms() -> u64 {
    5000
}
fn default_log_capacity() -> usize {
    500
}
fn default_game_ports() -> Vec<u16> {
    vec![34197, 34198, 34199]
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}

// ── Translation to core ─────────────────────────────────────────────

impl Config {
    /// Build the session configuration. This is the one place config types
    /// cross into core types.
    pub fn to_session_config(&self) -> Result<SessionConfig, ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "host".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::Validation {
                field: "port".into(),
                reason: "must be between 1 and 65535".into(),
            });
        }
        if let ReconnectSettings::Backoff {
            initial_delay_ms,
            max_delay_ms,
        } = self.reconnect
        {
            if initial_delay_ms > max_delay_ms {
                return Err(ConfigError::Validation {
                    field: "reconnect".into(),
                    reason: format!(
                        "initial_delay_ms ({initial_delay_ms}) exceeds max_delay_ms ({max_delay_ms})"
                    ),
                });
            }
        }

        let url = endpoint_url(&self.host, self.port).map_err(|e| ConfigError::Validation {
            field: "host".into(),
            reason: e.to_string(),
        })?;

        let mut session = SessionConfig::new(url);
        session.connection = session.connection.with_reconnect(self.reconnect.to_policy());
        session.usage_poll_interval = Duration::from_millis(self.poll_interval_ms);
        session.echo_on_ready = self.echo_on_ready;
        session.log_capacity = self.log_capacity;
        session.game_ports.clone_from(&self.game_ports);
        session.request_timeout = Duration::from_secs(self.request_timeout_secs);
        Ok(session)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "miniboard", "miniboard").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("miniboard");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the default path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` + environment. A missing file is not an
/// error; the defaults apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.port, 6666);
        assert_eq!(cfg.game_ports, [34197, 34198, 34199]);
        assert_eq!(cfg.reconnect, ReconnectSettings::Immediate);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
host = "factorio.lan"
port = 7000
echo_on_ready = true

[reconnect]
mode = "backoff"
initial_delay_ms = 250
"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.host, "factorio.lan");
        assert_eq!(cfg.port, 7000);
        assert!(cfg.echo_on_ready);
        assert_eq!(cfg.poll_interval_ms, 5000);
        assert_eq!(
            cfg.reconnect,
            ReconnectSettings::Backoff {
                initial_delay_ms: 250,
                max_delay_ms: 30_000,
            }
        );
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            host: "10.0.0.5".into(),
            game_ports: vec![40000],
            ..Config::default()
        };
        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    }

    #[test]
    fn session_config_carries_every_field() {
        let cfg = Config {
            poll_interval_ms: 1500,
            log_capacity: 10,
            reconnect: ReconnectSettings::Backoff {
                initial_delay_ms: 100,
                max_delay_ms: 1000,
            },
            ..Config::default()
        };
        let session = cfg.to_session_config().unwrap();
        assert_eq!(session.connection.url.as_str(), "ws://localhost:6666/websocket");
        assert_eq!(session.usage_poll_interval, Duration::from_millis(1500));
        assert_eq!(session.log_capacity, 10);
        assert_eq!(
            session.connection.reconnect,
            ReconnectPolicy::Backoff {
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
            }
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_port = Config {
            port: 0,
            ..Config::default()
        };
        assert!(matches!(
            zero_port.to_session_config(),
            Err(ConfigError::Validation { field, .. }) if field == "port"
        ));

        let inverted = Config {
            reconnect: ReconnectSettings::Backoff {
                initial_delay_ms: 5000,
                max_delay_ms: 10,
            },
            ..Config::default()
        };
        assert!(inverted.to_session_config().is_err());
    }
}
