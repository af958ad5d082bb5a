//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and the settings
//! record persisted as `settings.yaml` in the user's configuration directory.
//! Settings are read field by field: an absent, unknown, or ill-typed field
//! never prevents the others from applying.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Default chat server.
pub const DEFAULT_SERVER_URL: &str = "https://chat-server-cfpa.onrender.com";

/// Default delay between two poll cycles.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 1000;

/// Default number of messages fetched per poll cycle.
pub const DEFAULT_MAX_MESSAGES: u32 = 50;

/// Default timestamp format, in `time` format-description syntax.
pub const DEFAULT_TIME_FORMAT: &str = "[hour]:[minute]:[second]";

/// Name of the per-user configuration directory.
const APP_NAME: &str = "chat-terminal";

const SETTINGS_FILE: &str = "settings.yaml";
const AUTH_FILE: &str = "auth.json";
const LOG_FILE: &str = "chat-terminal.log";

/// Command-line arguments for the chat-terminal tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Directory holding settings.yaml and auth.json.
    #[arrrg(optional, "Configuration directory (default: ~/.config/chat-terminal)", "DIR")]
    pub config_dir: Option<String>,

    /// Chat server to talk to.
    #[arrrg(optional, "Chat server URL", "URL")]
    pub server_url: Option<String>,

    /// Milliseconds between two message polls.
    #[arrrg(optional, "Poll interval in milliseconds (default: 1000)", "MS")]
    pub refresh_interval_ms: Option<u64>,

    /// Maximum number of messages fetched per poll.
    #[arrrg(optional, "Messages fetched per poll (default: 50)", "COUNT")]
    pub max_messages: Option<u32>,

    /// Timestamp format description.
    #[arrrg(optional, "Timestamp format (default: [hour]:[minute]:[second])", "FORMAT")]
    pub time_format: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Resolved configuration for the chat client.
///
/// The persisted fields mirror `settings.yaml`; `use_color` and `config_dir`
/// only come from the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Base URL of the chat server.
    pub server_url: String,

    /// Delay between two poll cycles, in milliseconds.
    pub refresh_interval_ms: u64,

    /// Upper bound on messages fetched per poll cycle.
    pub max_messages: u32,

    /// Timestamp format used when rendering messages.
    pub time_format: String,

    /// Whether to use ANSI colors and styles in output.
    #[serde(skip)]
    pub use_color: bool,

    /// Directory holding the settings and credential records.
    #[serde(skip)]
    pub config_dir: PathBuf,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Server: the public chat server
    /// - Refresh interval: 1000 ms
    /// - Max messages: 50
    /// - Time format: `[hour]:[minute]:[second]`
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            max_messages: DEFAULT_MAX_MESSAGES,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            use_color: true,
            config_dir: default_config_dir(),
        }
    }

    /// Sets the server URL.
    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    /// Sets the refresh interval in milliseconds.
    pub fn with_refresh_interval_ms(mut self, refresh_interval_ms: u64) -> Self {
        self.refresh_interval_ms = refresh_interval_ms;
        self
    }

    /// Sets the maximum number of messages per poll.
    pub fn with_max_messages(mut self, max_messages: u32) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// Sets the timestamp format.
    pub fn with_time_format(mut self, time_format: impl Into<String>) -> Self {
        self.time_format = time_format.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the configuration directory.
    pub fn with_config_dir(mut self, config_dir: impl Into<PathBuf>) -> Self {
        self.config_dir = config_dir.into();
        self
    }

    /// The refresh interval as a duration.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Path of the settings record.
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }

    /// Path of the credential record.
    pub fn auth_path(&self) -> PathBuf {
        self.config_dir.join(AUTH_FILE)
    }

    /// Path of the log file written by the binary.
    pub fn log_path(&self) -> PathBuf {
        self.config_dir.join(LOG_FILE)
    }

    /// Resolves the configuration from command-line arguments.
    ///
    /// Reads (or creates) `settings.yaml` in the configuration directory and
    /// applies command-line overrides on top.  Never fails: unreadable or
    /// malformed settings fall back to defaults.
    pub fn load(args: &ChatArgs) -> Self {
        let config_dir = args
            .config_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_config_dir);
        Self::load_or_create(&config_dir).with_overrides(args)
    }

    /// Reads `settings.yaml` from `config_dir`, writing the defaults when the
    /// file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Self {
        let mut config = ChatConfig::new().with_config_dir(config_dir);
        let path = config.settings_path();
        match fs::read_to_string(&path) {
            Ok(text) => {
                if let Err(err) = config.apply_settings(&text) {
                    warn!(path = %path.display(), error = %err, "ignoring malformed settings");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if let Err(err) = config.write_settings() {
                    warn!(path = %path.display(), error = %err, "could not create default settings");
                } else {
                    info!(path = %path.display(), "created default settings");
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not read settings");
            }
        }
        config
    }

    /// Applies the recognized fields of a settings document.
    ///
    /// Unknown fields are ignored.  A recognized field with the wrong type or
    /// an invalid value is skipped with a warning and keeps its prior value.
    pub fn apply_settings(&mut self, text: &str) -> Result<()> {
        let document: Value = serde_yaml::from_str(text)?;
        let mapping = match document {
            Value::Mapping(mapping) => mapping,
            Value::Null => return Ok(()),
            _ => {
                return Err(Error::validation(
                    "settings must be a mapping of field names to values",
                    None,
                ));
            }
        };
        for (key, value) in mapping {
            let Some(key) = key.as_str() else {
                continue;
            };
            let applied = match key {
                "server_url" => take::<String>(value).map(|v| self.server_url = v),
                "refresh_interval_ms" => take::<u64>(value)
                    .and_then(|v| positive(v, key))
                    .map(|v| self.refresh_interval_ms = v),
                "max_messages" => take::<u32>(value)
                    .and_then(|v| positive(v, key))
                    .map(|v| self.max_messages = v),
                "time_format" => take::<String>(value)
                    .and_then(valid_time_format)
                    .map(|v| self.time_format = v),
                _ => Ok(()),
            };
            if let Err(err) = applied {
                warn!(field = key, error = %err, "ignoring settings field");
            }
        }
        Ok(())
    }

    /// Writes the persisted fields to `settings.yaml`.
    pub fn write_settings(&self) -> Result<()> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|err| Error::io("failed to create configuration directory", err))?;
        let yaml = serde_yaml::to_string(self)?;
        fs::write(self.settings_path(), yaml)
            .map_err(|err| Error::io("failed to write settings", err))
    }

    /// Applies command-line overrides.
    pub fn with_overrides(mut self, args: &ChatArgs) -> Self {
        if let Some(server_url) = &args.server_url {
            self.server_url = server_url.clone();
        }
        if let Some(interval) = args.refresh_interval_ms {
            match positive(interval, "refresh_interval_ms") {
                Ok(interval) => self.refresh_interval_ms = interval,
                Err(err) => warn!(error = %err, "ignoring --refresh-interval-ms"),
            }
        }
        if let Some(max_messages) = args.max_messages {
            match positive(max_messages, "max_messages") {
                Ok(max_messages) => self.max_messages = max_messages,
                Err(err) => warn!(error = %err, "ignoring --max-messages"),
            }
        }
        if let Some(time_format) = &args.time_format {
            match valid_time_format(time_format.clone()) {
                Ok(time_format) => self.time_format = time_format,
                Err(err) => warn!(error = %err, "ignoring --time-format"),
            }
        }
        if args.no_color {
            self.use_color = false;
        }
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-user configuration directory, `~/.config/chat-terminal` on Linux.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

fn take<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_yaml::from_value(value)?)
}

fn positive<T: PartialOrd + Default>(value: T, name: &str) -> Result<T> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(Error::validation(
            "must be greater than zero",
            Some(name.to_string()),
        ))
    }
}

fn valid_time_format(format: String) -> Result<String> {
    match time::format_description::parse_borrowed::<2>(&format) {
        Ok(_) => Ok(format),
        Err(err) => Err(Error::validation(
            format!("invalid time format: {err}"),
            Some("time_format".to_string()),
        )),
    }
}
