//! Configuration management
//!
//! Settings come from an optional JSON file, then environment variables,
//! then command line flags (applied by the CLI). Every key is optional:
//! ```json
//! {
//!   "database": "strongbox.db",
//!   "startingBalance": "100.00",
//!   "busyTimeoutMs": 5000,
//!   "maxConnections": 8,
//!   "resetTokenTtlMinutes": 30,
//!   "logFilter": "warn",
//!   "logFormat": "text"
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::AuthSettings;
use crate::domain::{parse_cents, Cents};
use crate::storage::StorageOptions;

pub const ENV_DATABASE: &str = "STRONGBOX_DATABASE";
pub const ENV_LOG: &str = "STRONGBOX_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Raw settings file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SettingsFile {
    database: Option<PathBuf>,
    starting_balance: Option<String>,
    busy_timeout_ms: Option<u64>,
    max_connections: Option<u32>,
    reset_token_ttl_minutes: Option<i64>,
    log_filter: Option<String>,
    log_format: Option<LogFormat>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database: PathBuf,
    pub starting_balance: Cents,
    pub busy_timeout: Duration,
    pub max_connections: u32,
    pub reset_token_ttl_minutes: i64,
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("strongbox.db"),
            starting_balance: 10000,
            busy_timeout: Duration::from_millis(5000),
            max_connections: 8,
            reset_token_ttl_minutes: 30,
            log_filter: "warn".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load config from an optional settings file, then apply environment overrides.
    /// A missing file means defaults; a malformed one is an error.
    pub fn load(settings_path: Option<&Path>) -> Result<Self> {
        let mut config = match settings_path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Self::from_json(&content)
                    .with_context(|| format!("Invalid settings file {}", path.display()))?
            }
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse settings JSON on top of the defaults.
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: SettingsFile = serde_json::from_str(content)?;
        let mut config = Self::default();

        if let Some(database) = raw.database {
            config.database = database;
        }
        if let Some(balance) = raw.starting_balance {
            config.starting_balance = parse_cents(&balance)
                .with_context(|| format!("Invalid startingBalance '{}'", balance))?;
            if config.starting_balance < 0 {
                bail!("startingBalance must not be negative");
            }
        }
        if let Some(ms) = raw.busy_timeout_ms {
            config.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = raw.max_connections {
            if max == 0 {
                bail!("maxConnections must be at least 1");
            }
            config.max_connections = max;
        }
        if let Some(minutes) = raw.reset_token_ttl_minutes {
            if minutes <= 0 {
                bail!("resetTokenTtlMinutes must be positive");
            }
            config.reset_token_ttl_minutes = minutes;
        }
        if let Some(filter) = raw.log_filter {
            config.log_filter = filter;
        }
        if let Some(format) = raw.log_format {
            config.log_format = format;
        }

        Ok(config)
    }

    /// Apply environment overrides through a lookup function (testable without touching the process env).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(database) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
            self.database = PathBuf::from(database);
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            self.log_filter = filter;
        }
    }

    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            busy_timeout: self.busy_timeout,
            max_connections: self.max_connections,
            ..StorageOptions::default()
        }
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            starting_balance: self.starting_balance,
            reset_token_ttl: chrono::Duration::minutes(self.reset_token_ttl_minutes),
        }
    }

    pub fn database_path(&self) -> Result<&str> {
        self.database
            .to_str()
            .context("Database path is not valid UTF-8")
    }
}
