//! Connection settings for the plugin.
//!
//! The host agent hands over one raw config section (plain string keys and
//! values). [`ConnectionConfig::from_section`] validates it into a local value;
//! the shared section is never modified.

mod loader;

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::error::{PluginError, Result};

pub use loader::{DEFAULT_SECTION, load_section};

/// Raw key/value pairs of one agent config section.
pub type RawSection = HashMap<String, String>;

pub const KEY_DATABASE: &str = "postgres_database";
pub const KEY_USER: &str = "postgres_user";
pub const KEY_PASSWORD: &str = "postgres_pass";
pub const KEY_PORT: &str = "postgres_port";
pub const KEY_HOST: &str = "postgres_host";
pub const KEY_SSLMODE: &str = "postgres_sslmode";
pub const KEY_CONNECT_TIMEOUT: &str = "postgres_connect_timeout";

pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// TLS negotiation mode for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    #[default]
    Disable,
    Prefer,
    Require,
}

impl SslMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disable" => Some(SslMode::Disable),
            "prefer" => Some(SslMode::Prefer),
            "require" => Some(SslMode::Require),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
        }
    }
}

/// Validated connection settings for one collection run.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub ssl_mode: SslMode,
    pub connect_timeout: Duration,
}

// Keeps the password out of logs.
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("ssl_mode", &self.ssl_mode)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ConnectionConfig {
    /// Validates a raw config section.
    ///
    /// `postgres_database`, `postgres_user` and `postgres_pass` are required and
    /// must be non-empty; they are checked in that order and the first missing
    /// one is reported. `postgres_port` falls back to 5432 when absent, empty or
    /// zero.
    pub fn from_section(section: Option<&RawSection>) -> Result<Self> {
        let Some(section) = section else {
            debug!("PostgreSQL config section missing");
            return Err(PluginError::MissingConfig(KEY_DATABASE));
        };

        let database = required(section, KEY_DATABASE)?;
        let user = required(section, KEY_USER)?;
        let password = required(section, KEY_PASSWORD)?;

        let port = match optional(section, KEY_PORT) {
            None => DEFAULT_PORT,
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(0) => DEFAULT_PORT,
                Ok(port) => port,
                Err(_) => return Err(invalid(KEY_PORT, raw)),
            },
        };

        let host = optional(section, KEY_HOST)
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let ssl_mode = match optional(section, KEY_SSLMODE) {
            None => SslMode::default(),
            Some(raw) => SslMode::parse(raw).ok_or_else(|| invalid(KEY_SSLMODE, raw))?,
        };

        let connect_timeout = match optional(section, KEY_CONNECT_TIMEOUT) {
            None => DEFAULT_CONNECT_TIMEOUT,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => DEFAULT_CONNECT_TIMEOUT,
                Ok(secs) => Duration::from_secs(secs),
                Err(_) => return Err(invalid(KEY_CONNECT_TIMEOUT, raw)),
            },
        };

        Ok(Self {
            database: database.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            port,
            host,
            ssl_mode,
            connect_timeout,
        })
    }
}

fn required<'a>(section: &'a RawSection, key: &'static str) -> Result<&'a str> {
    optional(section, key).ok_or(PluginError::MissingConfig(key))
}

/// Returns the value for `key`, treating an empty string as absent.
fn optional<'a>(section: &'a RawSection, key: &str) -> Option<&'a str> {
    section
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn invalid(key: &'static str, value: &str) -> PluginError {
    PluginError::InvalidConfig {
        key,
        value: value.to_string(),
    }
}
