//! Error type shared by config validation, connection setup and collection.

/// Error type for a plugin run.
///
/// Only `Query` is recovered locally (the affected metric stays unset).
/// Every other variant aborts the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// Required config key missing or empty.
    MissingConfig(&'static str),
    /// Config key present but not usable.
    InvalidConfig { key: &'static str, value: String },
    /// Agent config file could not be loaded.
    Config(String),
    /// Connection or authentication failed.
    Connection(String),
    /// A single diagnostic query failed.
    Query { query: &'static str, message: String },
    /// The database client could not be set up in this environment.
    DependencyUnavailable(String),
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginError::MissingConfig(key) => {
                write!(f, "config not complete (missing: {})", key)
            }
            PluginError::InvalidConfig { key, value } => {
                write!(f, "invalid value for {}: {:?}", key, value)
            }
            PluginError::Config(msg) => write!(f, "config error: {}", msg),
            PluginError::Connection(msg) => write!(f, "PostgreSQL connection error: {}", msg),
            PluginError::Query { query, message } => {
                write!(f, "SQL query error when getting {}: {}", query, message)
            }
            PluginError::DependencyUnavailable(msg) => {
                write!(f, "database client unavailable: {}", msg)
            }
        }
    }
}

impl std::error::Error for PluginError {}

pub type Result<T> = std::result::Result<T, PluginError>;
