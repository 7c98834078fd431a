//! Metric values reported to the host agent.
//!
//! A [`MetricSnapshot`] is built fresh for every collection run. Each field is
//! filled independently; `None` means the corresponding query failed (or was
//! never reached), which is an expected outcome rather than an error.

use serde::{Deserialize, Serialize};

/// A single row from `pg_locks` joined with `pg_database`.
///
/// Source: `SELECT granted, mode, datname FROM pg_locks ...`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct LockInfo {
    /// Source: `pg_locks.granted`
    pub granted: bool,

    /// Lock mode, e.g. `AccessShareLock`.
    /// Source: `pg_locks.mode`
    pub mode: String,

    /// Source: `pg_database.datname`
    pub database: String,
}

/// A log-related server setting from `pg_settings`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct LogSetting {
    pub name: String,

    /// Raw setting text. Empty settings are reported as `"?"`.
    pub value: String,
}

impl LogSetting {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Result of one collection run.
///
/// Always serializes with exactly five keys; unset fields become `null`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    /// Server version, e.g. `"9.3.1"`.
    pub version: Option<String>,

    /// Source: `pg_settings.setting` for `max_connections`.
    pub max_connections: Option<i64>,

    /// Number of backends attached to any database.
    pub current_connections: Option<i64>,

    /// Locks in the order the server returned them.
    pub locks: Option<Vec<LockInfo>>,

    /// Log destination settings, sorted by name.
    pub log_settings: Option<Vec<LogSetting>>,
}

impl MetricSnapshot {
    /// Returns true if every query produced a value.
    pub fn is_complete(&self) -> bool {
        self.version.is_some()
            && self.max_connections.is_some()
            && self.current_connections.is_some()
            && self.locks.is_some()
            && self.log_settings.is_some()
    }

    /// Number of fields that were left unset.
    pub fn missing_count(&self) -> usize {
        [
            self.version.is_none(),
            self.max_connections.is_none(),
            self.current_connections.is_none(),
            self.locks.is_none(),
            self.log_settings.is_none(),
        ]
        .iter()
        .filter(|missing| **missing)
        .count()
    }
}
