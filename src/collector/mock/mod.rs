//! In-memory stand-ins for a PostgreSQL connection.
//!
//! `MockSource` answers the diagnostic queries from canned results and
//! `MockConnector` hands it out while recording how it was called. Used to
//! exercise the collector without a running server.

use std::cell::Cell;
use std::rc::Rc;

use super::{Connector, StatsSource, purpose};
use crate::config::ConnectionConfig;
use crate::error::{PluginError, Result};
use crate::model::{LockInfo, LogSetting};

/// Version string as reported by a 9.3 server.
pub const SAMPLE_VERSION: &str =
    "PostgreSQL 9.3.1 on x86_64-unknown-linux-gnu, compiled by gcc (GCC) 4.8.1, 64-bit";

/// Canned query results.
#[derive(Debug, Clone)]
pub struct MockSource {
    pub version: Result<String>,
    pub max_connections: Result<i64>,
    pub current_connections: Result<i64>,
    pub locks: Result<Vec<LockInfo>>,
    pub log_settings: Result<Vec<LogSetting>>,
    released: Rc<Cell<bool>>,
}

impl MockSource {
    /// A server that answers every query.
    pub fn healthy() -> Self {
        Self {
            version: Ok(SAMPLE_VERSION.to_string()),
            max_connections: Ok(100),
            current_connections: Ok(3),
            locks: Ok(vec![
                LockInfo {
                    granted: true,
                    mode: "AccessShareLock".to_string(),
                    database: "app".to_string(),
                },
                LockInfo {
                    granted: false,
                    mode: "RowExclusiveLock".to_string(),
                    database: "app".to_string(),
                },
            ]),
            log_settings: Ok(vec![
                LogSetting::new("log_destination", "stderr"),
                LogSetting::new("log_directory", "pg_log"),
                LogSetting::new("log_filename", "postgresql-%a.log"),
                LogSetting::new("redirect_stderr", "on"),
                LogSetting::new("syslog_facility", "LOCAL0"),
            ]),
            released: Rc::new(Cell::new(false)),
        }
    }

    /// A server on which every query fails.
    pub fn failing() -> Self {
        Self {
            version: Err(Self::query_error(purpose::VERSION)),
            max_connections: Err(Self::query_error(purpose::MAX_CONNECTIONS)),
            current_connections: Err(Self::query_error(purpose::CURRENT_CONNECTIONS)),
            locks: Err(Self::query_error(purpose::LOCKS)),
            log_settings: Err(Self::query_error(purpose::LOG_SETTINGS)),
            released: Rc::new(Cell::new(false)),
        }
    }

    pub fn query_error(query: &'static str) -> PluginError {
        PluginError::Query {
            query,
            message: "ERROR: permission denied".to_string(),
        }
    }

    /// Shared flag set once the source has been released.
    pub fn released_flag(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.released)
    }
}

impl StatsSource for MockSource {
    fn server_version(&mut self) -> Result<String> {
        self.version.clone()
    }

    fn max_connections(&mut self) -> Result<i64> {
        self.max_connections.clone()
    }

    fn current_connections(&mut self) -> Result<i64> {
        self.current_connections.clone()
    }

    fn locks(&mut self) -> Result<Vec<LockInfo>> {
        self.locks.clone()
    }

    fn log_settings(&mut self) -> Result<Vec<LogSetting>> {
        self.log_settings.clone()
    }

    fn release(self) {
        self.released.set(true);
    }
}

/// Connector returning a fixed outcome for every attempt.
#[derive(Debug)]
pub struct MockConnector {
    outcome: std::result::Result<MockSource, PluginError>,
    attempts: Cell<usize>,
    last_port: Cell<Option<u16>>,
}

impl MockConnector {
    pub fn healthy() -> Self {
        Self::with_source(MockSource::healthy())
    }

    pub fn with_source(source: MockSource) -> Self {
        Self {
            outcome: Ok(source),
            attempts: Cell::new(0),
            last_port: Cell::new(None),
        }
    }

    /// Simulates an unreachable server.
    pub fn refusing() -> Self {
        Self::failing_with(PluginError::Connection("connection refused".to_string()))
    }

    pub fn failing_with(error: PluginError) -> Self {
        Self {
            outcome: Err(error),
            attempts: Cell::new(0),
            last_port: Cell::new(None),
        }
    }

    /// Number of `connect` calls so far.
    pub fn attempts(&self) -> usize {
        self.attempts.get()
    }

    /// Port of the most recent `connect` call.
    pub fn last_port(&self) -> Option<u16> {
        self.last_port.get()
    }
}

impl Connector for MockConnector {
    type Source = MockSource;

    fn connect(&self, config: &ConnectionConfig) -> Result<MockSource> {
        self.attempts.set(self.attempts.get() + 1);
        self.last_port.set(Some(config.port));
        self.outcome.clone()
    }
}
