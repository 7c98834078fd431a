//! PostgreSQL-backed implementation of the collector seams.
//!
//! `PgConnector` opens a blocking `postgres::Client` from a validated
//! [`ConnectionConfig`]; `PgSource` runs the diagnostic queries on it.

mod queries;

use postgres::{Client, NoTls, Row};
use postgres_native_tls::MakeTlsConnector;
use tracing::debug;

use super::{Connector, StatsSource, purpose};
use crate::config::{ConnectionConfig, SslMode};
use crate::error::{PluginError, Result};
use crate::model::{LockInfo, LogSetting};
use queries::{
    CURRENT_CONNECTIONS_QUERY, LOCKS_QUERY, LOG_SETTINGS_QUERY, MAX_CONNECTIONS_QUERY,
    VERSION_QUERY,
};

/// Reported as `application_name` in `pg_stat_activity`.
pub const APPLICATION_NAME: &str = "pgstat-plugin";

/// Opens plain or TLS connections depending on [`SslMode`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PgConnector;

impl Connector for PgConnector {
    type Source = PgSource;

    fn connect(&self, config: &ConnectionConfig) -> Result<PgSource> {
        let pg_config = build_pg_config(config);

        let connected = match config.ssl_mode {
            SslMode::Disable => pg_config.connect(NoTls),
            SslMode::Prefer | SslMode::Require => {
                let tls = native_tls::TlsConnector::builder()
                    .build()
                    .map_err(|e| PluginError::DependencyUnavailable(e.to_string()))?;
                pg_config.connect(MakeTlsConnector::new(tls))
            }
        };

        let client = connected.map_err(|e| PluginError::Connection(format_postgres_error(&e)))?;
        Ok(PgSource { client })
    }
}

fn build_pg_config(config: &ConnectionConfig) -> postgres::Config {
    let ssl_mode = match config.ssl_mode {
        SslMode::Disable => postgres::config::SslMode::Disable,
        SslMode::Prefer => postgres::config::SslMode::Prefer,
        SslMode::Require => postgres::config::SslMode::Require,
    };

    let mut pg_config = postgres::Config::new();
    pg_config
        .host(config.host.as_str())
        .port(config.port)
        .user(config.user.as_str())
        .password(config.password.as_str())
        .dbname(config.database.as_str())
        .application_name(APPLICATION_NAME)
        .connect_timeout(config.connect_timeout)
        .ssl_mode(ssl_mode);
    pg_config
}

/// An open connection used for one collection run.
pub struct PgSource {
    client: Client,
}

impl PgSource {
    fn query_one(&mut self, query: &'static str, sql: &str) -> Result<Row> {
        self.client
            .query_one(sql, &[])
            .map_err(|e| query_error(query, &e))
    }

    fn query(&mut self, query: &'static str, sql: &str) -> Result<Vec<Row>> {
        self.client
            .query(sql, &[])
            .map_err(|e| query_error(query, &e))
    }
}

impl StatsSource for PgSource {
    fn server_version(&mut self) -> Result<String> {
        let row = self.query_one(purpose::VERSION, VERSION_QUERY)?;
        row.try_get(0).map_err(|e| query_error(purpose::VERSION, &e))
    }

    fn max_connections(&mut self) -> Result<i64> {
        let row = self.query_one(purpose::MAX_CONNECTIONS, MAX_CONNECTIONS_QUERY)?;
        let setting: String = row
            .try_get(0)
            .map_err(|e| query_error(purpose::MAX_CONNECTIONS, &e))?;
        parse_setting_int(&setting).ok_or_else(|| PluginError::Query {
            query: purpose::MAX_CONNECTIONS,
            message: format!("unexpected setting value {:?}", setting),
        })
    }

    fn current_connections(&mut self) -> Result<i64> {
        let row = self.query_one(purpose::CURRENT_CONNECTIONS, CURRENT_CONNECTIONS_QUERY)?;
        row.try_get(0)
            .map_err(|e| query_error(purpose::CURRENT_CONNECTIONS, &e))
    }

    fn locks(&mut self) -> Result<Vec<LockInfo>> {
        let rows = self.query(purpose::LOCKS, LOCKS_QUERY)?;
        rows.iter()
            .map(parse_lock_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| query_error(purpose::LOCKS, &e))
    }

    fn log_settings(&mut self) -> Result<Vec<LogSetting>> {
        let rows = self.query(purpose::LOG_SETTINGS, LOG_SETTINGS_QUERY)?;
        rows.iter()
            .map(parse_log_setting_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| query_error(purpose::LOG_SETTINGS, &e))
    }

    fn release(self) {
        if let Err(e) = self.client.close() {
            debug!(error = %format_postgres_error(&e), "error while closing connection");
        }
    }
}

fn parse_lock_row(row: &Row) -> std::result::Result<LockInfo, postgres::Error> {
    Ok(LockInfo {
        granted: row.try_get(0)?,
        mode: row.try_get(1)?,
        database: row.try_get(2)?,
    })
}

fn parse_log_setting_row(row: &Row) -> std::result::Result<LogSetting, postgres::Error> {
    Ok(LogSetting {
        name: row.try_get(0)?,
        value: row.try_get(1)?,
    })
}

fn parse_setting_int(setting: &str) -> Option<i64> {
    setting.trim().parse().ok()
}

fn query_error(query: &'static str, e: &postgres::Error) -> PluginError {
    PluginError::Query {
        query,
        message: format_postgres_error(e),
    }
}

/// Client-side failures worth a short summary instead of the full error chain.
const KNOWN_CLIENT_FAILURES: &[(&str, &str)] = &[
    ("Connection refused", "connection refused"),
    ("password authentication failed", "password authentication failed"),
    ("timed out", "connection timed out"),
    ("No such file or directory", "server socket not found"),
];

/// Condenses a `postgres::Error` into one line for logs and query errors.
///
/// Server errors keep severity, SQLSTATE and message.
pub fn format_postgres_error(e: &postgres::Error) -> String {
    match e.as_db_error() {
        Some(db_error) => format!(
            "{} [{}]: {}",
            db_error.severity(),
            db_error.code().code(),
            db_error.message()
        ),
        None => summarize_client_error(&e.to_string()),
    }
}

fn summarize_client_error(msg: &str) -> String {
    if let Some((_, summary)) = KNOWN_CLIENT_FAILURES
        .iter()
        .find(|(needle, _)| msg.contains(needle))
    {
        return summary.to_string();
    }
    match msg.rsplit_once("FATAL:") {
        Some((_, detail)) => detail.trim().to_string(),
        None => msg.to_string(),
    }
}
