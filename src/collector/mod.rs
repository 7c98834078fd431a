//! PostgreSQL health metrics collector.
//!
//! One run validates the plugin config section, opens a single connection,
//! executes five independent diagnostic queries and returns a
//! [`MetricSnapshot`]:
//! - `VERSION()` - server version
//! - `pg_settings` - `max_connections`
//! - `pg_database` / `pg_stat_activity` - current connection count
//! - `pg_locks` / `pg_database` - lock list
//! - `pg_settings` - log destination settings
//!
//! A failing query leaves its field unset and collection moves on. Only a bad
//! config or a failed connection aborts the run.

pub mod mock;
mod pg_collector;

use tracing::{debug, error, info};

use crate::config::{ConnectionConfig, RawSection};
use crate::error::{PluginError, Result};
use crate::model::{LockInfo, LogSetting, MetricSnapshot};

pub use pg_collector::{PgConnector, PgSource, format_postgres_error};

/// Purpose labels attached to query errors and log records.
pub mod purpose {
    pub const VERSION: &str = "version";
    pub const MAX_CONNECTIONS: &str = "max connections";
    pub const CURRENT_CONNECTIONS: &str = "current connections";
    pub const LOCKS: &str = "locks";
    pub const LOG_SETTINGS: &str = "log file settings";
}

/// Value reported for a log setting with an empty value.
pub const EMPTY_SETTING_PLACEHOLDER: &str = "?";

/// An open connection able to answer the diagnostic queries.
pub trait StatsSource {
    /// Raw `SELECT VERSION()` string.
    fn server_version(&mut self) -> Result<String>;

    fn max_connections(&mut self) -> Result<i64>;

    fn current_connections(&mut self) -> Result<i64>;

    /// Lock rows in server order.
    fn locks(&mut self) -> Result<Vec<LockInfo>>;

    fn log_settings(&mut self) -> Result<Vec<LogSetting>>;

    /// Closes the connection. Called once at the end of every run.
    fn release(self)
    where
        Self: Sized,
    {
    }
}

/// Opens a [`StatsSource`] for validated connection settings.
pub trait Connector {
    type Source: StatsSource;

    fn connect(&self, config: &ConnectionConfig) -> Result<Self::Source>;
}

/// Runs the fixed battery of diagnostic queries.
///
/// Holds no state between runs; each [`run`](Self::run) owns its own
/// connection and snapshot.
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector<C = PgConnector> {
    connector: C,
}

impl MetricsCollector<PgConnector> {
    /// Creates a collector backed by a real PostgreSQL connection.
    pub fn new() -> Self {
        Self {
            connector: PgConnector,
        }
    }
}

impl<C: Connector> MetricsCollector<C> {
    pub fn with_connector(connector: C) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Validates a raw config section. See [`ConnectionConfig::from_section`].
    pub fn validate(&self, section: Option<&RawSection>) -> Result<ConnectionConfig> {
        ConnectionConfig::from_section(section)
    }

    /// Opens one connection. No retry.
    pub fn connect(&self, config: &ConnectionConfig) -> Result<C::Source> {
        self.connector.connect(config)
    }

    /// Executes all five queries against `source`.
    ///
    /// Never fails: each query error is logged and leaves its field `None`.
    pub fn collect<S: StatsSource>(&self, source: &mut S) -> MetricSnapshot {
        let mut snapshot = MetricSnapshot::default();

        snapshot.version = settle(purpose::VERSION, source.server_version()).and_then(|raw| {
            let version = parse_version(&raw);
            if version.is_none() {
                debug!(raw = %raw, "unexpected VERSION() output");
            }
            version
        });

        snapshot.max_connections = settle(purpose::MAX_CONNECTIONS, source.max_connections());

        snapshot.current_connections =
            settle(purpose::CURRENT_CONNECTIONS, source.current_connections());

        snapshot.locks = settle(purpose::LOCKS, source.locks());

        snapshot.log_settings =
            settle(purpose::LOG_SETTINGS, source.log_settings()).map(normalize_log_settings);

        snapshot
    }

    /// Validates, connects and collects, reporting why a run was aborted.
    ///
    /// The connection is released before returning. Validation failures never
    /// reach the connector.
    pub fn try_run(&self, section: Option<&RawSection>) -> Result<MetricSnapshot> {
        let config = self.validate(section)?;

        let mut source = self.connect(&config)?;
        debug!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            sslmode = config.ssl_mode.as_str(),
            "connected to PostgreSQL"
        );

        let snapshot = self.collect(&mut source);
        source.release();

        if snapshot.is_complete() {
            debug!("collected all PostgreSQL metrics");
        } else {
            info!(
                missing = snapshot.missing_count(),
                "PostgreSQL metrics collected partially"
            );
        }

        Ok(snapshot)
    }

    /// Same as [`try_run`](Self::try_run) but reports an aborted run as `None`
    /// after logging the cause.
    pub fn run(&self, section: Option<&RawSection>) -> Option<MetricSnapshot> {
        match self.try_run(section) {
            Ok(snapshot) => Some(snapshot),
            Err(e @ (PluginError::MissingConfig(_) | PluginError::InvalidConfig { .. })) => {
                debug!(error = %e, "PostgreSQL plugin not run");
                None
            }
            Err(e) => {
                error!(error = %e, "PostgreSQL plugin run aborted");
                None
            }
        }
    }
}

fn settle<T>(query: &'static str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!(query, error = %e, "metric query failed");
            None
        }
    }
}

/// Extracts the version number from `SELECT VERSION()` output.
///
/// `"PostgreSQL 9.3.1 on x86_64-unknown-linux-gnu, ..."` yields `"9.3.1"`.
pub fn parse_version(raw: &str) -> Option<String> {
    raw.split_whitespace().nth(1).map(str::to_string)
}

/// Replaces empty values with `"?"` and orders rows by setting name.
fn normalize_log_settings(mut settings: Vec<LogSetting>) -> Vec<LogSetting> {
    for setting in &mut settings {
        if setting.value.is_empty() {
            setting.value = EMPTY_SETTING_PLACEHOLDER.to_string();
        }
    }
    settings.sort_by(|a, b| a.name.cmp(&b.name));
    settings
}

#[cfg(test)]
mod tests {
    use super::mock::{MockConnector, MockSource};
    use super::*;
    use crate::config::{KEY_DATABASE, KEY_PASSWORD, KEY_PORT, KEY_USER};

    fn section(pairs: &[(&str, &str)]) -> RawSection {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn valid_section() -> RawSection {
        section(&[(KEY_DATABASE, "x"), (KEY_USER, "y"), (KEY_PASSWORD, "z")])
    }

    #[test]
    fn parse_version_takes_second_token() {
        assert_eq!(
            parse_version("PostgreSQL 9.3.1 on x86_64-unknown-linux-gnu, compiled by gcc"),
            Some("9.3.1".to_string())
        );
        assert_eq!(
            parse_version("PostgreSQL  16.2   (Debian 16.2-1.pgdg120+2)"),
            Some("16.2".to_string())
        );
    }

    #[test]
    fn parse_version_rejects_single_token() {
        assert_eq!(parse_version("PostgreSQL"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn collect_populates_every_field() {
        let collector = MetricsCollector::with_connector(MockConnector::healthy());
        let mut source = MockSource::healthy();

        let snapshot = collector.collect(&mut source);

        assert_eq!(snapshot.version.as_deref(), Some("9.3.1"));
        assert_eq!(snapshot.max_connections, Some(100));
        assert_eq!(snapshot.current_connections, Some(3));
        assert_eq!(snapshot.locks.as_ref().map(Vec::len), Some(2));
        assert_eq!(snapshot.log_settings.as_ref().map(Vec::len), Some(5));
        assert!(snapshot.is_complete());
    }

    #[test]
    fn max_connections_failure_does_not_stop_collection() {
        let collector = MetricsCollector::with_connector(MockConnector::healthy());
        let mut source = MockSource::healthy();
        source.max_connections = Err(MockSource::query_error(purpose::MAX_CONNECTIONS));

        let snapshot = collector.collect(&mut source);

        assert_eq!(snapshot.max_connections, None);
        assert_eq!(snapshot.version.as_deref(), Some("9.3.1"));
        assert_eq!(snapshot.current_connections, Some(3));
        assert!(snapshot.locks.is_some());
        assert!(snapshot.log_settings.is_some());
        assert_eq!(snapshot.missing_count(), 1);
    }

    #[test]
    fn every_query_failing_still_yields_snapshot() {
        let collector = MetricsCollector::with_connector(MockConnector::with_source(
            MockSource::failing(),
        ));

        let snapshot = collector.run(Some(&valid_section())).unwrap();
        assert_eq!(snapshot, MetricSnapshot::default());
    }

    #[test]
    fn unexpected_version_shape_leaves_version_unset() {
        let collector = MetricsCollector::with_connector(MockConnector::healthy());
        let mut source = MockSource::healthy();
        source.version = Ok("PostgreSQL".to_string());

        let snapshot = collector.collect(&mut source);
        assert_eq!(snapshot.version, None);
        assert_eq!(snapshot.max_connections, Some(100));
    }

    #[test]
    fn locks_keep_server_order() {
        let collector = MetricsCollector::with_connector(MockConnector::healthy());
        let mut source = MockSource::healthy();
        source.locks = Ok(vec![
            LockInfo {
                granted: false,
                mode: "ExclusiveLock".to_string(),
                database: "zeta".to_string(),
            },
            LockInfo {
                granted: true,
                mode: "AccessShareLock".to_string(),
                database: "alpha".to_string(),
            },
        ]);

        let locks = collector.collect(&mut source).locks.unwrap();
        assert_eq!(locks[0].database, "zeta");
        assert!(!locks[0].granted);
        assert_eq!(locks[1].database, "alpha");
    }

    #[test]
    fn empty_lock_list_is_not_a_failure() {
        let collector = MetricsCollector::with_connector(MockConnector::healthy());
        let mut source = MockSource::healthy();
        source.locks = Ok(Vec::new());

        assert_eq!(collector.collect(&mut source).locks, Some(Vec::new()));
    }

    #[test]
    fn log_settings_sorted_and_empty_values_replaced() {
        let collector = MetricsCollector::with_connector(MockConnector::healthy());
        let mut source = MockSource::healthy();
        source.log_settings = Ok(vec![
            LogSetting::new("syslog_facility", "local0"),
            LogSetting::new("log_filename", ""),
            LogSetting::new("log_destination", "stderr"),
        ]);

        let settings = collector.collect(&mut source).log_settings.unwrap();
        let names: Vec<&str> = settings.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["log_destination", "log_filename", "syslog_facility"]);
        assert_eq!(settings[1].value, "?");
        assert_eq!(settings[2].value, "local0");
    }

    #[test]
    fn run_with_missing_required_key_never_connects() {
        for key in [KEY_DATABASE, KEY_USER, KEY_PASSWORD] {
            let connector = MockConnector::healthy();
            let collector = MetricsCollector::with_connector(connector);
            let mut raw = valid_section();
            raw.remove(key);

            assert_eq!(collector.run(Some(&raw)), None);
            assert_eq!(
                collector.try_run(Some(&raw)),
                Err(PluginError::MissingConfig(key))
            );
            assert_eq!(collector.connector().attempts(), 0);
        }
    }

    #[test]
    fn run_without_section_never_connects() {
        let collector = MetricsCollector::with_connector(MockConnector::healthy());
        assert_eq!(collector.run(None), None);
        assert_eq!(collector.connector().attempts(), 0);
    }

    #[test]
    fn run_uses_default_port() {
        for port in [None, Some(""), Some("0")] {
            let collector = MetricsCollector::with_connector(MockConnector::healthy());
            let mut raw = valid_section();
            if let Some(port) = port {
                raw.insert(KEY_PORT.to_string(), port.to_string());
            }

            collector.run(Some(&raw)).unwrap();
            assert_eq!(collector.connector().last_port(), Some(5432));
        }
    }

    #[test]
    fn run_returns_none_when_connection_fails() {
        let collector = MetricsCollector::with_connector(MockConnector::refusing());

        assert_eq!(collector.run(Some(&valid_section())), None);
        assert_eq!(collector.connector().attempts(), 1);
        assert!(matches!(
            collector.try_run(Some(&valid_section())),
            Err(PluginError::Connection(_))
        ));
    }

    #[test]
    fn run_returns_none_when_client_unavailable() {
        let collector = MetricsCollector::with_connector(MockConnector::failing_with(
            PluginError::DependencyUnavailable("no TLS backend".to_string()),
        ));
        assert_eq!(collector.run(Some(&valid_section())), None);
    }

    #[test]
    fn run_releases_connection() {
        let source = MockSource::healthy();
        let released = source.released_flag();
        let collector = MetricsCollector::with_connector(MockConnector::with_source(source));

        let snapshot = collector.run(Some(&valid_section())).unwrap();
        assert!(snapshot.is_complete());
        assert!(released.get());
    }

    #[test]
    fn runs_are_independent() {
        let collector = MetricsCollector::with_connector(MockConnector::healthy());
        let first = collector.run(Some(&valid_section())).unwrap();
        let second = collector.run(Some(&valid_section())).unwrap();

        assert_eq!(first, second);
        assert_eq!(collector.connector().attempts(), 2);
    }
}
