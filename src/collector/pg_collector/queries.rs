//! SQL for the diagnostic queries.

pub(super) const VERSION_QUERY: &str = "SELECT VERSION()";

/// `pg_settings.setting` is text; parsed by the caller.
pub(super) const MAX_CONNECTIONS_QUERY: &str =
    "SELECT setting AS mc FROM pg_settings WHERE name = 'max_connections'";

pub(super) const CURRENT_CONNECTIONS_QUERY: &str = "SELECT COUNT(datid) FROM pg_database AS d \
     LEFT JOIN pg_stat_activity AS s ON (s.datid = d.oid)";

pub(super) const LOCKS_QUERY: &str = "SELECT granted, mode, datname FROM pg_locks AS l \
     JOIN pg_database d ON (d.oid = l.database)";

/// `redirect_stderr` and `syslog_facility` are reported as raw text.
pub(super) const LOG_SETTINGS_QUERY: &str = "SELECT name, \
     CASE WHEN length(setting)<1 THEN '?' ELSE setting END AS s \
     FROM pg_settings \
     WHERE name IN ('log_destination','log_directory','log_filename','redirect_stderr','syslog_facility') \
     ORDER BY name";
