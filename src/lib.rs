//! pgstat-plugin - PostgreSQL health metrics for a host monitoring agent.
//!
//! Each run reads the plugin's config section, opens one connection and
//! reports server version, connection limits and usage, current locks and
//! log destination settings as a [`MetricSnapshot`].
//!
//! - `pgstat` - command-line runner printing snapshots as JSON

pub mod collector;
pub mod config;
pub mod error;
pub mod model;

pub use collector::{Connector, MetricsCollector, PgConnector, StatsSource};
pub use config::{ConnectionConfig, RawSection};
pub use error::PluginError;
pub use model::{LockInfo, LogSetting, MetricSnapshot};
