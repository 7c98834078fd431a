//! pgstat - runs the PostgreSQL plugin outside the host agent.
//!
//! Reads the plugin section from the agent's INI config file, collects one
//! snapshot (or one per interval) and prints it as a JSON line on stdout.
//!
//! Usage:
//!   pgstat -c /etc/agent/config.cfg            # single run
//!   pgstat -c /etc/agent/config.cfg -i 60      # poll every minute until Ctrl-C
//!   pgstat -c agent.cfg --section postgres -v  # custom section, debug logs

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use serde_json::{Map, Value};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use pgstat_plugin::config::{DEFAULT_SECTION, load_section};
use pgstat_plugin::{MetricSnapshot, MetricsCollector};

/// PostgreSQL health metrics for a monitoring agent.
#[derive(Parser)]
#[command(name = "pgstat", about = "PostgreSQL health metrics plugin", version)]
struct Args {
    /// Agent config file (INI).
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Config section holding the postgres_* keys.
    #[arg(long, default_value = DEFAULT_SECTION)]
    section: String,

    /// Repeat collection every INTERVAL seconds until interrupted.
    #[arg(short, long, value_name = "SECS")]
    interval: Option<u64>,

    /// Pretty-print JSON output.
    #[arg(long)]
    pretty: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Log targets raised to the requested level; everything else follows RUST_LOG.
const LOG_TARGETS: &[&str] = &["pgstat", "pgstat_plugin"];

fn log_level(verbose: u8, quiet: bool) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    }
}

fn target_directive(target: &str, level: Level) -> Directive {
    format!("{}={}", target, level).parse().unwrap()
}

/// Initializes the tracing subscriber on stderr; stdout carries the JSON.
fn init_logging(verbose: u8, quiet: bool) {
    let level = log_level(verbose, quiet);
    let filter = LOG_TARGETS
        .iter()
        .fold(EnvFilter::from_default_env(), |filter, target| {
            filter.add_directive(target_directive(target, level))
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds `{"timestamp": ..., "<section>": <snapshot | false>}`.
fn report(section: &str, snapshot: Option<&MetricSnapshot>) -> Value {
    let metrics = match snapshot {
        Some(s) => serde_json::to_value(s).unwrap_or_else(|e| {
            error!("Failed to serialize snapshot: {}", e);
            Value::Bool(false)
        }),
        None => Value::Bool(false),
    };

    let mut out = Map::new();
    out.insert("timestamp".to_string(), Value::from(Utc::now().timestamp()));
    out.insert(section.to_string(), metrics);
    Value::Object(out)
}

fn print_report(value: &Value, pretty: bool) {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match rendered {
        Ok(line) => println!("{}", line),
        Err(e) => error!("Failed to serialize report: {}", e),
    }
}

/// Loads the section and performs one run. Each call re-reads the file so
/// config edits are picked up between polls.
fn run_once(args: &Args, collector: &MetricsCollector) -> Option<MetricSnapshot> {
    let section = match load_section(&args.config, &args.section) {
        Ok(section) => section,
        Err(e) => {
            error!("{}", e);
            print_report(&report(&args.section, None), args.pretty);
            return None;
        }
    };

    let snapshot = collector.run(section.as_ref());
    print_report(&report(&args.section, snapshot.as_ref()), args.pretty);
    snapshot
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    debug!(
        "pgstat {} config={} section={}",
        env!("CARGO_PKG_VERSION"),
        args.config.display(),
        args.section
    );

    let collector = MetricsCollector::new();

    let Some(interval) = args.interval else {
        let ok = run_once(&args, &collector).is_some();
        std::process::exit(if ok { 0 } else { 1 });
    };

    let interval = Duration::from_secs(interval.max(1));
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Polling every {}s", interval.as_secs());
    let mut runs: u64 = 0;
    let mut failures: u64 = 0;

    while running.load(Ordering::SeqCst) {
        runs += 1;
        if run_once(&args, &collector).is_none() {
            failures += 1;
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutdown complete after {} runs ({} failed)", runs, failures);
}
