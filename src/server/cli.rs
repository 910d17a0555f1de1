//! Command-line interface for the docd daemon.
//!
//! Flags override the corresponding keys of the layered configuration;
//! anything not given on the command line falls back to environment,
//! file, and built-in defaults.

use clap::Parser;

use crate::config::{IlpSettings, Settings};

/// Daemon command-line flags.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "docd",
    about = "Length-prefixed BSON request broker in front of MongoDB"
)]
pub struct Cli {
    /// TCP port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,
    /// MongoDB connection string.
    #[arg(short = 'm', long)]
    pub mongo_uri: Option<String>,
    /// Version-history database name.
    #[arg(long)]
    pub history_database: Option<String>,
    /// Version-history collection name.
    #[arg(long)]
    pub history_collection: Option<String>,
    /// Metrics database name.
    #[arg(long)]
    pub metrics_database: Option<String>,
    /// Metrics collection name.
    #[arg(long)]
    pub metrics_collection: Option<String>,
    /// Time-series endpoint as host:port; switches the metric sink to
    /// line protocol.
    #[arg(long)]
    pub ilp_endpoint: Option<String>,
    /// Measurement name used by the time-series sink.
    #[arg(long)]
    pub ilp_measurement: Option<String>,
    /// Worker threads; 0 means hardware parallelism.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,
    /// Log level to use [debug|info|warn|critical].
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,
    /// Log directory; logs to stdout when unset.
    #[arg(short = 'o', long)]
    pub log_dir: Option<String>,
}

impl Cli {
    /// Overlay the parsed flags onto `settings`.
    ///
    /// # Errors
    /// Returns a message when the ILP endpoint is not `host:port`.
    #[must_use = "handle the result"]
    pub fn apply(self, settings: &mut Settings) -> Result<(), String> {
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(mongo_uri) = self.mongo_uri {
            settings.mongo_uri = mongo_uri;
        }
        if let Some(database) = self.history_database {
            settings.version_history.database = database;
        }
        if let Some(collection) = self.history_collection {
            settings.version_history.collection = collection;
        }
        if let Some(database) = self.metrics_database {
            settings.metrics.database = database;
        }
        if let Some(collection) = self.metrics_collection {
            settings.metrics.collection = collection;
        }
        if let Some(endpoint) = self.ilp_endpoint {
            let (host, port) = endpoint
                .rsplit_once(':')
                .ok_or_else(|| format!("invalid time-series endpoint '{endpoint}'"))?;
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid time-series endpoint port '{port}'"))?;
            let measurement = self
                .ilp_measurement
                .or_else(|| settings.ilp.as_ref().map(|ilp| ilp.measurement.clone()))
                .unwrap_or_else(|| "request".to_owned());
            settings.ilp = Some(IlpSettings {
                host: host.to_owned(),
                port,
                measurement,
            });
        } else if let Some(measurement) = self.ilp_measurement {
            if let Some(ilp) = settings.ilp.as_mut() {
                ilp.measurement = measurement;
            }
        }
        if let Some(threads) = self.threads {
            settings.threads = threads;
        }
        if let Some(log_level) = self.log_level {
            settings.log_level = log_level;
        }
        if let Some(log_dir) = self.log_dir {
            settings.log_dir = log_dir;
        }
        Ok(())
    }
}
