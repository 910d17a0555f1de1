//! Layered runtime configuration.
//!
//! Settings are resolved from, in increasing precedence: built-in
//! defaults, an optional `docd.toml` in the working directory, environment
//! variables with the `DOCD_` prefix (nested keys separated by `__`, e.g.
//! `DOCD_POOL__MAX_CONNECTIONS`), and finally command-line flags. The
//! resolved [`Settings`] value is immutable for the lifetime of the
//! process.

use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// A database/collection pair in the backing store.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Namespace {
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
}

impl Namespace {
    /// True when `database`/`collection` name this namespace.
    #[must_use]
    pub fn matches(&self, database: &str, collection: &str) -> bool {
        self.database == database && self.collection == collection
    }
}

/// Session pool sizing and lifetime controls.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PoolSettings {
    /// Sessions created eagerly at startup.
    pub initial_size: usize,
    /// Cap on idle sessions retained for reuse.
    pub max_pool_size: usize,
    /// Hard cap on outstanding plus idle sessions.
    pub max_connections: usize,
    /// Seconds an idle session survives before the sweep closes it.
    pub max_idle_time: u64,
}

impl PoolSettings {
    /// Idle lifetime as a [`Duration`].
    #[must_use]
    pub fn max_idle_time(&self) -> Duration { Duration::from_secs(self.max_idle_time) }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            initial_size: 1,
            max_pool_size: 10,
            max_connections: 100,
            max_idle_time: 300,
        }
    }
}

/// Metric batching controls and the Mongo metrics namespace.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetricsSettings {
    /// Database holding the metrics collection.
    pub database: String,
    /// Collection receiving metric documents.
    pub collection: String,
    /// Records accumulated before a batch is written.
    pub batch_size: usize,
    /// Seconds after which a partial batch is flushed anyway.
    pub flush_interval: u64,
    /// Capacity of the capture queue; saturation drops records.
    pub queue_size: usize,
}

impl MetricsSettings {
    /// Flush interval as a [`Duration`].
    #[must_use]
    pub fn flush_interval(&self) -> Duration { Duration::from_secs(self.flush_interval) }

    /// The metrics namespace in the backing store.
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        Namespace {
            database: self.database.clone(),
            collection: self.collection.clone(),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            database: "versionHistory".to_owned(),
            collection: "metrics".to_owned(),
            batch_size: 100,
            flush_interval: 10,
            queue_size: 4096,
        }
    }
}

/// Optional time-series (ILP) telemetry endpoint.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct IlpSettings {
    /// Endpoint host name.
    pub host: String,
    /// Endpoint TCP port.
    pub port: u16,
    /// Measurement (series) name records are written under.
    pub measurement: String,
}

/// Resolved daemon configuration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    /// TCP port the broker listens on.
    pub port: u16,
    /// MongoDB connection string.
    pub mongo_uri: String,
    /// Version-history namespace; writes here via the user-facing path
    /// are rejected.
    pub version_history: Namespace,
    /// Metric batching and persistence.
    pub metrics: MetricsSettings,
    /// Optional ILP endpoint. When set, metrics go to the time-series
    /// store instead of the metrics collection.
    pub ilp: Option<IlpSettings>,
    /// Session pool sizing.
    pub pool: PoolSettings,
    /// Worker threads for the runtime; zero means hardware parallelism.
    pub threads: usize,
    /// Log level: debug, info, warn, or critical.
    pub log_level: String,
    /// Log directory; empty logs to stdout.
    pub log_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 2000,
            mongo_uri: "mongodb://localhost:27017".to_owned(),
            version_history: Namespace {
                database: "versionHistory".to_owned(),
                collection: "entities".to_owned(),
            },
            metrics: MetricsSettings::default(),
            ilp: None,
            pool: PoolSettings::default(),
            threads: 0,
            log_level: "info".to_owned(),
            log_dir: String::new(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, `docd.toml`, and `DOCD_` environment
    /// variables.
    ///
    /// # Errors
    /// Returns any extraction failure reported by the underlying figment.
    #[must_use = "handle the result"]
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("docd.toml"))
            .merge(Env::prefixed("DOCD_").split("__"))
            .extract()
    }

    /// Worker thread count with the hardware-parallelism fallback applied.
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            self.threads
        }
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn defaults_match_deployment() {
        let settings = Settings::default();
        assert_eq!(settings.port, 2000);
        assert_eq!(settings.version_history.database, "versionHistory");
        assert_eq!(settings.version_history.collection, "entities");
        assert_eq!(settings.metrics.collection, "metrics");
        assert!(settings.ilp.is_none());
    }

    #[rstest]
    fn env_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("DOCD_PORT", "2020");
            jail.set_env("DOCD_MONGO_URI", "mongodb://db:27017");
            jail.set_env("DOCD_POOL__MAX_CONNECTIONS", "7");
            let settings = Settings::load().expect("load");
            assert_eq!(settings.port, 2020);
            assert_eq!(settings.mongo_uri, "mongodb://db:27017");
            assert_eq!(settings.pool.max_connections, 7);
            Ok(())
        });
    }

    #[rstest]
    fn toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "docd.toml",
                r#"
                    port = 2345
                    [version_history]
                    database = "audit"
                    collection = "versions"
                "#,
            )?;
            let settings = Settings::load().expect("load");
            assert_eq!(settings.port, 2345);
            assert_eq!(settings.version_history.database, "audit");
            Ok(())
        });
    }

    #[rstest]
    fn env_overrides_toml() {
        Jail::expect_with(|jail| {
            jail.create_file("docd.toml", "port = 2345")?;
            jail.set_env("DOCD_PORT", "2999");
            let settings = Settings::load().expect("load");
            assert_eq!(settings.port, 2999);
            Ok(())
        });
    }

    #[rstest]
    fn ilp_endpoint_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("DOCD_ILP__HOST", "tsdb.local");
            jail.set_env("DOCD_ILP__PORT", "9009");
            jail.set_env("DOCD_ILP__MEASUREMENT", "request");
            let settings = Settings::load().expect("load");
            let ilp = settings.ilp.expect("ilp endpoint");
            assert_eq!(ilp.host, "tsdb.local");
            assert_eq!(ilp.port, 9009);
            assert_eq!(ilp.measurement, "request");
            Ok(())
        });
    }

    #[rstest]
    fn namespace_match_is_exact() {
        let ns = Namespace {
            database: "versionHistory".to_owned(),
            collection: "entities".to_owned(),
        };
        assert!(ns.matches("versionHistory", "entities"));
        assert!(!ns.matches("versionHistory", "metrics"));
        assert!(!ns.matches("itest", "entities"));
    }
}
