//! Backing-store access: client bootstrap, session pool, and the
//! version-history writer.

pub mod history;
pub mod pool;


use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, ClientSession, Collection, IndexModel};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Namespace, Settings};

pub use pool::{Pool, PoolConfig, PoolStats, SessionManager, SessionProxy};

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No session can be lent without exceeding the configured cap.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// The backing store reported a failure.
    #[error(transparent)]
    Backing(#[from] mongodb::error::Error),
}

/// Creates [`ClientSession`]s from the shared driver client.
pub struct MongoSessionManager {
    client: Client,
}

#[async_trait]
impl SessionManager for MongoSessionManager {
    type Session = ClientSession;

    async fn create(&self) -> Result<ClientSession, StoreError> {
        Ok(self.client.start_session(None).await?)
    }
}

/// Shared handle to the backing store.
///
/// Cloning is cheap; all clones share the driver client and the session
/// pool.
#[derive(Clone)]
pub struct Store {
    client: Client,
    pool: Pool<MongoSessionManager>,
    version_history: Namespace,
}

fn pool_config(settings: &Settings) -> PoolConfig {
    let max_idle_time = settings.pool.max_idle_time();
    PoolConfig {
        initial_size: settings.pool.initial_size,
        max_pool_size: settings.pool.max_pool_size,
        max_connections: settings.pool.max_connections,
        max_idle_time,
        sweep_interval: (max_idle_time / 2).max(std::time::Duration::from_secs(1)),
    }
}

impl Store {
    /// Build the driver client and session pool from the settings.
    ///
    /// # Errors
    /// Returns any failure parsing the connection string or creating the
    /// initial pool sessions.
    #[must_use = "handle the result"]
    pub async fn connect(settings: &Settings) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(&settings.mongo_uri).await?;
        options.app_name = Some("docd".to_owned());
        let hosts: Vec<String> = options.hosts.iter().map(ToString::to_string).collect();
        info!("backing store host(s): {}", hosts.join(", "));
        let client = Client::with_options(options)?;
        let pool = Pool::new(
            MongoSessionManager {
                client: client.clone(),
            },
            pool_config(settings),
        )
        .await?;
        Ok(Self {
            client,
            pool,
            version_history: settings.version_history.clone(),
        })
    }

    /// The shared driver client.
    #[must_use]
    pub fn client(&self) -> &Client { &self.client }

    /// Handle to a collection in the backing store.
    #[must_use]
    pub fn collection(&self, database: &str, collection: &str) -> Collection<Document> {
        self.client.database(database).collection(collection)
    }

    /// Handle to the version-history collection.
    #[must_use]
    pub fn history_collection(&self) -> Collection<Document> {
        self.collection(
            &self.version_history.database,
            &self.version_history.collection,
        )
    }

    /// The configured version-history location.
    #[must_use]
    pub fn history_location(&self) -> &Namespace { &self.version_history }

    /// Whether `database`/`collection` name the version-history location.
    #[must_use]
    pub fn is_history(&self, database: &str, collection: &str) -> bool {
        self.version_history.matches(database, collection)
    }

    /// Borrow a session from the pool.
    ///
    /// # Errors
    /// [`StoreError::PoolExhausted`] past the cap, or any session-creation
    /// failure.
    #[must_use = "handle the result"]
    pub async fn acquire(&self) -> Result<SessionProxy<MongoSessionManager>, StoreError> {
        self.pool.acquire().await
    }

    /// Current pool counters.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats { self.pool.stats() }

    /// Create the version-history indices. Idempotent; failures are
    /// logged, not fatal, so startup proceeds against read-only stores.
    pub async fn ensure_history_indices(&self) {
        let keys = [
            doc! { "database": 1 },
            doc! { "collection": 1 },
            doc! { "action": 1 },
            doc! { "entity._id": 1 },
            doc! { "created": 1 },
        ];
        for key in keys {
            let model = IndexModel::builder().keys(key.clone()).build();
            if let Err(error) = self.history_collection().create_index(model, None).await {
                warn!("error creating history index {key}: {error}");
            }
        }
    }
}
