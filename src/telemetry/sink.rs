//! Batch sinks for the telemetry drain worker.
//!
//! Two sinks exist, chosen once at startup: unacknowledged insert-many
//! into the metrics collection, or line protocol over a persistent TCP
//! stream to a time-series endpoint. The drain worker owns the sink
//! exclusively.

use async_trait::async_trait;
use bson::Document;
use mongodb::options::{Acknowledgment, InsertManyOptions, WriteConcern};
use mongodb::Collection;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::info;

use super::Metric;
use crate::config::{IlpSettings, Namespace};
use crate::db::Store;
use crate::ilp;

/// Failure writing a metric batch.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The metrics collection rejected the batch.
    #[error("error saving metric batch: {0}")]
    Store(#[from] mongodb::error::Error),
    /// The time-series endpoint was unreachable or closed the stream.
    #[error("error writing metric batch to time-series endpoint: {0}")]
    Endpoint(#[from] std::io::Error),
}

/// Destination for batches of metric records.
#[async_trait]
pub trait MetricSink: Send + 'static {
    /// Persist one batch; failures are logged by the worker and the
    /// batch is discarded.
    async fn publish(&mut self, batch: Vec<Metric>) -> Result<(), SinkError>;
}

/// Insert-many into the metrics collection with unacknowledged write
/// concern.
pub struct MongoSink {
    collection: Collection<Document>,
}

impl MongoSink {
    /// Sink writing to the configured metrics namespace.
    #[must_use]
    pub fn new(store: &Store, namespace: &Namespace) -> Self {
        Self {
            collection: store.collection(&namespace.database, &namespace.collection),
        }
    }
}

#[async_trait]
impl MetricSink for MongoSink {
    async fn publish(&mut self, batch: Vec<Metric>) -> Result<(), SinkError> {
        let documents: Vec<Document> = batch.iter().map(Metric::to_document).collect();
        let mut concern = WriteConcern::builder().build();
        concern.w = Some(Acknowledgment::Nodes(0));
        let mut opts = InsertManyOptions::builder().build();
        opts.write_concern = Some(concern);
        opts.ordered = Some(false);
        self.collection.insert_many(documents, Some(opts)).await?;
        Ok(())
    }
}

/// Line protocol over a persistent TCP stream.
///
/// The stream is (re)connected lazily; a failed write drops the
/// connection so the next batch reconnects.
pub struct IlpSink {
    settings: IlpSettings,
    stream: Option<TcpStream>,
}

impl IlpSink {
    /// Sink writing to the configured time-series endpoint.
    #[must_use]
    pub fn new(settings: IlpSettings) -> Self {
        Self {
            settings,
            stream: None,
        }
    }

    fn payload(&self, batch: &[Metric]) -> String {
        let mut builder = ilp::Builder::new();
        for metric in batch {
            builder = builder
                .start_record(&self.settings.measurement)
                .add_tag("action", metric.action.as_str())
                .add_tag("database", &metric.database)
                .add_tag("collection", &metric.collection);
            if let Some(application) = &metric.application {
                builder = builder.add_tag("application", application);
            }
            if let Some(correlation_id) = &metric.correlation_id {
                builder = builder.add_tag("correlationId", correlation_id);
            }
            if let Some(message) = &metric.message {
                builder = builder.add_tag("message", message);
            }
            if let Some(entity_id) = metric.entity_id {
                builder = builder.add_tag("entityId", &entity_id.to_hex());
            }
            builder = builder
                .add_i64(
                    "duration",
                    i64::try_from(metric.duration.as_nanos()).unwrap_or(i64::MAX),
                )
                .add_u64("size", metric.size)
                .timestamp(metric.timestamp.timestamp_nanos_opt().unwrap_or_default())
                .end_record();
        }
        builder.finish()
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), SinkError> {
        if self.stream.is_none() {
            let address = (self.settings.host.as_str(), self.settings.port);
            self.stream = Some(TcpStream::connect(address).await?);
            info!(
                "connected to time-series endpoint {}:{}",
                self.settings.host, self.settings.port
            );
        }
        if let Some(stream) = self.stream.as_mut() {
            if let Err(error) = stream.write_all(payload).await {
                self.stream = None;
                return Err(error.into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MetricSink for IlpSink {
    async fn publish(&mut self, batch: Vec<Metric>) -> Result<(), SinkError> {
        let payload = self.payload(&batch);
        self.send(payload.as_bytes()).await
    }
}
