//! Per-request telemetry pipeline.
//!
//! Handlers produce one [`Metric`] per request (unless suppressed by
//! `skipMetric`). Capture goes through a bounded queue whose producer
//! side never blocks; a single drain worker batches records and writes
//! them to the configured sink. On saturation records are dropped and
//! counted rather than applying back-pressure to request handling.

pub mod sink;
pub(crate) mod worker;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bson::{doc, oid::ObjectId, Bson, Document};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::MetricsSettings;
use crate::protocol::{Action, Request};

pub use sink::{IlpSink, MetricSink, MongoSink, SinkError};

/// One telemetry record describing a handled request.
#[derive(Clone, Debug)]
pub struct Metric {
    /// Record id in the metrics collection.
    pub id: ObjectId,
    /// The handled action.
    pub action: Action,
    /// Target database.
    pub database: String,
    /// Target collection.
    pub collection: String,
    /// Calling application, when supplied.
    pub application: Option<String>,
    /// Correlation id, when supplied.
    pub correlation_id: Option<String>,
    /// Outcome note; carries the error message for failed requests.
    pub message: Option<String>,
    /// Id of the affected document, when the payload named one.
    pub entity_id: Option<ObjectId>,
    /// Capture instant.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock handler duration.
    pub duration: Duration,
    /// Request frame size in bytes.
    pub size: u64,
}

impl Metric {
    /// Build the metric for a dispatched request.
    #[must_use]
    pub fn for_request(request: &Request, size: usize, duration: Duration, response: &Document) -> Self {
        let entity_id = match request.document.get("_id") {
            Some(Bson::ObjectId(id)) => Some(*id),
            _ => None,
        };
        Self {
            id: ObjectId::new(),
            action: request.action,
            database: request.database.clone(),
            collection: request.collection.clone(),
            application: request.application.clone(),
            correlation_id: request.correlation_id.clone(),
            message: response.get_str("error").ok().map(ToOwned::to_owned),
            entity_id,
            timestamp: Utc::now(),
            duration,
            size: size as u64,
        }
    }

    /// The persisted document shape for the metrics collection.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let nanos = self.timestamp.timestamp_nanos_opt().unwrap_or_default();
        let mut document = doc! {
            "_id": self.id,
            "action": self.action.as_str(),
            "database": &self.database,
            "collection": &self.collection,
            "size": i64::try_from(self.size).unwrap_or(i64::MAX),
            "time": i64::try_from(self.duration.as_nanos()).unwrap_or(i64::MAX),
            "timestamp": nanos,
            "date": bson::DateTime::from_chrono(self.timestamp),
        };
        if let Some(id) = self.entity_id {
            document.insert("entityId", id);
        }
        if let Some(application) = &self.application {
            document.insert("application", application);
        }
        if let Some(correlation_id) = &self.correlation_id {
            document.insert("correlationId", correlation_id);
        }
        if let Some(message) = &self.message {
            document.insert("message", message);
        }
        document
    }
}

/// Producer handle feeding the metric queue.
#[derive(Clone)]
pub struct Collector {
    tx: mpsc::Sender<Metric>,
    dropped: Arc<AtomicU64>,
}

impl Collector {
    /// Enqueue a metric without blocking; on queue saturation the record
    /// is dropped and counted.
    pub fn record(&self, metric: Metric) {
        if self.tx.try_send(metric).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of records dropped on saturation so far.
    #[must_use]
    pub fn dropped(&self) -> u64 { self.dropped.load(Ordering::Relaxed) }
}

/// Start the telemetry pipeline: returns the producer handle and the
/// drain worker's join handle. The worker exits, after a final flush,
/// once every [`Collector`] clone has been dropped.
#[must_use]
pub fn spawn(settings: &MetricsSettings, sink: Box<dyn MetricSink>) -> (Collector, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(settings.queue_size.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let worker = tokio::spawn(worker::drain(
        rx,
        settings.batch_size.max(1),
        settings.flush_interval(),
        sink,
        Arc::clone(&dropped),
    ));
    (Collector { tx, dropped }, worker)
}
