use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bson::doc;
use rstest::rstest;

use super::sink::{MetricSink, SinkError};
use super::{spawn, Metric};
use crate::config::MetricsSettings;
use crate::protocol::{Action, Request};

#[derive(Clone, Default)]
struct CaptureSink {
    batches: Arc<Mutex<Vec<Vec<Metric>>>>,
}

impl CaptureSink {
    fn batch_sizes(&self) -> Vec<usize> {
        self.batches
            .lock()
            .expect("lock")
            .iter()
            .map(Vec::len)
            .collect()
    }
}

#[async_trait]
impl MetricSink for CaptureSink {
    async fn publish(&mut self, batch: Vec<Metric>) -> Result<(), SinkError> {
        self.batches.lock().expect("lock").push(batch);
        Ok(())
    }
}

fn request() -> Request {
    let envelope = doc! {
        "action": "create",
        "database": "itest",
        "collection": "test",
        "document": { "_id": bson::oid::ObjectId::new(), "key": "value" },
        "application": "itest-suite",
        "correlationId": "abc123",
    };
    Request::from_document(&envelope).expect("valid request")
}

fn metric() -> Metric {
    Metric::for_request(&request(), 128, Duration::from_micros(250), &doc! { "entity": 1 })
}

fn settings(batch_size: usize, queue_size: usize) -> MetricsSettings {
    MetricsSettings {
        batch_size,
        queue_size,
        flush_interval: 3600,
        ..MetricsSettings::default()
    }
}

#[rstest]
fn metric_document_carries_request_tags() {
    let metric = metric();
    let document = metric.to_document();
    assert_eq!(document.get_str("action").expect("action"), "create");
    assert_eq!(document.get_str("database").expect("database"), "itest");
    assert_eq!(document.get_str("collection").expect("collection"), "test");
    assert_eq!(document.get_i64("size").expect("size"), 128);
    assert_eq!(document.get_i64("time").expect("time"), 250_000);
    assert_eq!(document.get_str("application").expect("application"), "itest-suite");
    assert_eq!(document.get_str("correlationId").expect("correlation"), "abc123");
    assert!(document.get_object_id("entityId").is_ok());
    assert!(document.get_i64("timestamp").is_ok());
    assert!(document.get_datetime("date").is_ok());
    assert!(document.get("message").is_none());
}

#[rstest]
fn failed_responses_record_the_error_message() {
    let metric = Metric::for_request(
        &request(),
        64,
        Duration::from_micros(10),
        &crate::protocol::not_found(),
    );
    assert_eq!(metric.message.as_deref(), Some("Document not found"));
}

#[rstest]
#[tokio::test]
async fn drains_full_batches() {
    let sink = CaptureSink::default();
    let (collector, worker) = spawn(&settings(2, 64), Box::new(sink.clone()));
    for _ in 0..4 {
        collector.record(metric());
    }
    drop(collector);
    worker.await.expect("worker");
    assert_eq!(sink.batch_sizes(), vec![2, 2]);
}

#[rstest]
#[tokio::test]
async fn final_flush_covers_partial_batches() {
    let sink = CaptureSink::default();
    let (collector, worker) = spawn(&settings(10, 64), Box::new(sink.clone()));
    for _ in 0..3 {
        collector.record(metric());
    }
    drop(collector);
    worker.await.expect("worker");
    assert_eq!(sink.batch_sizes(), vec![3]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn interval_flushes_partial_batches() {
    let sink = CaptureSink::default();
    let mut cfg = settings(100, 64);
    cfg.flush_interval = 1;
    let (collector, worker) = spawn(&cfg, Box::new(sink.clone()));
    collector.record(metric());
    tokio::time::advance(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert_eq!(sink.batch_sizes(), vec![1]);
    drop(collector);
    worker.await.expect("worker");
}

#[rstest]
#[tokio::test]
async fn saturation_drops_and_counts() {
    let sink = CaptureSink::default();
    // Queue of one with a worker that cannot keep up instantly; fill it
    // well past capacity synchronously so try_send must fail.
    let (collector, worker) = spawn(&settings(100, 1), Box::new(sink.clone()));
    for _ in 0..50 {
        collector.record(metric());
    }
    assert!(collector.dropped() > 0);
    drop(collector);
    worker.await.expect("worker");
}

#[rstest]
fn collector_clones_share_the_drop_counter() {
    let (tx, _rx) = tokio::sync::mpsc::channel(1);
    let collector = super::Collector {
        tx,
        dropped: Arc::new(std::sync::atomic::AtomicU64::new(0)),
    };
    let clone = collector.clone();
    collector.record(metric());
    collector.record(metric());
    assert_eq!(clone.dropped(), 1);
    assert_eq!(clone.dropped.load(Ordering::Relaxed), 1);
}
