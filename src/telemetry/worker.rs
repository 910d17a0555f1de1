//! The single-consumer drain worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::{Metric, MetricSink};

async fn flush(sink: &mut Box<dyn MetricSink>, batch: &mut Vec<Metric>, published: &mut u64) {
    if batch.is_empty() {
        return;
    }
    let size = batch.len();
    match sink.publish(std::mem::take(batch)).await {
        Ok(()) => {
            *published += size as u64;
            info!("saved batch of {size} metric(s)");
        }
        Err(error) => warn!("error saving batch of {size} metric(s): {error}"),
    }
}

/// Accumulate records into batches and write them to the sink. Runs
/// until the producer side closes, then performs a best-effort final
/// flush.
pub(crate) async fn drain(
    mut rx: mpsc::Receiver<Metric>,
    batch_size: usize,
    flush_interval: Duration,
    mut sink: Box<dyn MetricSink>,
    dropped: Arc<AtomicU64>,
) {
    info!("metrics queue monitor starting");
    let mut batch: Vec<Metric> = Vec::with_capacity(batch_size);
    let mut published: u64 = 0;
    let mut reported_dropped: u64 = 0;
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(metric) => {
                    batch.push(metric);
                    if batch.len() >= batch_size {
                        flush(&mut sink, &mut batch, &mut published).await;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                flush(&mut sink, &mut batch, &mut published).await;
                let total_dropped = dropped.load(Ordering::Relaxed);
                if total_dropped > reported_dropped {
                    warn!("dropped {} metric(s) on queue saturation", total_dropped - reported_dropped);
                    reported_dropped = total_dropped;
                }
            }
        }
    }

    flush(&mut sink, &mut batch, &mut published).await;
    info!("published {published} total metric(s) from queue");
}
