//! Request processing shared by all connections.
//!
//! The [`Broker`] owns the storage handle and the telemetry producer.
//! Each connection task hands it decoded envelope documents; it
//! validates, dispatches, captures the per-request metric, and always
//! returns a well-formed response document.

use std::time::Instant;

use bson::Document;
use tracing::debug;

use crate::commands;
use crate::db::Store;
use crate::protocol::Request;
use crate::telemetry::{Collector, Metric};

/// Shared per-process broker state.
pub struct Broker {
    store: Store,
    telemetry: Collector,
}

impl Broker {
    /// Assemble the broker from its collaborators.
    #[must_use]
    pub fn new(store: Store, telemetry: Collector) -> Self { Self { store, telemetry } }

    /// The storage handle.
    #[must_use]
    pub fn store(&self) -> &Store { &self.store }

    /// Process one decoded request envelope.
    ///
    /// `size` is the byte length of the inbound frame, recorded in the
    /// request metric. Validation failures answer with the matching
    /// error document and produce no metric, as no handler ran.
    pub async fn handle(&self, envelope: Document, size: usize) -> Document {
        let request = match Request::from_document(&envelope) {
            Ok(request) => request,
            Err(rejection) => {
                debug!("rejecting invalid envelope: {rejection:?}");
                return rejection.to_document();
            }
        };
        let started = Instant::now();
        let response = commands::dispatch(&self.store, &request).await;
        if !request.skip_metric {
            self.telemetry
                .record(Metric::for_request(&request, size, started.elapsed(), &response));
        }
        response
    }
}
