//! Core library for the docd broker daemon.
//!
//! docd sits between TCP clients and a MongoDB deployment. Clients send
//! length-prefixed BSON request envelopes describing database operations;
//! the broker executes them against the backing store, records a
//! version-history entry for every mutation, emits a per-request metric,
//! and replies with a single BSON document per request.
//!
//! The crate exposes the protocol types, the broker runtime, and the client
//! request models so the server binary, the `idgen` tool, and integration
//! tests all share one implementation.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::indexing_slicing))]

pub mod client;
pub mod commands;
pub mod config;
pub mod dates;
pub mod db;
pub mod fields;
pub mod frame;
pub mod handler;
pub mod ids;
pub mod ilp;
pub mod logging;
pub mod protocol;
pub mod requests;
pub mod responses;
pub mod server;
pub mod telemetry;
