//! Routed action handlers.
//!
//! [`dispatch`] maps a validated request envelope onto the handler for its
//! action tag. Handlers return either a success document or a
//! [`HandlerError`]; every error maps onto one of the fixed protocol error
//! documents, so the session loop always has a well-formed frame to send
//! back. No handler failure propagates out of the dispatcher.

pub(crate) mod bulk;
pub(crate) mod crud;
pub(crate) mod ddl;
pub(crate) mod options;
pub(crate) mod remove;
pub(crate) mod transact;
pub(crate) mod update;

#[cfg(test)]
mod tests;

use bson::Document;
use tracing::warn;

use crate::db::{Store, StoreError};
use crate::fields::FieldError;
use crate::protocol::{self, Action, Request};

/// Internal handler failure, mapped onto a protocol error document.
#[derive(Debug)]
pub(crate) enum HandlerError {
    /// Required fields absent from the payload document.
    MissingFields(Vec<String>),
    /// Create payload without a document id.
    MissingId,
    /// The insert reported failure.
    Insert,
    /// Update payload matched none of the accepted shapes.
    InvalidUpdate,
    /// The update or replace reported failure.
    Update,
    /// The history write failed after the user write succeeded.
    VersionFailed,
    /// The filter matched nothing.
    NotFound,
    /// The session pool is at its cap.
    PoolExhausted,
    /// A transaction aborted.
    Transaction,
    /// A condition with a bespoke message, e.g. rename target conflicts.
    Message(String),
    /// Anything unanticipated; carries the driver message.
    Unexpected(String),
}

impl HandlerError {
    /// The protocol error document for this failure.
    pub(crate) fn to_document(&self) -> Document {
        match self {
            Self::MissingFields(fields) => {
                let names: Vec<&str> = fields.iter().map(String::as_str).collect();
                protocol::missing_field(&names)
            }
            Self::MissingId => protocol::missing_id(),
            Self::Insert => protocol::insert_error(),
            Self::InvalidUpdate => protocol::invalid_update(),
            Self::Update => protocol::update_error(),
            Self::VersionFailed => protocol::create_version_failed(),
            Self::NotFound => protocol::not_found(),
            Self::PoolExhausted => protocol::pool_exhausted(),
            Self::Transaction => protocol::transaction_error(),
            Self::Message(message) => protocol::with_message(message.clone()),
            Self::Unexpected(message) => {
                let mut response = protocol::unexpected_error();
                response.insert("message", message.clone());
                response
            }
        }
    }

    pub(crate) fn missing(field: &str) -> Self { Self::MissingFields(vec![field.to_owned()]) }
}

impl From<StoreError> for HandlerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::PoolExhausted => Self::PoolExhausted,
            StoreError::Backing(error) => Self::Unexpected(error.to_string()),
        }
    }
}

impl From<mongodb::error::Error> for HandlerError {
    fn from(error: mongodb::error::Error) -> Self { Self::Unexpected(error.to_string()) }
}

impl From<FieldError> for HandlerError {
    fn from(error: FieldError) -> Self {
        match error {
            FieldError::Missing(field) => Self::MissingFields(vec![field]),
            FieldError::Mismatch { .. } => Self::Unexpected(error.to_string()),
        }
    }
}

/// Route a validated request to its handler and produce the response
/// document.
pub async fn dispatch(store: &Store, request: &Request) -> Document {
    if request.action.is_mutating() && store.is_history(&request.database, &request.collection) {
        warn!(
            "rejecting {} targeting the version history location {}:{}",
            request.action, request.database, request.collection
        );
        return protocol::invalid_action();
    }

    let result = match request.action {
        Action::Create => crud::create(store, request).await,
        Action::CreateTimeseries => crud::create_timeseries(store, request).await,
        Action::Retrieve => crud::retrieve(store, request).await,
        Action::Update => update::update(store, request).await,
        Action::Delete => remove::remove(store, request).await,
        Action::Count => crud::count(store, request).await,
        Action::Distinct => crud::distinct(store, request).await,
        Action::Pipeline => crud::pipeline(store, request).await,
        Action::Bulk => bulk::bulk(store, request).await,
        Action::Index => ddl::index(store, request).await,
        Action::DropIndex => ddl::drop_index(store, request).await,
        Action::CreateCollection => ddl::create_collection(store, request).await,
        Action::DropCollection => ddl::drop_collection(store, request).await,
        Action::RenameCollection => ddl::rename_collection(store, request).await,
        Action::Transaction => transact::execute(store, request).await,
    };

    match result {
        Ok(response) => response,
        Err(error) => {
            if let HandlerError::Unexpected(message) = &error {
                warn!(
                    "error processing {} on {}:{}: {message}",
                    request.action, request.database, request.collection
                );
            }
            error.to_document()
        }
    }
}
