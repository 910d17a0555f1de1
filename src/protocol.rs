//! Request envelope model and error response documents.
//!
//! Every frame carries one envelope document with the shape
//! `{ action, database, collection, document, options?, metadata?,
//! correlationId?, application?, skipVersion?, skipMetric? }`. This module
//! parses and validates the envelope and provides the fixed error
//! documents every failure path answers with.

use std::fmt;
use std::str::FromStr;

use bson::{doc, Document};

use crate::fields::field_if_exists;

/// Enumerated request action tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Insert a document with a client-supplied id.
    Create,
    /// Insert a point into a timeseries collection.
    CreateTimeseries,
    /// Single or multi document lookup.
    Retrieve,
    /// Merge-by-id, replace, or update-many mutation.
    Update,
    /// Delete the documents matched by a filter.
    Delete,
    /// Count documents matching a filter.
    Count,
    /// Distinct values of a field.
    Distinct,
    /// Create a collection (including views and timeseries).
    CreateCollection,
    /// Rename a collection and its history records.
    RenameCollection,
    /// Drop a collection, optionally clearing its history.
    DropCollection,
    /// Create an index.
    Index,
    /// Drop an index by name or key specification.
    DropIndex,
    /// Batched inserts and deletes.
    Bulk,
    /// Read-only aggregation pipeline.
    Pipeline,
    /// Ordered multi-statement transaction.
    Transaction,
}

impl Action {
    /// The wire-format tag for this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::CreateTimeseries => "createTimeseries",
            Self::Retrieve => "retrieve",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Count => "count",
            Self::Distinct => "distinct",
            Self::CreateCollection => "createCollection",
            Self::RenameCollection => "renameCollection",
            Self::DropCollection => "dropCollection",
            Self::Index => "index",
            Self::DropIndex => "dropIndex",
            Self::Bulk => "bulk",
            Self::Pipeline => "pipeline",
            Self::Transaction => "transaction",
        }
    }

    /// Whether the action writes to the target namespace.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::Create | Self::CreateTimeseries | Self::Update | Self::Delete | Self::Bulk
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Error parsing an action tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownAction;

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, UnknownAction> {
        match s {
            "create" => Ok(Self::Create),
            "createTimeseries" => Ok(Self::CreateTimeseries),
            "retrieve" => Ok(Self::Retrieve),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "count" => Ok(Self::Count),
            "distinct" => Ok(Self::Distinct),
            "createCollection" => Ok(Self::CreateCollection),
            "renameCollection" => Ok(Self::RenameCollection),
            "dropCollection" => Ok(Self::DropCollection),
            "index" => Ok(Self::Index),
            "dropIndex" => Ok(Self::DropIndex),
            "bulk" => Ok(Self::Bulk),
            "pipeline" => Ok(Self::Pipeline),
            "transaction" => Ok(Self::Transaction),
            _ => Err(UnknownAction),
        }
    }
}

/// A validated request envelope.
#[derive(Clone, Debug)]
pub struct Request {
    /// The routed action.
    pub action: Action,
    /// Target database.
    pub database: String,
    /// Target collection.
    pub collection: String,
    /// Action-specific payload document.
    pub document: Document,
    /// Per-action options.
    pub options: Option<Document>,
    /// Opaque metadata copied into version-history records.
    pub metadata: Option<Document>,
    /// Caller-supplied correlation id, recorded in metrics.
    pub correlation_id: Option<String>,
    /// Calling application name, recorded in metrics.
    pub application: Option<String>,
    /// Suppress the version-history record for this mutation.
    pub skip_version: bool,
    /// Suppress the metric record for this request.
    pub skip_metric: bool,
}

/// Reasons an envelope is rejected before reaching a handler.
#[derive(Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    /// One or more required fields are absent or mistyped.
    MissingFields(Vec<&'static str>),
    /// The action tag is not recognised.
    UnknownAction,
}

impl EnvelopeError {
    /// The error response document for this rejection.
    #[must_use]
    pub fn to_document(&self) -> Document {
        match self {
            Self::MissingFields(fields) => missing_field(fields),
            Self::UnknownAction => invalid_action(),
        }
    }
}

impl Request {
    /// Parse and validate an envelope document.
    ///
    /// # Errors
    /// Returns [`EnvelopeError::MissingFields`] naming every absent or
    /// mistyped required field, or [`EnvelopeError::UnknownAction`] for an
    /// unrecognised action tag.
    #[must_use = "handle the result"]
    pub fn from_document(envelope: &Document) -> Result<Self, EnvelopeError> {
        let mut missing = Vec::new();

        let action = match field_if_exists::<&str>(envelope, "action") {
            Ok(Some(tag)) => Some(tag),
            _ => {
                missing.push("action");
                None
            }
        };
        let database = match field_if_exists::<&str>(envelope, "database") {
            Ok(Some(name)) => Some(name),
            _ => {
                missing.push("database");
                None
            }
        };
        let collection = match field_if_exists::<&str>(envelope, "collection") {
            Ok(Some(name)) => Some(name),
            _ => {
                missing.push("collection");
                None
            }
        };
        let document = match field_if_exists::<&Document>(envelope, "document") {
            Ok(Some(document)) => Some(document),
            _ => {
                missing.push("document");
                None
            }
        };
        if !missing.is_empty() {
            return Err(EnvelopeError::MissingFields(missing));
        }

        let (Some(action), Some(database), Some(collection), Some(document)) =
            (action, database, collection, document)
        else {
            return Err(EnvelopeError::MissingFields(missing));
        };
        let action = Action::from_str(action).map_err(|_| EnvelopeError::UnknownAction)?;

        let optional_string = |key: &str| match field_if_exists::<&str>(envelope, key) {
            Ok(Some(value)) if !value.is_empty() => Some(value.to_owned()),
            _ => None,
        };
        let optional_flag = |key: &str| {
            matches!(field_if_exists::<bool>(envelope, key), Ok(Some(true)))
        };
        let optional_document = |key: &str| match field_if_exists::<&Document>(envelope, key) {
            Ok(Some(value)) => Some(value.clone()),
            _ => None,
        };

        Ok(Self {
            action,
            database: database.to_owned(),
            collection: collection.to_owned(),
            document: document.clone(),
            options: optional_document("options"),
            metadata: optional_document("metadata"),
            correlation_id: optional_string("correlationId"),
            application: optional_string("application"),
            skip_version: optional_flag("skipVersion"),
            skip_metric: optional_flag("skipMetric"),
        })
    }
}

/// `notBson`: framing or validation failure.
#[must_use]
pub fn not_bson() -> Document {
    doc! { "error": "Payload not BSON" }
}

/// `missingField`: envelope lacks required fields, named in `fields`.
#[must_use]
pub fn missing_field(fields: &[&str]) -> Document {
    let names: Vec<String> = fields.iter().map(|f| (*f).to_owned()).collect();
    doc! { "error": "Missing required field(s) in payload", "fields": names }
}

/// `invalidAction`: action tag not recognised or target forbidden.
#[must_use]
pub fn invalid_action() -> Document {
    doc! { "error": "Invalid database action" }
}

/// `missingId`: create without an id in the payload document.
#[must_use]
pub fn missing_id() -> Document {
    doc! { "error": "Document id not specified" }
}

/// `insertError`: the insert reported failure.
#[must_use]
pub fn insert_error() -> Document {
    doc! { "error": "Unable to create document" }
}

/// `invalidAUpdate`: update payload not one of the accepted shapes.
#[must_use]
pub fn invalid_update() -> Document {
    doc! { "error": "Invalid update payload" }
}

/// `updateError`: the update or replace reported failure.
#[must_use]
pub fn update_error() -> Document {
    doc! { "error": "Unable to update document" }
}

/// `createVersionFailed`: the history write failed after a user write.
#[must_use]
pub fn create_version_failed() -> Document {
    doc! { "error": "Unable to create version for document" }
}

/// `notFound`: retrieve or delete matched nothing.
#[must_use]
pub fn not_found() -> Document {
    doc! { "error": "Document not found" }
}

/// `payloadTooLarge`: frame exceeds the accepted maximum.
#[must_use]
pub fn payload_too_large() -> Document {
    doc! { "error": "Payload size exceeds allowed limit" }
}

/// `poolExhausted`: no session available within the configured cap.
#[must_use]
pub fn pool_exhausted() -> Document {
    doc! { "error": "Connection pool exhausted" }
}

/// `transactionError`: a transaction aborted.
#[must_use]
pub fn transaction_error() -> Document {
    doc! { "error": "Error executing transaction" }
}

/// `unexpectedError`: unhandled condition; the response is still a valid
/// frame.
#[must_use]
pub fn unexpected_error() -> Document {
    doc! { "error": "Unexpected error processing request" }
}

/// A free-form error document carrying a runtime message.
#[must_use]
pub fn with_message(message: impl Into<String>) -> Document {
    doc! { "error": message.into() }
}
