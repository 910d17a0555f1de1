//! Typed views over broker response documents.
//!
//! Responses arrive as untyped BSON with an action-dependent shape; on
//! failure they carry an `error` field instead. These views give client
//! code one place that knows each shape, so callers match on a
//! [`Reply`] instead of probing documents field by field.

use bson::{oid::ObjectId, Bson, Document};

use crate::fields::{field, field_if_exists, FieldError};

/// A broker error response.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorReply {
    /// Human-readable message.
    pub message: String,
    /// Missing field names, present on schema errors.
    pub fields: Vec<String>,
}

/// The history pointer embedded in mutation responses.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryPointer {
    /// Id of the history record.
    pub id: ObjectId,
    /// History database.
    pub database: String,
    /// History collection.
    pub collection: String,
    /// Id of the mutated user document.
    pub entity: Bson,
}

impl HistoryPointer {
    fn from_document(document: &Document) -> Result<Self, FieldError> {
        Ok(Self {
            id: field::<ObjectId>(document, "_id")?,
            database: field::<String>(document, "database")?,
            collection: field::<String>(document, "collection")?,
            entity: document.get("entity").cloned().unwrap_or(Bson::Null),
        })
    }
}

/// Per-document outcome of a delete or update-many.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MutationOutcome {
    /// Ids mutated successfully.
    pub success: Vec<Bson>,
    /// Ids whose mutation or audit failed.
    pub failure: Vec<Bson>,
    /// History entries written for the successes.
    pub history: Vec<Bson>,
}

/// Committed transaction summary.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionSummary {
    /// Documents created.
    pub created: i32,
    /// Documents updated.
    pub updated: i32,
    /// Documents deleted.
    pub deleted: i32,
    /// History record ids for the creates.
    pub history_created: Vec<Bson>,
    /// History record ids for the deletes.
    pub history_deleted: Vec<Bson>,
}

/// A classified broker response.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// An error response document.
    Error(ErrorReply),
    /// Single-document retrieve result.
    One(Document),
    /// Multi-document retrieve or pipeline results.
    Many(Vec<Document>),
    /// Create acknowledgement: the history pointer.
    Created(HistoryPointer),
    /// Single-document update acknowledgement.
    Updated {
        /// The post-state document.
        document: Document,
        /// Pointer to the history record written for it.
        history: HistoryPointer,
    },
    /// Mutation acknowledgement with per-document outcome.
    Mutated(MutationOutcome),
    /// Count result.
    Count(i64),
    /// Distinct values.
    Values(Vec<Bson>),
    /// Committed transaction summary.
    Transaction(TransactionSummary),
    /// A shape this view does not classify (DDL acknowledgements,
    /// skip-version responses); the document is handed back as-is.
    Other(Document),
}

fn array(document: &Document, key: &str) -> Result<Option<Vec<Bson>>, FieldError> {
    Ok(field_if_exists::<&Vec<Bson>>(document, key)?.cloned())
}

fn documents(entries: Vec<Bson>) -> Vec<Document> {
    entries
        .into_iter()
        .filter_map(|entry| match entry {
            Bson::Document(document) => Some(document),
            _ => None,
        })
        .collect()
}

impl Reply {
    /// Classify a response document.
    ///
    /// # Errors
    /// Returns a [`FieldError`] when a recognised shape carries a
    /// mistyped field.
    #[must_use = "handle the result"]
    pub fn parse(response: &Document) -> Result<Self, FieldError> {
        if let Some(message) = field_if_exists::<String>(response, "error")? {
            let fields = array(response, "fields")?
                .unwrap_or_default()
                .into_iter()
                .filter_map(|entry| match entry {
                    Bson::String(name) => Some(name),
                    _ => None,
                })
                .collect();
            return Ok(Self::Error(ErrorReply { message, fields }));
        }
        if let Some(result) = field_if_exists::<&Document>(response, "result")? {
            return Ok(Self::One(result.clone()));
        }
        if let Some(results) = array(response, "results")? {
            return Ok(Self::Many(documents(results)));
        }
        if let Some(count) = field_if_exists::<i64>(response, "count")? {
            return Ok(Self::Count(count));
        }
        if let Some(values) = array(response, "values")? {
            return Ok(Self::Values(values));
        }
        if response.contains_key("created") && response.contains_key("history") {
            let history = field::<&Document>(response, "history")?;
            return Ok(Self::Transaction(TransactionSummary {
                created: field::<i32>(response, "created")?,
                updated: field::<i32>(response, "updated")?,
                deleted: field::<i32>(response, "deleted")?,
                history_created: array(history, "created")?.unwrap_or_default(),
                history_deleted: array(history, "deleted")?.unwrap_or_default(),
            }));
        }
        if let Some(document) = field_if_exists::<&Document>(response, "document")? {
            let history = field::<&Document>(response, "history")?;
            return Ok(Self::Updated {
                document: document.clone(),
                history: HistoryPointer::from_document(history)?,
            });
        }
        if response.contains_key("success") {
            return Ok(Self::Mutated(MutationOutcome {
                success: array(response, "success")?.unwrap_or_default(),
                failure: array(response, "failure")?.unwrap_or_default(),
                history: array(response, "history")?.unwrap_or_default(),
            }));
        }
        if response.contains_key("entity") && response.contains_key("database") {
            return Ok(Self::Created(HistoryPointer::from_document(response)?));
        }
        Ok(Self::Other(response.clone()))
    }

    /// The error reply, when this is one.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorReply> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }
}
