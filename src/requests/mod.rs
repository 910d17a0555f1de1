//! Client-side request models.
//!
//! These types build the wire envelope (§ protocol) for callers: the
//! integration suite, client tooling, and anything embedding the broker
//! protocol. Mutation payloads are `Cow`-based, so a caller can either
//! hand over an owned document or borrow one it already holds; both
//! variants marshal to identical bytes.

pub mod options;

use std::borrow::Cow;

use bson::{doc, Bson, Document};

use crate::protocol::Action;

/// Conversion into an owned-or-borrowed request payload.
///
/// Implemented for `Document` (the request owns its payload) and
/// `&Document` (the payload borrows an external document).
pub trait IntoPayload<'a> {
    /// Convert into the payload representation.
    fn into_payload(self) -> Cow<'a, Document>;
}

impl<'a> IntoPayload<'a> for Document {
    fn into_payload(self) -> Cow<'a, Document> { Cow::Owned(self) }
}

impl<'a> IntoPayload<'a> for &'a Document {
    fn into_payload(self) -> Cow<'a, Document> { Cow::Borrowed(self) }
}

fn envelope(action: Action, database: &str, collection: &str, document: Document) -> Document {
    doc! {
        "action": action.as_str(),
        "database": database,
        "collection": collection,
        "document": document,
    }
}

/// Optional envelope fields shared by every request.
#[derive(Clone, Debug, Default)]
pub struct Common<'a> {
    /// Per-action options document.
    pub options: Option<Document>,
    /// Opaque metadata copied into version-history records.
    pub metadata: Option<Cow<'a, Document>>,
    /// Correlation id recorded in metrics.
    pub correlation_id: Option<String>,
    /// Calling application recorded in metrics.
    pub application: Option<String>,
    /// Suppress the version-history record.
    pub skip_version: bool,
    /// Suppress the metric record.
    pub skip_metric: bool,
}

impl Common<'_> {
    fn apply(&self, envelope: &mut Document) {
        if let Some(options) = &self.options {
            envelope.insert("options", options.clone());
        }
        if let Some(metadata) = &self.metadata {
            envelope.insert("metadata", metadata.as_ref().clone());
        }
        if let Some(correlation_id) = &self.correlation_id {
            envelope.insert("correlationId", correlation_id);
        }
        if let Some(application) = &self.application {
            envelope.insert("application", application);
        }
        if self.skip_version {
            envelope.insert("skipVersion", true);
        }
        if self.skip_metric {
            envelope.insert("skipMetric", true);
        }
    }
}

macro_rules! common_setters {
    () => {
        /// Attach a per-action options document.
        #[must_use]
        pub fn options(mut self, options: Document) -> Self {
            self.common.options = Some(options);
            self
        }

        /// Attach metadata copied into version-history records.
        #[must_use]
        pub fn metadata(mut self, metadata: impl IntoPayload<'a>) -> Self {
            self.common.metadata = Some(metadata.into_payload());
            self
        }

        /// Record a correlation id with this request's metric.
        #[must_use]
        pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
            self.common.correlation_id = Some(correlation_id.into());
            self
        }

        /// Record the calling application with this request's metric.
        #[must_use]
        pub fn application(mut self, application: impl Into<String>) -> Self {
            self.common.application = Some(application.into());
            self
        }

        /// Suppress the version-history record for this mutation.
        #[must_use]
        pub fn skip_version(mut self) -> Self {
            self.common.skip_version = true;
            self
        }

        /// Suppress the metric record for this request.
        #[must_use]
        pub fn skip_metric(mut self) -> Self {
            self.common.skip_metric = true;
            self
        }
    };
}

/// `create`: insert a document carrying its own id.
#[derive(Clone, Debug)]
pub struct Create<'a> {
    database: String,
    collection: String,
    document: Cow<'a, Document>,
    common: Common<'a>,
}

impl<'a> Create<'a> {
    /// Build a create request; `document` may be owned or borrowed.
    #[must_use]
    pub fn new(
        database: impl Into<String>,
        collection: impl Into<String>,
        document: impl IntoPayload<'a>,
    ) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            document: document.into_payload(),
            common: Common::default(),
        }
    }

    common_setters!();

    /// Marshal to the wire envelope.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut envelope = envelope(
            Action::Create,
            &self.database,
            &self.collection,
            self.document.as_ref().clone(),
        );
        self.common.apply(&mut envelope);
        envelope
    }
}

/// `createTimeseries`: insert a point into a timeseries collection.
#[derive(Clone, Debug)]
pub struct CreateTimeseries<'a> {
    database: String,
    collection: String,
    document: Cow<'a, Document>,
    common: Common<'a>,
}

impl<'a> CreateTimeseries<'a> {
    /// Build a timeseries insert; `document` may be owned or borrowed.
    #[must_use]
    pub fn new(
        database: impl Into<String>,
        collection: impl Into<String>,
        document: impl IntoPayload<'a>,
    ) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            document: document.into_payload(),
            common: Common::default(),
        }
    }

    common_setters!();

    /// Marshal to the wire envelope.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut envelope = envelope(
            Action::CreateTimeseries,
            &self.database,
            &self.collection,
            self.document.as_ref().clone(),
        );
        self.common.apply(&mut envelope);
        envelope
    }
}

/// `update` in its merge-by-id or replace/update-many shapes.
#[derive(Clone, Debug)]
pub struct Update<'a> {
    database: String,
    collection: String,
    document: Cow<'a, Document>,
    common: Common<'a>,
}

impl<'a> Update<'a> {
    /// Merge-by-id: the payload carries `_id` plus the fields to set.
    #[must_use]
    pub fn merge(
        database: impl Into<String>,
        collection: impl Into<String>,
        document: impl IntoPayload<'a>,
    ) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            document: document.into_payload(),
            common: Common::default(),
        }
    }

    /// Replace the first document matched by `filter`.
    #[must_use]
    pub fn replace(
        database: impl Into<String>,
        collection: impl Into<String>,
        filter: Document,
        replacement: &'a Document,
    ) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            document: Cow::Owned(doc! { "filter": filter, "replace": replacement.clone() }),
            common: Common::default(),
        }
    }

    /// Apply `changes` to every document matched by `filter`.
    #[must_use]
    pub fn many(
        database: impl Into<String>,
        collection: impl Into<String>,
        filter: Document,
        changes: Document,
    ) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            document: Cow::Owned(doc! { "filter": filter, "update": changes }),
            common: Common::default(),
        }
    }

    common_setters!();

    /// Marshal to the wire envelope.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut envelope = envelope(
            Action::Update,
            &self.database,
            &self.collection,
            self.document.as_ref().clone(),
        );
        self.common.apply(&mut envelope);
        envelope
    }
}

/// A read or simple filtered request without borrow semantics.
#[derive(Clone, Debug)]
pub struct Filtered<'a> {
    action: Action,
    database: String,
    collection: String,
    document: Document,
    common: Common<'a>,
}

impl<'a> Filtered<'a> {
    fn new(
        action: Action,
        database: impl Into<String>,
        collection: impl Into<String>,
        document: Document,
    ) -> Self {
        Self {
            action,
            database: database.into(),
            collection: collection.into(),
            document,
            common: Common::default(),
        }
    }

    /// `retrieve` with the given filter.
    #[must_use]
    pub fn retrieve(
        database: impl Into<String>,
        collection: impl Into<String>,
        filter: Document,
    ) -> Self {
        Self::new(Action::Retrieve, database, collection, filter)
    }

    /// `delete` for the documents matched by `filter`.
    #[must_use]
    pub fn delete(
        database: impl Into<String>,
        collection: impl Into<String>,
        filter: Document,
    ) -> Self {
        Self::new(Action::Delete, database, collection, filter)
    }

    /// `count` with the given filter.
    #[must_use]
    pub fn count(
        database: impl Into<String>,
        collection: impl Into<String>,
        filter: Document,
    ) -> Self {
        Self::new(Action::Count, database, collection, filter)
    }

    /// `distinct` values of `field` under `filter`.
    #[must_use]
    pub fn distinct(
        database: impl Into<String>,
        collection: impl Into<String>,
        field: impl Into<String>,
        filter: Document,
    ) -> Self {
        Self::new(
            Action::Distinct,
            database,
            collection,
            doc! { "field": field.into(), "filter": filter },
        )
    }

    /// `pipeline` with the given aggregation stages.
    #[must_use]
    pub fn pipeline(
        database: impl Into<String>,
        collection: impl Into<String>,
        stages: Vec<Document>,
    ) -> Self {
        let stages: Vec<Bson> = stages.into_iter().map(Bson::Document).collect();
        Self::new(
            Action::Pipeline,
            database,
            collection,
            doc! { "specification": stages },
        )
    }

    common_setters!();

    /// Marshal to the wire envelope.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut envelope = envelope(
            self.action,
            &self.database,
            &self.collection,
            self.document.clone(),
        );
        self.common.apply(&mut envelope);
        envelope
    }
}

/// Collection and index lifecycle requests.
#[derive(Clone, Debug)]
pub struct Ddl<'a> {
    action: Action,
    database: String,
    collection: String,
    document: Document,
    common: Common<'a>,
}

impl<'a> Ddl<'a> {
    fn new(
        action: Action,
        database: impl Into<String>,
        collection: impl Into<String>,
        document: Document,
    ) -> Self {
        Self {
            action,
            database: database.into(),
            collection: collection.into(),
            document,
            common: Common::default(),
        }
    }

    /// `createCollection`; creation options go through [`Self::options`].
    #[must_use]
    pub fn create_collection(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::new(Action::CreateCollection, database, collection, Document::new())
    }

    /// `dropCollection`. With `clear_version_history` the broker also
    /// removes the collection's history records out-of-band.
    #[must_use]
    pub fn drop_collection(
        database: impl Into<String>,
        collection: impl Into<String>,
        clear_version_history: bool,
    ) -> Self {
        let document = if clear_version_history {
            doc! { "clearVersionHistory": true }
        } else {
            Document::new()
        };
        Self::new(Action::DropCollection, database, collection, document)
    }

    /// `renameCollection` to `target` within the same database.
    #[must_use]
    pub fn rename_collection(
        database: impl Into<String>,
        collection: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::new(
            Action::RenameCollection,
            database,
            collection,
            doc! { "target": target.into() },
        )
    }

    /// `index` with the given key specification.
    #[must_use]
    pub fn create_index(
        database: impl Into<String>,
        collection: impl Into<String>,
        keys: Document,
    ) -> Self {
        Self::new(Action::Index, database, collection, keys)
    }

    /// `dropIndex` by index name.
    #[must_use]
    pub fn drop_index_by_name(
        database: impl Into<String>,
        collection: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(
            Action::DropIndex,
            database,
            collection,
            doc! { "name": name.into() },
        )
    }

    /// `dropIndex` by key specification.
    #[must_use]
    pub fn drop_index(
        database: impl Into<String>,
        collection: impl Into<String>,
        specification: Document,
    ) -> Self {
        Self::new(
            Action::DropIndex,
            database,
            collection,
            doc! { "specification": specification },
        )
    }

    common_setters!();

    /// Marshal to the wire envelope.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut envelope = envelope(
            self.action,
            &self.database,
            &self.collection,
            self.document.clone(),
        );
        self.common.apply(&mut envelope);
        envelope
    }
}

/// `bulk`: batched inserts and deletes.
#[derive(Clone, Debug, Default)]
pub struct Bulk<'a> {
    database: String,
    collection: String,
    insert: Vec<Cow<'a, Document>>,
    delete: Vec<Document>,
    common: Common<'a>,
}

impl<'a> Bulk<'a> {
    /// Build an empty bulk request.
    #[must_use]
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// Queue a document for insertion; owned or borrowed.
    #[must_use]
    pub fn insert(mut self, document: impl IntoPayload<'a>) -> Self {
        self.insert.push(document.into_payload());
        self
    }

    /// Queue a delete filter.
    #[must_use]
    pub fn delete(mut self, filter: Document) -> Self {
        self.delete.push(filter);
        self
    }

    common_setters!();

    /// Marshal to the wire envelope.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        if !self.insert.is_empty() {
            let entries: Vec<Bson> = self
                .insert
                .iter()
                .map(|entry| Bson::Document(entry.as_ref().clone()))
                .collect();
            document.insert("insert", entries);
        }
        if !self.delete.is_empty() {
            let entries: Vec<Bson> = self.delete.iter().cloned().map(Bson::Document).collect();
            document.insert("delete", entries);
        }
        let mut envelope = envelope(Action::Bulk, &self.database, &self.collection, document);
        self.common.apply(&mut envelope);
        envelope
    }
}

/// `transaction`: an ordered list of create/update/delete items.
#[derive(Clone, Debug, Default)]
pub struct Transaction<'a> {
    database: String,
    collection: String,
    items: Vec<Document>,
    common: Common<'a>,
}

impl<'a> Transaction<'a> {
    /// Build an empty transaction request. The envelope's own
    /// database/collection identify the request; each item carries its
    /// own target.
    #[must_use]
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            ..Self::default()
        }
    }

    fn item(
        action: Action,
        database: &str,
        collection: &str,
        document: &Document,
        skip_version: bool,
    ) -> Document {
        let mut item = envelope(action, database, collection, document.clone());
        if skip_version {
            item.insert("skipVersion", true);
        }
        item
    }

    /// Queue a create item.
    #[must_use]
    pub fn create(mut self, database: &str, collection: &str, document: &Document) -> Self {
        self.items
            .push(Self::item(Action::Create, database, collection, document, false));
        self
    }

    /// Queue a delete item.
    #[must_use]
    pub fn delete(mut self, database: &str, collection: &str, filter: &Document) -> Self {
        self.items
            .push(Self::item(Action::Delete, database, collection, filter, false));
        self
    }

    common_setters!();

    /// Marshal to the wire envelope.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let items: Vec<Bson> = self.items.iter().cloned().map(Bson::Document).collect();
        let mut envelope = envelope(
            Action::Transaction,
            &self.database,
            &self.collection,
            doc! { "items": items },
        );
        self.common.apply(&mut envelope);
        envelope
    }
}
