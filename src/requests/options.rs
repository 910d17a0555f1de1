//! Typed builders for the per-action option documents.
//!
//! Clients can attach options as raw documents; these builders produce
//! the same wire keys with a typed surface, so callers get field names
//! checked at compile time. Every `to_document` output is accepted by
//! the broker's option parsing.

use std::time::Duration;

use bson::{Bson, Document};

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Write acknowledgement level, mirroring the legacy client enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcknowledgeLevel {
    /// Store default.
    Default,
    /// Majority of replica-set members.
    Majority,
    /// Members carrying a replica-set tag.
    Tag,
    /// Fire-and-forget.
    Unacknowledged,
    /// A single member.
    Acknowledged,
}

impl AcknowledgeLevel {
    const fn as_i32(self) -> i32 {
        match self {
            Self::Default => 0,
            Self::Majority => 1,
            Self::Tag => 2,
            Self::Unacknowledged => 3,
            Self::Acknowledged => 4,
        }
    }
}

/// Read preference mode forwarded to the backing store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadPreferenceMode {
    /// Primary only.
    Primary,
    /// Primary when available.
    PrimaryPreferred,
    /// Secondary only.
    Secondary,
    /// Secondary when available.
    SecondaryPreferred,
    /// Lowest-latency member.
    Nearest,
}

impl ReadPreferenceMode {
    const fn as_i32(self) -> i32 {
        match self {
            Self::Primary => 0,
            Self::PrimaryPreferred => 1,
            Self::Secondary => 2,
            Self::SecondaryPreferred => 3,
            Self::Nearest => 4,
        }
    }
}

/// Wire write-concern descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteConcern {
    /// Wait for the journal.
    pub journal: Option<bool>,
    /// Number of acknowledging nodes.
    pub nodes: Option<i32>,
    /// Acknowledgement level.
    pub acknowledge_level: Option<AcknowledgeLevel>,
    /// Replica-set tag.
    pub tag: Option<String>,
    /// Majority timeout.
    pub majority: Option<Duration>,
    /// Write timeout.
    pub timeout: Option<Duration>,
}

impl WriteConcern {
    /// Marshal to the wire document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        if let Some(journal) = self.journal {
            document.insert("journal", journal);
        }
        if let Some(nodes) = self.nodes {
            document.insert("nodes", nodes);
        }
        if let Some(level) = self.acknowledge_level {
            document.insert("acknowledgeLevel", level.as_i32());
        }
        if let Some(tag) = &self.tag {
            document.insert("tag", tag);
        }
        if let Some(majority) = self.majority {
            document.insert("majority", millis(majority));
        }
        if let Some(timeout) = self.timeout {
            document.insert("timeout", millis(timeout));
        }
        document
    }
}

/// Options for `retrieve` queries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Find {
    /// Accept partial results from sharded clusters.
    pub partial_results: Option<bool>,
    /// Cursor batch size.
    pub batch_size: Option<i32>,
    /// Collation document.
    pub collation: Option<Document>,
    /// Operation comment.
    pub comment: Option<String>,
    /// Index hint: key pattern or index name.
    pub hint: Option<Bson>,
    /// Maximum number of results.
    pub limit: Option<i64>,
    /// Exclusive upper index bound.
    pub max: Option<Document>,
    /// Server-side time limit.
    pub max_time: Option<Duration>,
    /// Inclusive lower index bound.
    pub min: Option<Document>,
    /// Projection document.
    pub projection: Option<Document>,
    /// Read preference mode.
    pub read_preference: Option<ReadPreferenceMode>,
    /// Return index keys only.
    pub return_key: Option<bool>,
    /// Include the record id in results.
    pub show_record_id: Option<bool>,
    /// Results to skip.
    pub skip: Option<i64>,
    /// Sort document.
    pub sort: Option<Document>,
}

impl Find {
    /// Marshal to the wire document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        if let Some(partial) = self.partial_results {
            document.insert("partialResults", partial);
        }
        if let Some(batch_size) = self.batch_size {
            document.insert("batchSize", batch_size);
        }
        if let Some(collation) = &self.collation {
            document.insert("collation", collation.clone());
        }
        if let Some(comment) = &self.comment {
            document.insert("comment", comment);
        }
        if let Some(hint) = &self.hint {
            document.insert("hint", hint.clone());
        }
        if let Some(limit) = self.limit {
            document.insert("limit", limit);
        }
        if let Some(max) = &self.max {
            document.insert("max", max.clone());
        }
        if let Some(max_time) = self.max_time {
            document.insert("maxTime", millis(max_time));
        }
        if let Some(min) = &self.min {
            document.insert("min", min.clone());
        }
        if let Some(projection) = &self.projection {
            document.insert("projection", projection.clone());
        }
        if let Some(mode) = self.read_preference {
            document.insert("readPreference", mode.as_i32());
        }
        if let Some(return_key) = self.return_key {
            document.insert("returnKey", return_key);
        }
        if let Some(show_record_id) = self.show_record_id {
            document.insert("showRecordId", show_record_id);
        }
        if let Some(skip) = self.skip {
            document.insert("skip", skip);
        }
        if let Some(sort) = &self.sort {
            document.insert("sort", sort.clone());
        }
        document
    }
}

/// Options for `create` and `createTimeseries`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Insert {
    /// Bypass document validation.
    pub bypass_validation: Option<bool>,
    /// Ordered batch semantics.
    pub ordered: Option<bool>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
}

impl Insert {
    /// Marshal to the wire document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        if let Some(bypass) = self.bypass_validation {
            document.insert("bypassValidation", bypass);
        }
        if let Some(ordered) = self.ordered {
            document.insert("ordered", ordered);
        }
        if let Some(concern) = &self.write_concern {
            document.insert("writeConcern", concern.to_document());
        }
        document
    }
}

/// Options for `update` in all three shapes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    /// Bypass document validation.
    pub bypass_validation: Option<bool>,
    /// Collation document.
    pub collation: Option<Document>,
    /// Insert when nothing matches.
    pub upsert: Option<bool>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
    /// Array filters for positional updates.
    pub array_filters: Option<Vec<Document>>,
}

impl Update {
    /// Marshal to the wire document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        if let Some(bypass) = self.bypass_validation {
            document.insert("bypassValidation", bypass);
        }
        if let Some(collation) = &self.collation {
            document.insert("collation", collation.clone());
        }
        if let Some(upsert) = self.upsert {
            document.insert("upsert", upsert);
        }
        if let Some(concern) = &self.write_concern {
            document.insert("writeConcern", concern.to_document());
        }
        if let Some(filters) = &self.array_filters {
            let filters: Vec<Bson> = filters.iter().cloned().map(Bson::Document).collect();
            document.insert("arrayFilters", filters);
        }
        document
    }
}

/// Options for `delete`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Delete {
    /// Collation document.
    pub collation: Option<Document>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
}

impl Delete {
    /// Marshal to the wire document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        if let Some(collation) = &self.collation {
            document.insert("collation", collation.clone());
        }
        if let Some(concern) = &self.write_concern {
            document.insert("writeConcern", concern.to_document());
        }
        document
    }
}

/// Options for `count`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Count {
    /// Collation document.
    pub collation: Option<Document>,
    /// Index hint: key pattern or index name.
    pub hint: Option<Bson>,
    /// Maximum number of documents to count.
    pub limit: Option<i64>,
    /// Server-side time limit.
    pub max_time: Option<Duration>,
    /// Documents to skip before counting.
    pub skip: Option<i64>,
    /// Read preference mode.
    pub read_preference: Option<ReadPreferenceMode>,
}

impl Count {
    /// Marshal to the wire document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        if let Some(collation) = &self.collation {
            document.insert("collation", collation.clone());
        }
        if let Some(hint) = &self.hint {
            document.insert("hint", hint.clone());
        }
        if let Some(limit) = self.limit {
            document.insert("limit", limit);
        }
        if let Some(max_time) = self.max_time {
            document.insert("maxTime", millis(max_time));
        }
        if let Some(skip) = self.skip {
            document.insert("skip", skip);
        }
        if let Some(mode) = self.read_preference {
            document.insert("readPreference", mode.as_i32());
        }
        document
    }
}

/// Options for `index` creation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Index {
    /// Index name.
    pub name: Option<String>,
    /// Enforce uniqueness.
    pub unique: Option<bool>,
    /// Skip documents without the indexed fields.
    pub sparse: Option<bool>,
    /// Hide the index from the planner.
    pub hidden: Option<bool>,
    /// Build in the background.
    pub background: Option<bool>,
    /// TTL for indexed documents.
    pub expire_after: Option<Duration>,
    /// Partial index filter.
    pub partial_filter_expression: Option<Document>,
    /// Collation document.
    pub collation: Option<Document>,
    /// Text index weights.
    pub weights: Option<Document>,
    /// Text index default language.
    pub default_language: Option<String>,
    /// Field overriding the document language.
    pub language_override: Option<String>,
}

impl Index {
    /// Marshal to the wire document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        if let Some(name) = &self.name {
            document.insert("name", name);
        }
        if let Some(unique) = self.unique {
            document.insert("unique", unique);
        }
        if let Some(sparse) = self.sparse {
            document.insert("sparse", sparse);
        }
        if let Some(hidden) = self.hidden {
            document.insert("hidden", hidden);
        }
        if let Some(background) = self.background {
            document.insert("background", background);
        }
        if let Some(expire_after) = self.expire_after {
            document.insert(
                "expireAfterSeconds",
                i64::try_from(expire_after.as_secs()).unwrap_or(i64::MAX),
            );
        }
        if let Some(filter) = &self.partial_filter_expression {
            document.insert("partialFilterExpression", filter.clone());
        }
        if let Some(collation) = &self.collation {
            document.insert("collation", collation.clone());
        }
        if let Some(weights) = &self.weights {
            document.insert("weights", weights.clone());
        }
        if let Some(language) = &self.default_language {
            document.insert("defaultLanguage", language);
        }
        if let Some(field) = &self.language_override {
            document.insert("languageOverride", field);
        }
        document
    }
}

/// Options for `createCollection`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateCollection {
    /// Capped collection.
    pub capped: Option<bool>,
    /// Capped collection size in bytes.
    pub size: Option<i64>,
    /// Capped collection document cap.
    pub max: Option<i64>,
    /// Validator expression.
    pub validator: Option<Document>,
    /// Validation level: off, strict, or moderate.
    pub validation_level: Option<String>,
    /// Validation action: error or warn.
    pub validation_action: Option<String>,
    /// TTL for timeseries/clustered data.
    pub expire_after: Option<Duration>,
    /// Source collection for a view.
    pub view_on: Option<String>,
    /// View pipeline stages.
    pub pipeline: Option<Vec<Document>>,
    /// Timeseries description: `timeField`, optional `metaField` and
    /// `granularity`.
    pub timeseries: Option<Document>,
    /// Collation document.
    pub collation: Option<Document>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
}

impl CreateCollection {
    /// Marshal to the wire document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        if let Some(capped) = self.capped {
            document.insert("capped", capped);
        }
        if let Some(size) = self.size {
            document.insert("size", size);
        }
        if let Some(max) = self.max {
            document.insert("max", max);
        }
        if let Some(validator) = &self.validator {
            document.insert("validator", validator.clone());
        }
        if let Some(level) = &self.validation_level {
            document.insert("validationLevel", level);
        }
        if let Some(action) = &self.validation_action {
            document.insert("validationAction", action);
        }
        if let Some(expire_after) = self.expire_after {
            document.insert(
                "expireAfterSeconds",
                i64::try_from(expire_after.as_secs()).unwrap_or(i64::MAX),
            );
        }
        if let Some(view_on) = &self.view_on {
            document.insert("viewOn", view_on);
        }
        if let Some(pipeline) = &self.pipeline {
            let stages: Vec<Bson> = pipeline.iter().cloned().map(Bson::Document).collect();
            document.insert("pipeline", stages);
        }
        if let Some(timeseries) = &self.timeseries {
            document.insert("timeseries", timeseries.clone());
        }
        if let Some(collation) = &self.collation {
            document.insert("collation", collation.clone());
        }
        if let Some(concern) = &self.write_concern {
            document.insert("writeConcern", concern.to_document());
        }
        document
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use mongodb::options::Acknowledgment;
    use rstest::rstest;

    use super::*;
    use crate::commands::options as server;

    // Every builder output must be accepted by the broker's own option
    // parsing; these tests close the loop between the two sides.

    #[rstest]
    fn write_concern_round_trips_through_the_server_parser() {
        let concern = WriteConcern {
            journal: Some(true),
            acknowledge_level: Some(AcknowledgeLevel::Majority),
            timeout: Some(Duration::from_millis(1500)),
            ..WriteConcern::default()
        };
        let parsed = server::write_concern(&concern.to_document()).expect("parse");
        assert_eq!(parsed.journal, Some(true));
        assert_eq!(parsed.w, Some(Acknowledgment::Majority));
        assert_eq!(parsed.w_timeout, Some(Duration::from_millis(1500)));
    }

    #[rstest]
    fn unacknowledged_level_survives_the_round_trip() {
        let concern = WriteConcern {
            acknowledge_level: Some(AcknowledgeLevel::Unacknowledged),
            ..WriteConcern::default()
        };
        let parsed = server::write_concern(&concern.to_document()).expect("parse");
        assert!(!server::acknowledged(Some(&parsed)));
    }

    #[rstest]
    fn find_options_round_trip_through_the_server_parser() {
        let options = Find {
            batch_size: Some(16),
            limit: Some(25),
            max_time: Some(Duration::from_millis(250)),
            projection: Some(doc! { "key": 1 }),
            read_preference: Some(ReadPreferenceMode::SecondaryPreferred),
            skip: Some(5),
            sort: Some(doc! { "key": -1 }),
            ..Find::default()
        };
        let parsed = server::find(Some(&options.to_document())).expect("parse");
        assert_eq!(parsed.batch_size, Some(16));
        assert_eq!(parsed.limit, Some(25));
        assert_eq!(parsed.max_time, Some(Duration::from_millis(250)));
        assert_eq!(parsed.projection, Some(doc! { "key": 1 }));
        assert!(parsed.selection_criteria.is_some());
        assert_eq!(parsed.skip, Some(5));
        assert_eq!(parsed.sort, Some(doc! { "key": -1 }));
    }

    #[rstest]
    fn insert_options_round_trip_through_the_server_parser() {
        let options = Insert {
            bypass_validation: Some(true),
            ordered: Some(true),
            write_concern: Some(WriteConcern {
                nodes: Some(2),
                ..WriteConcern::default()
            }),
        };
        let parsed = server::insert_one(Some(&options.to_document())).expect("parse");
        assert_eq!(parsed.bypass_document_validation, Some(true));
        let concern = parsed.write_concern.expect("write concern");
        assert_eq!(concern.w, Some(Acknowledgment::Nodes(2)));
    }

    #[rstest]
    fn update_options_round_trip_through_the_server_parser() {
        let options = Update {
            upsert: Some(true),
            array_filters: Some(vec![doc! { "element.grade": { "$gte": 85 } }]),
            ..Update::default()
        };
        let parsed = server::update(Some(&options.to_document())).expect("parse");
        assert_eq!(parsed.upsert, Some(true));
        assert_eq!(
            parsed.array_filters,
            Some(vec![doc! { "element.grade": { "$gte": 85 } }])
        );
    }

    #[rstest]
    fn index_options_round_trip_through_the_server_parser() {
        let options = Index {
            name: Some("ttl_idx".to_owned()),
            unique: Some(true),
            expire_after: Some(Duration::from_secs(3600)),
            ..Index::default()
        };
        let parsed = server::index(Some(&options.to_document())).expect("parse");
        assert_eq!(parsed.name.as_deref(), Some("ttl_idx"));
        assert_eq!(parsed.unique, Some(true));
        assert_eq!(parsed.expire_after, Some(Duration::from_secs(3600)));
    }

    #[rstest]
    fn create_collection_options_round_trip_through_the_server_parser() {
        let options = CreateCollection {
            capped: Some(true),
            size: Some(1024),
            validation_level: Some("moderate".to_owned()),
            view_on: Some("source".to_owned()),
            pipeline: Some(vec![doc! { "$match": { "active": true } }]),
            ..CreateCollection::default()
        };
        let parsed = server::create_collection(Some(&options.to_document())).expect("parse");
        assert_eq!(parsed.capped, Some(true));
        assert_eq!(parsed.size, Some(1024));
        assert!(parsed.validation_level.is_some());
        assert_eq!(parsed.view_on.as_deref(), Some("source"));
        assert_eq!(parsed.pipeline.map(|stages| stages.len()), Some(1));
    }

    #[rstest]
    fn empty_builders_produce_empty_documents() {
        assert!(Find::default().to_document().is_empty());
        assert!(Insert::default().to_document().is_empty());
        assert!(Update::default().to_document().is_empty());
        assert!(Delete::default().to_document().is_empty());
        assert!(Count::default().to_document().is_empty());
        assert!(Index::default().to_document().is_empty());
        assert!(CreateCollection::default().to_document().is_empty());
    }
}
