//! Translation of wire-format option documents into driver options.
//!
//! Requests carry an optional `options` sub-document per action. Every
//! recognised key maps onto the corresponding driver option; unknown keys
//! are ignored, mistyped values surface as errors so the caller can answer
//! with a diagnostic rather than silently dropping the option.

use std::time::Duration;

use bson::{Bson, Document};
use mongodb::options::{
    Acknowledgment, AggregateOptions, Collation, CountOptions, CreateCollectionOptions,
    DeleteOptions, DistinctOptions, FindOneOptions, FindOptions, Hint, IndexOptions,
    InsertOneOptions, ReadPreference, ReplaceOptions, SelectionCriteria, UpdateOptions,
    WriteConcern,
};

use crate::fields::{field_if_exists, FieldError};

fn mismatch(field: &str, expected: &'static str) -> FieldError {
    FieldError::Mismatch {
        field: field.to_owned(),
        expected,
    }
}

fn duration_ms(options: &Document, key: &str) -> Result<Option<Duration>, FieldError> {
    Ok(field_if_exists::<i64>(options, key)?
        .map(|ms| Duration::from_millis(ms.max(0).unsigned_abs())))
}

fn collation(options: &Document, key: &str) -> Result<Option<Collation>, FieldError> {
    match field_if_exists::<&Document>(options, key)? {
        Some(doc) => bson::from_document::<Collation>(doc.clone())
            .map(Some)
            .map_err(|_| mismatch(key, "collation document")),
        None => Ok(None),
    }
}

fn hint(options: &Document, key: &str) -> Result<Option<Hint>, FieldError> {
    match options.get(key) {
        Some(Bson::Document(keys)) => Ok(Some(Hint::Keys(keys.clone()))),
        Some(Bson::String(name)) => Ok(Some(Hint::Name(name.clone()))),
        Some(_) => Err(mismatch(key, "document or string")),
        None => Ok(None),
    }
}

/// Map the numeric wire read-preference mode onto selection criteria.
fn read_preference(options: &Document) -> Result<Option<SelectionCriteria>, FieldError> {
    let Some(mode) = field_if_exists::<i32>(options, "readPreference")? else {
        return Ok(None);
    };
    let preference = match mode {
        0 => ReadPreference::Primary,
        1 => ReadPreference::PrimaryPreferred {
            options: Default::default(),
        },
        2 => ReadPreference::Secondary {
            options: Default::default(),
        },
        3 => ReadPreference::SecondaryPreferred {
            options: Default::default(),
        },
        4 => ReadPreference::Nearest {
            options: Default::default(),
        },
        _ => return Err(mismatch("readPreference", "mode in 0..=4")),
    };
    Ok(Some(SelectionCriteria::ReadPreference(preference)))
}

/// Build a write concern from the wire representation.
///
/// The numeric `acknowledgeLevel` mirrors the legacy client enumeration:
/// 1 majority, 3 unacknowledged, 4 acknowledged; absent levels default to
/// majority.
///
/// # Errors
/// Propagates type mismatches on any recognised key.
pub fn write_concern(options: &Document) -> Result<WriteConcern, FieldError> {
    let mut concern = WriteConcern::builder().build();
    if let Some(level) = field_if_exists::<i32>(options, "acknowledgeLevel")? {
        concern.w = Some(match level {
            3 => Acknowledgment::Nodes(0),
            4 => Acknowledgment::Nodes(1),
            _ => Acknowledgment::Majority,
        });
    } else {
        concern.w = Some(Acknowledgment::Majority);
    }
    if let Some(nodes) = field_if_exists::<i32>(options, "nodes")? {
        concern.w = Some(Acknowledgment::Nodes(nodes.max(0).unsigned_abs()));
    }
    if let Some(tag) = field_if_exists::<&str>(options, "tag")? {
        concern.w = Some(Acknowledgment::Custom(tag.to_owned()));
    }
    if let Some(journal) = field_if_exists::<bool>(options, "journal")? {
        concern.journal = Some(journal);
    }
    if let Some(timeout) = duration_ms(options, "timeout")? {
        concern.w_timeout = Some(timeout);
    }
    if let Some(timeout) = duration_ms(options, "majority")? {
        concern.w = Some(Acknowledgment::Majority);
        concern.w_timeout = Some(timeout);
    }
    Ok(concern)
}

pub(crate) fn write_concern_of(options: &Document) -> Result<Option<WriteConcern>, FieldError> {
    match field_if_exists::<&Document>(options, "writeConcern")? {
        Some(doc) => Ok(Some(write_concern(doc)?)),
        None => Ok(None),
    }
}

/// Whether a write under this concern reports acknowledgement.
#[must_use]
pub fn acknowledged(concern: Option<&WriteConcern>) -> bool {
    concern.map_or(true, |c| !matches!(c.w, Some(Acknowledgment::Nodes(0))))
}

/// Options for multi-document queries.
///
/// # Errors
/// Propagates type mismatches on any recognised key.
pub fn find(options: Option<&Document>) -> Result<FindOptions, FieldError> {
    let mut opts = FindOptions::builder().build();
    let Some(options) = options else {
        return Ok(opts);
    };
    opts.allow_partial_results = field_if_exists::<bool>(options, "partialResults")?;
    opts.batch_size = field_if_exists::<i32>(options, "batchSize")?.map(|v| v.max(0).unsigned_abs());
    opts.collation = collation(options, "collation")?;
    opts.comment = field_if_exists::<String>(options, "comment")?;
    opts.hint = hint(options, "hint")?;
    opts.limit = field_if_exists::<i64>(options, "limit")?;
    opts.max = field_if_exists::<&Document>(options, "max")?.cloned();
    opts.max_time = duration_ms(options, "maxTime")?;
    opts.min = field_if_exists::<&Document>(options, "min")?.cloned();
    opts.projection = field_if_exists::<&Document>(options, "projection")?.cloned();
    opts.selection_criteria = read_preference(options)?;
    opts.return_key = field_if_exists::<bool>(options, "returnKey")?;
    opts.show_record_id = field_if_exists::<bool>(options, "showRecordId")?;
    opts.skip = field_if_exists::<i64>(options, "skip")?.map(|v| v.max(0).unsigned_abs());
    opts.sort = field_if_exists::<&Document>(options, "sort")?.cloned();
    Ok(opts)
}

/// Single-document variant of [`find`].
///
/// # Errors
/// Propagates type mismatches on any recognised key.
pub fn find_one(options: Option<&Document>) -> Result<FindOneOptions, FieldError> {
    let source = find(options)?;
    let mut opts = FindOneOptions::builder().build();
    opts.allow_partial_results = source.allow_partial_results;
    opts.collation = source.collation;
    opts.comment = source.comment;
    opts.hint = source.hint;
    opts.max = source.max;
    opts.max_time = source.max_time;
    opts.min = source.min;
    opts.projection = source.projection;
    opts.selection_criteria = source.selection_criteria;
    opts.return_key = source.return_key;
    opts.show_record_id = source.show_record_id;
    opts.skip = source.skip;
    opts.sort = source.sort;
    Ok(opts)
}

/// Options for single-document inserts.
///
/// # Errors
/// Propagates type mismatches on any recognised key.
pub fn insert_one(options: Option<&Document>) -> Result<InsertOneOptions, FieldError> {
    let mut opts = InsertOneOptions::builder().build();
    let Some(options) = options else {
        return Ok(opts);
    };
    opts.bypass_document_validation = field_if_exists::<bool>(options, "bypassValidation")?;
    opts.write_concern = write_concern_of(options)?;
    Ok(opts)
}

/// Options for update operations.
///
/// # Errors
/// Propagates type mismatches on any recognised key.
pub fn update(options: Option<&Document>) -> Result<UpdateOptions, FieldError> {
    let mut opts = UpdateOptions::builder().build();
    let Some(options) = options else {
        return Ok(opts);
    };
    opts.bypass_document_validation = field_if_exists::<bool>(options, "bypassValidation")?;
    opts.collation = collation(options, "collation")?;
    opts.upsert = field_if_exists::<bool>(options, "upsert")?;
    opts.write_concern = write_concern_of(options)?;
    if let Some(filters) = field_if_exists::<&Vec<Bson>>(options, "arrayFilters")? {
        let filters: Vec<Document> = filters
            .iter()
            .filter_map(|entry| entry.as_document().cloned())
            .collect();
        opts.array_filters = Some(filters);
    }
    Ok(opts)
}

/// Options for replace operations.
///
/// # Errors
/// Propagates type mismatches on any recognised key.
pub fn replace(options: Option<&Document>) -> Result<ReplaceOptions, FieldError> {
    let mut opts = ReplaceOptions::builder().build();
    let Some(options) = options else {
        return Ok(opts);
    };
    opts.bypass_document_validation = field_if_exists::<bool>(options, "bypassValidation")?;
    opts.collation = collation(options, "collation")?;
    opts.upsert = field_if_exists::<bool>(options, "upsert")?;
    opts.write_concern = write_concern_of(options)?;
    Ok(opts)
}

/// Options for delete operations.
///
/// # Errors
/// Propagates type mismatches on any recognised key.
pub fn delete(options: Option<&Document>) -> Result<DeleteOptions, FieldError> {
    let mut opts = DeleteOptions::builder().build();
    let Some(options) = options else {
        return Ok(opts);
    };
    opts.collation = collation(options, "collation")?;
    opts.write_concern = write_concern_of(options)?;
    Ok(opts)
}

/// Options for count operations.
///
/// # Errors
/// Propagates type mismatches on any recognised key.
pub fn count(options: Option<&Document>) -> Result<CountOptions, FieldError> {
    let mut opts = CountOptions::builder().build();
    let Some(options) = options else {
        return Ok(opts);
    };
    opts.collation = collation(options, "collation")?;
    opts.hint = hint(options, "hint")?;
    opts.limit = field_if_exists::<i64>(options, "limit")?.map(|v| v.max(0).unsigned_abs());
    opts.max_time = duration_ms(options, "maxTime")?;
    opts.skip = field_if_exists::<i64>(options, "skip")?.map(|v| v.max(0).unsigned_abs());
    opts.selection_criteria = read_preference(options)?;
    Ok(opts)
}

/// Options for distinct operations.
///
/// # Errors
/// Propagates type mismatches on any recognised key.
pub fn distinct(options: Option<&Document>) -> Result<DistinctOptions, FieldError> {
    let mut opts = DistinctOptions::builder().build();
    let Some(options) = options else {
        return Ok(opts);
    };
    opts.collation = collation(options, "collation")?;
    opts.max_time = duration_ms(options, "maxTime")?;
    opts.selection_criteria = read_preference(options)?;
    Ok(opts)
}

/// Options for aggregation pipelines.
///
/// # Errors
/// Propagates type mismatches on any recognised key.
pub fn aggregate(options: Option<&Document>) -> Result<AggregateOptions, FieldError> {
    let mut opts = AggregateOptions::builder().build();
    let Some(options) = options else {
        return Ok(opts);
    };
    opts.allow_disk_use = field_if_exists::<bool>(options, "allowDiskUse")?;
    opts.batch_size = field_if_exists::<i32>(options, "batchSize")?.map(|v| v.max(0).unsigned_abs());
    opts.collation = collation(options, "collation")?;
    opts.hint = hint(options, "hint")?;
    opts.max_time = duration_ms(options, "maxTime")?;
    opts.selection_criteria = read_preference(options)?;
    Ok(opts)
}

/// Options for index creation.
///
/// # Errors
/// Propagates type mismatches on any recognised key.
pub fn index(options: Option<&Document>) -> Result<IndexOptions, FieldError> {
    let mut opts = IndexOptions::builder().build();
    let Some(options) = options else {
        return Ok(opts);
    };
    opts.background = field_if_exists::<bool>(options, "background")?;
    opts.collation = collation(options, "collation")?;
    opts.default_language = field_if_exists::<String>(options, "defaultLanguage")?;
    if let Some(seconds) = field_if_exists::<i64>(options, "expireAfterSeconds")? {
        opts.expire_after = Some(Duration::from_secs(seconds.max(0).unsigned_abs()));
    }
    opts.hidden = field_if_exists::<bool>(options, "hidden")?;
    opts.language_override = field_if_exists::<String>(options, "languageOverride")?;
    opts.name = field_if_exists::<String>(options, "name")?;
    opts.partial_filter_expression =
        field_if_exists::<&Document>(options, "partialFilterExpression")?.cloned();
    opts.sparse = field_if_exists::<bool>(options, "sparse")?;
    opts.unique = field_if_exists::<bool>(options, "unique")?;
    opts.weights = field_if_exists::<&Document>(options, "weights")?.cloned();
    opts.wildcard_projection = field_if_exists::<&Document>(options, "wildcardProjection")?.cloned();
    opts.bits = field_if_exists::<i32>(options, "twodBitsPrecision")?.map(|v| v.max(0).unsigned_abs());
    opts.min = field_if_exists::<f64>(options, "twodLocationMin")?;
    opts.max = field_if_exists::<f64>(options, "twodLocationMax")?;
    Ok(opts)
}

/// Options for collection creation.
///
/// # Errors
/// Propagates type mismatches on any recognised key.
pub fn create_collection(options: Option<&Document>) -> Result<CreateCollectionOptions, FieldError> {
    use mongodb::options::{
        ChangeStreamPreAndPostImages, ClusteredIndex, TimeseriesOptions, ValidationAction,
        ValidationLevel,
    };

    let mut opts = CreateCollectionOptions::builder().build();
    let Some(options) = options else {
        return Ok(opts);
    };
    opts.capped = field_if_exists::<bool>(options, "capped")?;
    opts.size = field_if_exists::<i64>(options, "size")?.map(|v| v.max(0).unsigned_abs());
    opts.max = field_if_exists::<i64>(options, "max")?.map(|v| v.max(0).unsigned_abs());
    opts.collation = collation(options, "collation")?;
    opts.write_concern = write_concern_of(options)?;
    opts.validator = field_if_exists::<&Document>(options, "validator")?.cloned();
    opts.validation_level = match field_if_exists::<&str>(options, "validationLevel")? {
        Some("off") => Some(ValidationLevel::Off),
        Some("strict") => Some(ValidationLevel::Strict),
        Some("moderate") => Some(ValidationLevel::Moderate),
        Some(_) => return Err(mismatch("validationLevel", "off, strict, or moderate")),
        None => None,
    };
    opts.validation_action = match field_if_exists::<&str>(options, "validationAction")? {
        Some("error") => Some(ValidationAction::Error),
        Some("warn") => Some(ValidationAction::Warn),
        Some(_) => return Err(mismatch("validationAction", "error or warn")),
        None => None,
    };
    if let Some(seconds) = field_if_exists::<i64>(options, "expireAfterSeconds")? {
        opts.expire_after_seconds = Some(Duration::from_secs(seconds.max(0).unsigned_abs()));
    }
    opts.view_on = field_if_exists::<String>(options, "viewOn")?;
    if let Some(stages) = field_if_exists::<&Vec<Bson>>(options, "pipeline")? {
        let stages: Vec<Document> = stages
            .iter()
            .filter_map(|entry| entry.as_document().cloned())
            .collect();
        opts.pipeline = Some(stages);
    }
    if let Some(doc) = field_if_exists::<&Document>(options, "timeseries")? {
        let parsed = bson::from_document::<TimeseriesOptions>(doc.clone())
            .map_err(|_| mismatch("timeseries", "timeseries options document"))?;
        opts.timeseries = Some(parsed);
    }
    if let Some(doc) = field_if_exists::<&Document>(options, "changeStreamPreAndPostImages")? {
        let parsed = bson::from_document::<ChangeStreamPreAndPostImages>(doc.clone())
            .map_err(|_| mismatch("changeStreamPreAndPostImages", "change stream document"))?;
        opts.change_stream_pre_and_post_images = Some(parsed);
    }
    if let Some(doc) = field_if_exists::<&Document>(options, "clusteredIndex")? {
        let parsed = bson::from_document::<ClusteredIndex>(doc.clone())
            .map_err(|_| mismatch("clusteredIndex", "clustered index document"))?;
        opts.clustered_index = Some(parsed);
    }
    Ok(opts)
}
