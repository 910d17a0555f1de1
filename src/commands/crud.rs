//! Create, retrieve, count, distinct, and pipeline handlers.

use bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::ClientSession;
use tracing::{info, warn};

use super::{options, HandlerError};
use crate::db::{history, Store};
use crate::fields::{field, field_if_exists};
use crate::protocol::Request;

/// The payload document's `_id` when it is an `ObjectId`.
pub(crate) fn object_id(document: &Document) -> Option<ObjectId> {
    match document.get("_id") {
        Some(Bson::ObjectId(id)) => Some(*id),
        _ => None,
    }
}

pub(crate) fn documents_to_bson(documents: Vec<Document>) -> Bson {
    Bson::Array(documents.into_iter().map(Bson::Document).collect())
}

/// Run a multi-document query on the caller's session and collect the
/// results.
pub(crate) async fn collect(
    store: &Store,
    database: &str,
    collection: &str,
    filter: Document,
    opts: FindOptions,
    session: &mut ClientSession,
) -> Result<Vec<Document>, HandlerError> {
    let mut cursor = store
        .collection(database, collection)
        .find_with_session(filter, Some(opts), session)
        .await?;
    let mut results = Vec::new();
    while let Some(entry) = cursor.next(session).await {
        results.push(entry?);
    }
    Ok(results)
}

async fn retrieve_one(
    store: &Store,
    request: &Request,
    id: ObjectId,
    session: &mut ClientSession,
) -> Result<Document, HandlerError> {
    let opts = options::find_one(request.options.as_ref())?;
    let found = store
        .collection(&request.database, &request.collection)
        .find_one_with_session(doc! { "_id": id }, Some(opts), session)
        .await?;
    match found {
        Some(result) => Ok(doc! { "result": result }),
        None => {
            warn!(
                "document not found: {}:{}:{id}",
                request.database, request.collection
            );
            Err(HandlerError::NotFound)
        }
    }
}

/// `retrieve`: single-document lookup when the filter carries an id,
/// multi-document query otherwise.
pub(crate) async fn retrieve(store: &Store, request: &Request) -> Result<Document, HandlerError> {
    if request.document.is_empty() {
        return Err(HandlerError::missing("document"));
    }
    let mut session = store.acquire().await?;
    if let Some(id) = object_id(&request.document) {
        return retrieve_one(store, request, id, &mut session).await;
    }
    let opts = options::find(request.options.as_ref())?;
    let results = collect(
        store,
        &request.database,
        &request.collection,
        request.document.clone(),
        opts,
        &mut session,
    )
    .await?;
    Ok(doc! { "results": documents_to_bson(results) })
}

/// `create`: insert the payload document and append its version-history
/// record.
pub(crate) async fn create(store: &Store, request: &Request) -> Result<Document, HandlerError> {
    let Some(id) = object_id(&request.document) else {
        warn!(
            "document id not specified for create on {}:{}",
            request.database, request.collection
        );
        return Err(HandlerError::MissingId);
    };
    let opts = options::insert_one(request.options.as_ref())?;
    let acknowledged = options::acknowledged(opts.write_concern.as_ref());

    let mut session = store.acquire().await?;
    let inserted = store
        .collection(&request.database, &request.collection)
        .insert_one_with_session(request.document.clone(), Some(opts), &mut session)
        .await;
    if let Err(error) = inserted {
        if acknowledged {
            warn!(
                "unable to create document {}:{}:{id}: {error}",
                request.database, request.collection
            );
            return Err(HandlerError::Insert);
        }
    }
    info!(
        "created document {}:{}:{id}",
        request.database, request.collection
    );

    if request.skip_version {
        return Ok(doc! { "entity": id, "skipVersion": true });
    }
    match history::record(
        store,
        &mut session,
        &request.database,
        &request.collection,
        "create",
        &request.document,
        request.metadata.as_ref(),
    )
    .await
    {
        Ok(history_id) => Ok(history::pointer(store, history_id, &Bson::ObjectId(id))),
        Err(error) => {
            warn!(
                "unable to create version for {}:{}:{id}: {error}",
                request.database, request.collection
            );
            Err(HandlerError::VersionFailed)
        }
    }
}

/// `createTimeseries`: insert a point into a timeseries collection.
/// Timeseries points carry no client id requirement and are never
/// versioned.
pub(crate) async fn create_timeseries(
    store: &Store,
    request: &Request,
) -> Result<Document, HandlerError> {
    let opts = options::insert_one(request.options.as_ref())?;
    let mut session = store.acquire().await?;
    let inserted = store
        .collection(&request.database, &request.collection)
        .insert_one_with_session(request.document.clone(), Some(opts), &mut session)
        .await?;
    info!(
        "created timeseries point {}:{}:{}",
        request.database, request.collection, inserted.inserted_id
    );
    Ok(doc! { "_id": inserted.inserted_id })
}

/// `count`: number of documents matching the filter.
pub(crate) async fn count(store: &Store, request: &Request) -> Result<Document, HandlerError> {
    let opts = options::count(request.options.as_ref())?;
    let mut session = store.acquire().await?;
    let total = store
        .collection(&request.database, &request.collection)
        .count_documents_with_session(request.document.clone(), Some(opts), &mut session)
        .await?;
    Ok(doc! { "count": i64::try_from(total).unwrap_or(i64::MAX) })
}

/// `distinct`: distinct values of `document.field` under
/// `document.filter`.
pub(crate) async fn distinct(store: &Store, request: &Request) -> Result<Document, HandlerError> {
    let field_name = field::<&str>(&request.document, "field")
        .map_err(|_| HandlerError::missing("document.field"))?;
    let filter = field_if_exists::<&Document>(&request.document, "filter")?.cloned();
    let opts = options::distinct(request.options.as_ref())?;
    let mut session = store.acquire().await?;
    let values = store
        .collection(&request.database, &request.collection)
        .distinct_with_session(field_name, filter, Some(opts), &mut session)
        .await?;
    Ok(doc! { "values": values })
}

/// `pipeline`: read-only aggregation described by
/// `document.specification`.
pub(crate) async fn pipeline(store: &Store, request: &Request) -> Result<Document, HandlerError> {
    let stages = field::<&Vec<Bson>>(&request.document, "specification")
        .map_err(|_| HandlerError::missing("document.specification"))?;
    let mut specification = Vec::with_capacity(stages.len());
    for stage in stages {
        match stage.as_document() {
            Some(stage) => specification.push(stage.clone()),
            None => return Err(HandlerError::Message("Invalid pipeline stage".to_owned())),
        }
    }
    let opts = options::aggregate(request.options.as_ref())?;
    let mut session = store.acquire().await?;
    let mut cursor = store
        .collection(&request.database, &request.collection)
        .aggregate_with_session(specification, Some(opts), &mut session)
        .await?;
    let mut results = Vec::new();
    while let Some(entry) = cursor.next(&mut session).await {
        results.push(entry?);
    }
    Ok(doc! { "results": documents_to_bson(results) })
}
