//! Collection and index lifecycle handlers.
//!
//! Collection renames and drops keep the version-history collection
//! consistent: matching history records are updated or removed by an
//! out-of-band task whose outcome does not affect the synchronous
//! response.

use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::options::DropCollectionOptions;
use mongodb::IndexModel;
use tracing::{info, warn};

use super::{options, HandlerError};
use crate::db::Store;
use crate::fields::field_if_exists;
use crate::protocol::Request;

/// `index`: create an index from the key specification in `document`.
/// Idempotent: when an equivalent index already exists under another
/// name, that name is returned instead of an error.
pub(crate) async fn index(store: &Store, request: &Request) -> Result<Document, HandlerError> {
    if request.document.is_empty() {
        return Err(HandlerError::missing("document"));
    }
    let keys = request.document.clone();
    let opts = options::index(request.options.as_ref())?;
    let collection = store.collection(&request.database, &request.collection);
    let model = IndexModel::builder()
        .keys(keys.clone())
        .options(Some(opts))
        .build();
    match collection.create_index(model, None).await {
        Ok(created) => {
            info!(
                "created index {} on {}:{}",
                created.index_name, request.database, request.collection
            );
            Ok(doc! { "name": created.index_name })
        }
        Err(error) => {
            let mut indexes = collection.list_indexes(None).await?;
            while let Some(existing) = indexes.try_next().await? {
                if existing.keys == keys {
                    if let Some(name) = existing.options.and_then(|options| options.name) {
                        info!(
                            "index on {}:{} already exists as {name}",
                            request.database, request.collection
                        );
                        return Ok(doc! { "name": name });
                    }
                }
            }
            Err(error.into())
        }
    }
}

/// `dropIndex`: drop by `document.name` or by `document.specification`.
pub(crate) async fn drop_index(store: &Store, request: &Request) -> Result<Document, HandlerError> {
    let collection = store.collection(&request.database, &request.collection);
    if let Some(name) = field_if_exists::<&str>(&request.document, "name")? {
        collection.drop_index(name.to_owned(), None).await?;
        info!(
            "dropped index {name} on {}:{}",
            request.database, request.collection
        );
        return Ok(doc! { "dropIndex": true });
    }
    let Some(specification) = field_if_exists::<&Document>(&request.document, "specification")?
    else {
        return Err(HandlerError::missing("document.name"));
    };
    let mut indexes = collection.list_indexes(None).await?;
    while let Some(existing) = indexes.try_next().await? {
        if &existing.keys == specification {
            if let Some(name) = existing.options.and_then(|options| options.name) {
                collection.drop_index(name.clone(), None).await?;
                info!(
                    "dropped index {name} on {}:{}",
                    request.database, request.collection
                );
                return Ok(doc! { "dropIndex": true });
            }
        }
    }
    Err(HandlerError::Message("Index not found".to_owned()))
}

/// `createCollection`: create a collection, view, or timeseries
/// collection with the full options surface.
pub(crate) async fn create_collection(
    store: &Store,
    request: &Request,
) -> Result<Document, HandlerError> {
    let opts = options::create_collection(request.options.as_ref())?;
    store
        .client()
        .database(&request.database)
        .create_collection(&request.collection, Some(opts))
        .await?;
    info!(
        "created collection {}:{}",
        request.database, request.collection
    );
    Ok(doc! { "createCollection": true })
}

fn spawn_history_cleanup(store: &Store, database: String, collection: String) {
    let store = store.clone();
    tokio::spawn(async move {
        info!("removing all version history documents for {database}:{collection}");
        let filter = doc! { "database": &database, "collection": &collection };
        match store.history_collection().delete_many(filter, None).await {
            Ok(result) => info!(
                "deleted {} version history document(s) for {database}:{collection}",
                result.deleted_count
            ),
            Err(error) => warn!(
                "error removing version history documents for {database}:{collection}: {error}"
            ),
        }
    });
}

/// `dropCollection`: drop the collection; with
/// `document.clearVersionHistory` the matching history records are
/// removed out-of-band.
pub(crate) async fn drop_collection(
    store: &Store,
    request: &Request,
) -> Result<Document, HandlerError> {
    let mut opts = DropCollectionOptions::builder().build();
    if let Some(source) = request.options.as_ref() {
        opts.write_concern = options::write_concern_of(source)?;
    }
    store
        .collection(&request.database, &request.collection)
        .drop(Some(opts))
        .await?;
    info!(
        "dropped collection {}:{}",
        request.database, request.collection
    );
    if matches!(
        field_if_exists::<bool>(&request.document, "clearVersionHistory"),
        Ok(Some(true))
    ) {
        spawn_history_cleanup(store, request.database.clone(), request.collection.clone());
    }
    Ok(doc! { "dropCollection": true })
}

fn spawn_history_rename(store: &Store, database: String, collection: String, target: String) {
    let store = store.clone();
    tokio::spawn(async move {
        info!(
            "updating version history documents for {database}:{collection} to {database}:{target}"
        );
        let filter = doc! { "database": &database, "collection": &collection };
        let change = doc! { "$set": { "collection": &target } };
        match store.history_collection().update_many(filter, change, None).await {
            Ok(result) => info!(
                "rename matched {} and updated {} history document(s) from {database}:{collection} to {database}:{target}",
                result.matched_count, result.modified_count
            ),
            Err(error) => warn!(
                "error renaming version history documents from {database}:{collection} to {database}:{target}: {error}"
            ),
        }
    });
}

/// `renameCollection`: rename on the source store, then update matching
/// history records out-of-band.
pub(crate) async fn rename_collection(
    store: &Store,
    request: &Request,
) -> Result<Document, HandlerError> {
    let Some(target) = field_if_exists::<&str>(&request.document, "target")? else {
        warn!(
            "no target collection specified for rename of {}:{}",
            request.database, request.collection
        );
        return Err(HandlerError::missing("document.target"));
    };
    let database = store.client().database(&request.database);
    let existing = database
        .list_collection_names(doc! { "name": target })
        .await?;
    if !existing.is_empty() {
        warn!(
            "target collection {target} exists in database {}",
            request.database
        );
        return Err(HandlerError::Message("Target exists in database".to_owned()));
    }

    let mut command = doc! {
        "renameCollection": format!("{}.{}", request.database, request.collection),
        "to": format!("{}.{}", request.database, target),
    };
    if let Some(source) = request.options.as_ref() {
        if let Some(concern) = options::write_concern_of(source)? {
            let serialised = bson::to_bson(&concern)
                .map_err(|error| HandlerError::Unexpected(error.to_string()))?;
            command.insert("writeConcern", serialised);
        }
    }
    store
        .client()
        .database("admin")
        .run_command(command, None)
        .await?;
    info!(
        "renamed collection {}:{} to {}:{target}",
        request.database, request.collection, request.database
    );

    spawn_history_rename(
        store,
        request.database.clone(),
        request.collection.clone(),
        target.to_owned(),
    );
    Ok(doc! { "database": &request.database, "collection": target })
}
