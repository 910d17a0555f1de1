//! Delete handler: version the pre-state, then remove.

use bson::{doc, Bson, Document};
use mongodb::ClientSession;
use tracing::{info, warn};

use super::{crud, options, HandlerError};
use crate::db::{history, Store};
use crate::protocol::Request;

/// Resolve the documents targeted by the delete filter, exactly as
/// `retrieve` resolves them.
async fn targets(
    store: &Store,
    request: &Request,
    session: &mut ClientSession,
) -> Result<Vec<Document>, HandlerError> {
    if let Some(id) = crud::object_id(&request.document) {
        let found = store
            .collection(&request.database, &request.collection)
            .find_one_with_session(doc! { "_id": id }, None, session)
            .await?;
        return Ok(found.into_iter().collect());
    }
    crud::collect(
        store,
        &request.database,
        &request.collection,
        request.document.clone(),
        options::find(None)?,
        session,
    )
    .await
}

/// `delete`: for each resolved document, append the pre-state history
/// record and then remove the document, tracking per-document outcome.
pub(crate) async fn remove(store: &Store, request: &Request) -> Result<Document, HandlerError> {
    let opts = options::delete(request.options.as_ref())?;
    let mut session = store.acquire().await?;
    let resolved = targets(store, request, &mut session).await?;
    if resolved.is_empty() {
        warn!(
            "no documents matched delete on {}:{} with filter {}",
            request.database, request.collection, request.document
        );
        return Err(HandlerError::NotFound);
    }

    let mut success = Vec::new();
    let mut failure = Vec::new();
    let mut versions = Vec::new();
    for current in &resolved {
        let entity = current.get("_id").cloned().unwrap_or(Bson::Null);

        // Pre-state first: a document is only removed once its audit
        // record exists.
        if !request.skip_version {
            match history::record(
                store,
                &mut session,
                &request.database,
                &request.collection,
                "delete",
                current,
                request.metadata.as_ref(),
            )
            .await
            {
                Ok(history_id) => versions.push(history::pointer(store, history_id, &entity)),
                Err(error) => {
                    warn!(
                        "unable to create version before delete on {}:{}:{entity}: {error}",
                        request.database, request.collection
                    );
                    failure.push(entity);
                    continue;
                }
            }
        }

        let deleted = store
            .collection(&request.database, &request.collection)
            .delete_one_with_session(doc! { "_id": entity.clone() }, Some(opts.clone()), &mut session)
            .await;
        match deleted {
            Ok(_) => {
                info!(
                    "deleted document {}:{}:{entity}",
                    request.database, request.collection
                );
                success.push(entity);
            }
            Err(error) => {
                warn!(
                    "unable to delete document {}:{}:{entity}: {error}",
                    request.database, request.collection
                );
                failure.push(entity);
            }
        }
    }

    Ok(doc! {
        "success": success,
        "failure": failure,
        "history": Bson::Array(versions.into_iter().map(Bson::Document).collect()),
    })
}
