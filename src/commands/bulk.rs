//! Bulk handler: batched inserts followed by batched deletes.

use bson::{doc, Bson, Document};
use mongodb::ClientSession;
use tracing::{info, warn};

use super::{crud, options, HandlerError};
use crate::db::{history, Store};
use crate::fields::field_if_exists;
use crate::protocol::Request;

fn documents(entries: &[Bson]) -> Vec<Document> {
    entries
        .iter()
        .filter_map(|entry| entry.as_document().cloned())
        .collect()
}

async fn insert_batch(
    store: &Store,
    request: &Request,
    batch: Vec<Document>,
    session: &mut ClientSession,
) -> Result<i32, HandlerError> {
    let mut created = 0_i32;
    for document in batch {
        let opts = options::insert_one(request.options.as_ref())?;
        if let Err(error) = store
            .collection(&request.database, &request.collection)
            .insert_one_with_session(document.clone(), Some(opts), session)
            .await
        {
            warn!(
                "unable to create document in bulk on {}:{}: {error}",
                request.database, request.collection
            );
            continue;
        }
        created += 1;
        if !request.skip_version {
            if let Err(error) = history::record(
                store,
                session,
                &request.database,
                &request.collection,
                "create",
                &document,
                request.metadata.as_ref(),
            )
            .await
            {
                warn!(
                    "unable to create version for bulk insert on {}:{}: {error}",
                    request.database, request.collection
                );
            }
        }
    }
    Ok(created)
}

async fn delete_batch(
    store: &Store,
    request: &Request,
    filters: Vec<Document>,
    session: &mut ClientSession,
) -> Result<i32, HandlerError> {
    let mut deleted = 0_i32;
    for filter in filters {
        // Snapshot the matched set for the pre-state audit records before
        // removing anything.
        let matched = crud::collect(
            store,
            &request.database,
            &request.collection,
            filter.clone(),
            options::find(None)?,
            session,
        )
        .await?;
        if !request.skip_version {
            for current in &matched {
                if let Err(error) = history::record(
                    store,
                    session,
                    &request.database,
                    &request.collection,
                    "delete",
                    current,
                    request.metadata.as_ref(),
                )
                .await
                {
                    warn!(
                        "unable to create version for bulk delete on {}:{}: {error}",
                        request.database, request.collection
                    );
                }
            }
        }
        let removed = store
            .collection(&request.database, &request.collection)
            .delete_many_with_session(filter, None, session)
            .await?;
        deleted += i32::try_from(removed.deleted_count).unwrap_or(i32::MAX);
    }
    Ok(deleted)
}

/// `bulk`: process `document.insert` then `document.delete`. The response
/// carries a `create`/`delete` count for each key present in the input.
pub(crate) async fn bulk(store: &Store, request: &Request) -> Result<Document, HandlerError> {
    let inserts = field_if_exists::<&Vec<Bson>>(&request.document, "insert")?;
    let deletes = field_if_exists::<&Vec<Bson>>(&request.document, "delete")?;
    if inserts.is_none() && deletes.is_none() {
        return Err(HandlerError::missing("document.insert"));
    }

    let mut session = store.acquire().await?;
    let mut created = 0_i32;
    let mut deleted = 0_i32;
    if let Some(entries) = inserts {
        created = insert_batch(store, request, documents(entries), &mut session).await?;
        info!(
            "created {created} document(s) in bulk on {}:{}",
            request.database, request.collection
        );
    }
    if let Some(entries) = deletes {
        deleted = delete_batch(store, request, documents(entries), &mut session).await?;
        info!(
            "deleted {deleted} document(s) in bulk on {}:{}",
            request.database, request.collection
        );
    }
    Ok(doc! { "create": created, "delete": deleted })
}
