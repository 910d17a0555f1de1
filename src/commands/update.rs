//! The three accepted update shapes: merge-by-id, replace, and
//! update-many.

use bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::ClientSession;
use tracing::{info, warn};

use super::{crud, options, HandlerError};
use crate::db::{history, Store};
use crate::fields::{field, field_if_exists};
use crate::protocol::Request;

/// Build the `$set` operation from a payload document, excluding the
/// primary key.
fn set_document(source: &Document) -> Document {
    let mut set = Document::new();
    for (key, value) in source {
        if key == "_id" {
            continue;
        }
        set.insert(key.clone(), value.clone());
    }
    doc! { "$set": set }
}

/// Read back the mutated document, append its history record, and build
/// the `{ document, history }` response.
async fn read_back_and_version(
    store: &Store,
    request: &Request,
    filter: Document,
    action: &str,
    session: &mut ClientSession,
) -> Result<Document, HandlerError> {
    let found = store
        .collection(&request.database, &request.collection)
        .find_one_with_session(filter, None, session)
        .await?;
    let Some(current) = found else {
        return Err(HandlerError::NotFound);
    };
    if request.skip_version {
        return Ok(doc! { "skipVersion": true });
    }
    let history_id = match history::record(
        store,
        session,
        &request.database,
        &request.collection,
        action,
        &current,
        request.metadata.as_ref(),
    )
    .await
    {
        Ok(id) => id,
        Err(error) => {
            warn!(
                "unable to create version for {} on {}:{}: {error}",
                action, request.database, request.collection
            );
            return Err(HandlerError::VersionFailed);
        }
    };
    let entity = current.get("_id").cloned().unwrap_or(Bson::Null);
    let pointer = history::pointer(store, history_id, &entity);
    Ok(doc! { "document": current, "history": pointer })
}

/// Merge-by-id: apply the payload's fields to the single matched record.
async fn update_by_id(
    store: &Store,
    request: &Request,
    id: ObjectId,
    session: &mut ClientSession,
) -> Result<Document, HandlerError> {
    let opts = options::update(request.options.as_ref())?;
    let acknowledged = options::acknowledged(opts.write_concern.as_ref());
    let updated = store
        .collection(&request.database, &request.collection)
        .update_one_with_session(
            doc! { "_id": id },
            set_document(&request.document),
            Some(opts),
            session,
        )
        .await;
    if let Err(error) = updated {
        if acknowledged {
            warn!(
                "unable to update document {}:{}:{id}: {error}",
                request.database, request.collection
            );
            return Err(HandlerError::Update);
        }
    }
    info!(
        "updated document {}:{}:{id}",
        request.database, request.collection
    );
    read_back_and_version(store, request, doc! { "_id": id }, "update", session).await
}

/// Replace: swap the first record matched by `document.filter` for
/// `document.replace`.
async fn replace_one(
    store: &Store,
    request: &Request,
    filter: &Document,
    replacement: &Document,
    session: &mut ClientSession,
) -> Result<Document, HandlerError> {
    let opts = options::replace(request.options.as_ref())?;
    let acknowledged = options::acknowledged(opts.write_concern.as_ref());
    let replaced = store
        .collection(&request.database, &request.collection)
        .replace_one_with_session(filter.clone(), replacement.clone(), Some(opts), session)
        .await;
    if let Err(error) = replaced {
        if acknowledged {
            warn!(
                "unable to replace document in {}:{} with filter {filter}: {error}",
                request.database, request.collection
            );
            return Err(HandlerError::Update);
        }
    }
    info!(
        "replaced document in {}:{} with filter {filter}",
        request.database, request.collection
    );
    read_back_and_version(store, request, filter.clone(), "replace", session).await
}

/// Update-many: apply the `$set` form of `document.update` to every match
/// and version each post-state.
async fn update_many(
    store: &Store,
    request: &Request,
    filter: &Document,
    changes: &Document,
    session: &mut ClientSession,
) -> Result<Document, HandlerError> {
    let opts = options::update(request.options.as_ref())?;
    let acknowledged = options::acknowledged(opts.write_concern.as_ref());
    let updated = store
        .collection(&request.database, &request.collection)
        .update_many_with_session(filter.clone(), set_document(changes), Some(opts), session)
        .await;
    if let Err(error) = updated {
        if acknowledged {
            warn!(
                "unable to update documents in {}:{} with filter {filter}: {error}",
                request.database, request.collection
            );
            return Err(HandlerError::Update);
        }
    }

    let matched = crud::collect(
        store,
        &request.database,
        &request.collection,
        filter.clone(),
        options::find(None)?,
        session,
    )
    .await?;

    let mut success = Vec::new();
    let mut failure = Vec::new();
    let mut versions = Vec::new();
    for current in &matched {
        let entity = current.get("_id").cloned().unwrap_or(Bson::Null);
        if request.skip_version {
            success.push(entity);
            continue;
        }
        match history::record(
            store,
            session,
            &request.database,
            &request.collection,
            "update",
            current,
            request.metadata.as_ref(),
        )
        .await
        {
            Ok(history_id) => {
                success.push(entity);
                versions.push(Bson::ObjectId(history_id));
            }
            Err(error) => {
                warn!(
                    "unable to create version for update in {}:{}: {error}",
                    request.database, request.collection
                );
                failure.push(entity);
            }
        }
    }
    Ok(doc! { "success": success, "failure": failure, "history": versions })
}

/// The update mode selected by the payload shape.
enum Mode<'a> {
    ById(ObjectId),
    Replace {
        filter: &'a Document,
        replacement: &'a Document,
    },
    Many {
        filter: &'a Document,
        changes: &'a Document,
    },
}

fn classify(payload: &Document) -> Result<Mode<'_>, HandlerError> {
    if payload.is_empty() {
        return Err(HandlerError::InvalidUpdate);
    }
    if let Some(id) = crud::object_id(payload) {
        return Ok(Mode::ById(id));
    }
    let Some(filter) = field_if_exists::<&Document>(payload, "filter")? else {
        return Err(HandlerError::InvalidUpdate);
    };
    if payload.contains_key("replace") {
        let replacement = field::<&Document>(payload, "replace")?;
        return Ok(Mode::Replace {
            filter,
            replacement,
        });
    }
    if let Some(changes) = field_if_exists::<&Document>(payload, "update")? {
        return Ok(Mode::Many { filter, changes });
    }
    Err(HandlerError::InvalidUpdate)
}

/// `update`: select the update mode from the payload shape.
pub(crate) async fn update(store: &Store, request: &Request) -> Result<Document, HandlerError> {
    let mode = classify(&request.document)?;
    let mut session = store.acquire().await?;
    match mode {
        Mode::ById(id) => update_by_id(store, request, id, &mut session).await,
        Mode::Replace {
            filter,
            replacement,
        } => replace_one(store, request, filter, replacement, &mut session).await,
        Mode::Many { filter, changes } => {
            update_many(store, request, filter, changes, &mut session).await
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn set_document_excludes_the_primary_key() {
        let source = doc! { "_id": ObjectId::new(), "key": "value", "count": 2 };
        let set = set_document(&source);
        let inner = set.get_document("$set").expect("set operation");
        assert!(!inner.contains_key("_id"));
        assert_eq!(inner.get_str("key").expect("key"), "value");
        assert_eq!(inner.get_i32("count").expect("count"), 2);
    }

    #[rstest]
    fn classify_selects_the_three_modes() {
        assert!(matches!(
            classify(&doc! { "_id": ObjectId::new(), "k": 1 }),
            Ok(Mode::ById(_))
        ));
        assert!(matches!(
            classify(&doc! { "filter": { "k": 1 }, "replace": { "k": 2 } }),
            Ok(Mode::Replace { .. })
        ));
        assert!(matches!(
            classify(&doc! { "filter": { "k": 1 }, "update": { "k": 2 } }),
            Ok(Mode::Many { .. })
        ));
    }

    #[rstest]
    #[case(doc! {})]
    #[case(doc! { "key": "value" })]
    #[case(doc! { "filter": { "k": 1 } })]
    #[case(doc! { "replace": { "k": 2 } })]
    fn classify_rejects_other_shapes(#[case] payload: Document) {
        assert!(matches!(
            classify(&payload),
            Err(HandlerError::InvalidUpdate)
        ));
    }
}
