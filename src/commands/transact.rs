//! Ordered multi-statement transaction executor.
//!
//! A transaction request carries `document.items`, each item a full
//! sub-request. Items execute in array order inside a single session with
//! a journal-acknowledged, majority write concern regardless of the
//! global default. Any invalid item, unsupported action, or statement
//! failure aborts the transaction. An `update` item is accepted but
//! performs no mutation; the arm is intentionally empty pending a design
//! decision in the protocol.

use std::str::FromStr;

use bson::{doc, Bson, Document};
use mongodb::options::{Acknowledgment, TransactionOptions, WriteConcern};
use mongodb::ClientSession;
use tracing::warn;

use super::{crud, options, HandlerError};
use crate::db::{history, Store};
use crate::fields::{field, field_if_exists};
use crate::protocol::{Action, Request};

#[derive(Default)]
struct Outcome {
    created: i32,
    updated: i32,
    deleted: i32,
    version_created: Vec<Bson>,
    version_deleted: Vec<Bson>,
}

struct Item<'a> {
    action: Action,
    database: &'a str,
    collection: &'a str,
    document: &'a Document,
    metadata: Option<&'a Document>,
    skip_version: bool,
}

fn parse_item(entry: &Bson) -> Result<Item<'_>, HandlerError> {
    let Some(envelope) = entry.as_document() else {
        warn!("transaction item is not a document");
        return Err(HandlerError::Transaction);
    };
    let invalid = |why: &str| {
        warn!("invalid transaction item ({why}): {envelope}");
        HandlerError::Transaction
    };
    let action = field::<&str>(envelope, "action").map_err(|_| invalid("action"))?;
    let action = Action::from_str(action).map_err(|_| invalid("unknown action"))?;
    let database = field::<&str>(envelope, "database").map_err(|_| invalid("database"))?;
    let collection = field::<&str>(envelope, "collection").map_err(|_| invalid("collection"))?;
    let document = field::<&Document>(envelope, "document").map_err(|_| invalid("document"))?;
    let metadata = field_if_exists::<&Document>(envelope, "metadata").unwrap_or_default();
    let skip_version = matches!(
        field_if_exists::<bool>(envelope, "skipVersion"),
        Ok(Some(true))
    );
    Ok(Item {
        action,
        database,
        collection,
        document,
        metadata,
        skip_version,
    })
}

async fn apply(
    store: &Store,
    session: &mut ClientSession,
    item: &Item<'_>,
    outcome: &mut Outcome,
) -> Result<(), HandlerError> {
    if store.is_history(item.database, item.collection) {
        warn!(
            "transaction item targets the version history location {}:{}",
            item.database, item.collection
        );
        return Err(HandlerError::Transaction);
    }
    match item.action {
        Action::Create => {
            if crud::object_id(item.document).is_none() {
                warn!(
                    "transaction create without document id on {}:{}",
                    item.database, item.collection
                );
                return Err(HandlerError::Transaction);
            }
            store
                .collection(item.database, item.collection)
                .insert_one_with_session(item.document.clone(), None, session)
                .await
                .map_err(|error| {
                    warn!("transaction create failed: {error}");
                    HandlerError::Transaction
                })?;
            outcome.created += 1;
            if !item.skip_version {
                let history_id = history::record(
                    store,
                    session,
                    item.database,
                    item.collection,
                    "create",
                    item.document,
                    item.metadata,
                )
                .await
                .map_err(|error| {
                    warn!("transaction history write failed: {error}");
                    HandlerError::Transaction
                })?;
                outcome.version_created.push(Bson::ObjectId(history_id));
            }
        }
        Action::Update => {}
        Action::Delete => {
            if !item.skip_version {
                let matched = crud::collect(
                    store,
                    item.database,
                    item.collection,
                    item.document.clone(),
                    options::find(None)?,
                    session,
                )
                .await?;
                for current in &matched {
                    let history_id = history::record(
                        store,
                        session,
                        item.database,
                        item.collection,
                        "delete",
                        current,
                        item.metadata,
                    )
                    .await
                    .map_err(|error| {
                        warn!("transaction history write failed: {error}");
                        HandlerError::Transaction
                    })?;
                    outcome.version_deleted.push(Bson::ObjectId(history_id));
                }
            }
            let removed = store
                .collection(item.database, item.collection)
                .delete_many_with_session(item.document.clone(), None, session)
                .await
                .map_err(|error| {
                    warn!("transaction delete failed: {error}");
                    HandlerError::Transaction
                })?;
            outcome.deleted += i32::try_from(removed.deleted_count).unwrap_or(i32::MAX);
        }
        _ => {
            warn!("unsupported action {} in transaction item", item.action);
            return Err(HandlerError::Transaction);
        }
    }
    Ok(())
}

/// `transaction`: execute `document.items` in order, committing on
/// end-of-list and aborting on the first failure.
pub(crate) async fn execute(store: &Store, request: &Request) -> Result<Document, HandlerError> {
    let items = field::<&Vec<Bson>>(&request.document, "items")
        .map_err(|_| HandlerError::missing("document.items"))?;
    let mut session = store.acquire().await?;

    let mut concern = WriteConcern::builder().build();
    concern.w = Some(Acknowledgment::Majority);
    concern.journal = Some(true);
    let mut txn = TransactionOptions::builder().build();
    txn.write_concern = Some(concern);
    session.start_transaction(Some(txn)).await.map_err(|error| {
        warn!("error starting transaction: {error}");
        HandlerError::Transaction
    })?;

    let mut outcome = Outcome::default();
    for entry in items {
        let step = match parse_item(entry) {
            Ok(item) => apply(store, &mut session, &item, &mut outcome).await,
            Err(error) => Err(error),
        };
        if let Err(error) = step {
            if let Err(abort) = session.abort_transaction().await {
                warn!("error aborting transaction: {abort}");
                session.invalidate();
            }
            return Err(error);
        }
    }
    if let Err(error) = session.commit_transaction().await {
        warn!("error committing transaction: {error}");
        session.invalidate();
        return Err(HandlerError::Transaction);
    }

    let location = store.history_location();
    Ok(doc! {
        "created": outcome.created,
        "updated": outcome.updated,
        "deleted": outcome.deleted,
        "history": {
            "database": &location.database,
            "collection": &location.collection,
            "created": outcome.version_created,
            "deleted": outcome.version_deleted,
        },
    })
}
