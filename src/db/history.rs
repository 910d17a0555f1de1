//! Version-history record writer.
//!
//! Every successful mutation of a user document appends exactly one record
//! to the configured history collection: the point-in-time snapshot chosen
//! by the caller (post-state for create/update/replace, pre-state for
//! delete), the source namespace, the action tag, and any request
//! metadata. Writes reuse the caller's session so transactional semantics
//! apply where the backing store provides them.

use bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::ClientSession;
use tracing::info;

use super::{Store, StoreError};

/// Append one version-history record and return its id.
///
/// # Errors
/// Returns the storage failure when the history insert is rejected; the
/// caller decides whether that poisons the enclosing operation.
#[must_use = "handle the result"]
pub async fn record(
    store: &Store,
    session: &mut ClientSession,
    database: &str,
    collection: &str,
    action: &str,
    snapshot: &Document,
    metadata: Option<&Document>,
) -> Result<ObjectId, StoreError> {
    let id = ObjectId::new();
    let mut entry = doc! {
        "_id": id,
        "database": database,
        "collection": collection,
        "action": action,
        "entity": snapshot.clone(),
        "created": bson::DateTime::now(),
    };
    if let Some(metadata) = metadata {
        entry.insert("metadata", metadata.clone());
    }
    store
        .history_collection()
        .insert_one_with_session(entry, None, session)
        .await?;
    let entity = snapshot.get("_id").cloned().unwrap_or(Bson::Null);
    info!("created version {id} for {database}:{collection}:{entity}");
    Ok(id)
}

/// The history pointer document returned to clients after a mutation.
#[must_use]
pub fn pointer(store: &Store, history_id: ObjectId, entity: &Bson) -> Document {
    let location = store.history_location();
    doc! {
        "_id": history_id,
        "database": &location.database,
        "collection": &location.collection,
        "entity": entity.clone(),
    }
}
