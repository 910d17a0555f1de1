//! ObjectId generation helpers.

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};

/// Generate an `ObjectId` whose embedded timestamp equals `at`.
///
/// The four leading bytes of an `ObjectId` hold seconds since the UNIX
/// epoch; the random machine/process tail of a freshly generated id is
/// kept so uniqueness guarantees are unaffected. Instants outside the
/// representable range saturate.
#[must_use]
pub fn object_id_at(at: DateTime<Utc>) -> ObjectId {
    let seconds = at.timestamp().clamp(0, i64::from(u32::MAX));
    let mut bytes = ObjectId::new().bytes();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let seconds = seconds as u32;
    bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
    ObjectId::from_bytes(bytes)
}
