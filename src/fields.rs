//! Typed field extraction over BSON documents.
//!
//! Request envelopes and option documents arrive as untyped BSON. The
//! helpers here pull individual fields out with the expected type, mapping
//! absence and type mismatches to distinct errors so handlers can answer
//! with a precise error document. One implementation exists per primitive
//! the wire format uses; nested documents and arrays borrow from the
//! source document instead of cloning.

use bson::{oid::ObjectId, Bson, Document};
use thiserror::Error;

/// Errors produced when a field cannot be extracted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    /// The field is absent from the document.
    #[error("missing field {0}")]
    Missing(String),
    /// The field is present with an unexpected BSON type.
    #[error("field {field} is not of type {expected}")]
    Mismatch {
        /// Name of the offending field.
        field: String,
        /// Human-readable name of the expected type.
        expected: &'static str,
    },
}

/// A value extractable from a BSON element.
pub trait FieldValue<'a>: Sized {
    /// Type name reported in mismatch errors.
    const EXPECTED: &'static str;

    /// Extract the value, returning `None` on a type mismatch.
    fn from_bson(value: &'a Bson) -> Option<Self>;
}

impl<'a> FieldValue<'a> for bool {
    const EXPECTED: &'static str = "bool";

    fn from_bson(value: &'a Bson) -> Option<Self> {
        match value {
            Bson::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl<'a> FieldValue<'a> for i32 {
    const EXPECTED: &'static str = "int32";

    fn from_bson(value: &'a Bson) -> Option<Self> {
        match value {
            Bson::Int32(v) => Some(*v),
            _ => None,
        }
    }
}

impl<'a> FieldValue<'a> for i64 {
    const EXPECTED: &'static str = "int64";

    // Widening from int32 is accepted; clients routinely send small
    // numbers as int32 regardless of the field's nominal type.
    fn from_bson(value: &'a Bson) -> Option<Self> {
        match value {
            Bson::Int64(v) => Some(*v),
            Bson::Int32(v) => Some(Self::from(*v)),
            _ => None,
        }
    }
}

impl<'a> FieldValue<'a> for f64 {
    const EXPECTED: &'static str = "double";

    fn from_bson(value: &'a Bson) -> Option<Self> {
        match value {
            Bson::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl<'a> FieldValue<'a> for &'a str {
    const EXPECTED: &'static str = "string";

    fn from_bson(value: &'a Bson) -> Option<Self> {
        match value {
            Bson::String(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl<'a> FieldValue<'a> for String {
    const EXPECTED: &'static str = "string";

    fn from_bson(value: &'a Bson) -> Option<Self> {
        match value {
            Bson::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl<'a> FieldValue<'a> for ObjectId {
    const EXPECTED: &'static str = "objectId";

    fn from_bson(value: &'a Bson) -> Option<Self> {
        match value {
            Bson::ObjectId(v) => Some(*v),
            _ => None,
        }
    }
}

impl<'a> FieldValue<'a> for bson::DateTime {
    const EXPECTED: &'static str = "date";

    fn from_bson(value: &'a Bson) -> Option<Self> {
        match value {
            Bson::DateTime(v) => Some(*v),
            _ => None,
        }
    }
}

impl<'a> FieldValue<'a> for bson::Timestamp {
    const EXPECTED: &'static str = "timestamp";

    fn from_bson(value: &'a Bson) -> Option<Self> {
        match value {
            Bson::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

impl<'a> FieldValue<'a> for &'a Document {
    const EXPECTED: &'static str = "document";

    fn from_bson(value: &'a Bson) -> Option<Self> {
        match value {
            Bson::Document(v) => Some(v),
            _ => None,
        }
    }
}

impl<'a> FieldValue<'a> for &'a Vec<Bson> {
    const EXPECTED: &'static str = "array";

    fn from_bson(value: &'a Bson) -> Option<Self> {
        match value {
            Bson::Array(v) => Some(v),
            _ => None,
        }
    }
}

/// Extract a required field of type `T` from `document`.
///
/// # Errors
/// Returns [`FieldError::Missing`] when the field is absent and
/// [`FieldError::Mismatch`] when it has an unexpected type.
pub fn field<'a, T: FieldValue<'a>>(document: &'a Document, key: &str) -> Result<T, FieldError> {
    document
        .get(key)
        .ok_or_else(|| FieldError::Missing(key.to_owned()))
        .and_then(|value| {
            T::from_bson(value).ok_or_else(|| FieldError::Mismatch {
                field: key.to_owned(),
                expected: T::EXPECTED,
            })
        })
}

/// Extract an optional field of type `T` from `document`.
///
/// Absence is not an error; a present field with the wrong type is.
///
/// # Errors
/// Returns [`FieldError::Mismatch`] when the field exists with an
/// unexpected type.
pub fn field_if_exists<'a, T: FieldValue<'a>>(
    document: &'a Document,
    key: &str,
) -> Result<Option<T>, FieldError> {
    document.get(key).map_or(Ok(None), |value| {
        T::from_bson(value)
            .map(Some)
            .ok_or_else(|| FieldError::Mismatch {
                field: key.to_owned(),
                expected: T::EXPECTED,
            })
    })
}
