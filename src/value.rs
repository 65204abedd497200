//! The scalar (or nested) value a field resolves to.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A field's decoded value. Leaves resolve to one of the scalar arms;
/// a `FieldSet` resolves to `Value::Set`, carrying no payload of its own
/// since its "value" is the tree of its children.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    Timestamp(DateTime<Utc>),
    /// A composite field's value is its children; this marker lets
    /// `Field::value` return something for a `FieldSet` without forcing
    /// callers to special-case composites.
    Set,
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b.as_ref()),
            _ => None,
        }
    }
}
