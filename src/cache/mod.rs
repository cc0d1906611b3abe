//! TTL cache engine
//!
//! A namespaced key/value store on top of SQLite with:
//! - per-entry expiry in minutes (`0` = never expires)
//! - lazy deletion of expired rows on read plus a batched background sweep
//! - JSON or raw-bytes payloads, gzip-compressed above a size threshold
//! - a single writer lock serializing every mutation
//!
//! The engine backs both page-level caching of transformed articles and the
//! per-focus dedup markers that keep the LLM from seeing the same content twice.

mod clock;
mod codec;
mod schema;
mod sqlite;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::EMPTY_SENTINEL;
pub use sqlite::{CacheEngine, CacheStats};

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),

    #[error("Blocking task failed: {0}")]
    Task(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// A value stored in, or read back from, the cache
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    /// Any JSON-representable value
    Json(serde_json::Value),
    /// Opaque bytes stored without serialization
    Bytes(Vec<u8>),
}

impl CachedValue {
    /// Serializes any value into its JSON form
    pub fn json<T: Serialize + ?Sized>(value: &T) -> CacheResult<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// True for values that would be "falsy" in a dynamic language:
    /// null, false, zero, empty strings/arrays/objects and empty byte strings
    pub fn is_falsy(&self) -> bool {
        match self {
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Json(value) => match value {
                serde_json::Value::Null => true,
                serde_json::Value::Bool(b) => !b,
                serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
                serde_json::Value::String(s) => s.is_empty(),
                serde_json::Value::Array(a) => a.is_empty(),
                serde_json::Value::Object(o) => o.is_empty(),
            },
        }
    }

    /// True when this is the sentinel stored in place of an empty value
    pub fn is_empty_sentinel(&self) -> bool {
        matches!(self, Self::Json(serde_json::Value::String(s)) if s == EMPTY_SENTINEL)
    }

    /// Deserializes a JSON value into `T`; bytes and mismatched shapes yield None
    pub fn into_typed<T: DeserializeOwned>(self) -> Option<T> {
        match self {
            Self::Json(value) => serde_json::from_value(value).ok(),
            Self::Bytes(_) => None,
        }
    }
}

impl From<serde_json::Value> for CachedValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<Vec<u8>> for CachedValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Bytes render as lowercase hex
impl Serialize for CachedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Json(value) => value.serialize(serializer),
            Self::Bytes(bytes) => serializer.serialize_str(&hex::encode(bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_falsy_values() {
        for value in [json!(null), json!(false), json!(0), json!(""), json!([]), json!({})] {
            assert!(CachedValue::Json(value.clone()).is_falsy(), "{:?}", value);
        }
        assert!(CachedValue::Bytes(vec![]).is_falsy());
    }

    #[test]
    fn test_truthy_values() {
        for value in [json!(true), json!(1), json!("x"), json!([0]), json!({"a": 0})] {
            assert!(!CachedValue::Json(value.clone()).is_falsy(), "{:?}", value);
        }
        assert!(!CachedValue::Bytes(vec![0]).is_falsy());
    }

    #[test]
    fn test_into_typed() {
        let value = CachedValue::json(&vec!["a", "b"]).unwrap();
        let typed: Vec<String> = value.into_typed().unwrap();
        assert_eq!(typed, vec!["a", "b"]);

        let bytes = CachedValue::Bytes(vec![1, 2]);
        assert_eq!(bytes.into_typed::<Vec<u8>>(), None);
    }
}
