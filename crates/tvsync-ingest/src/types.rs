//! Core record type

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document fetched from the remote API, keyed by its remote id
///
/// Everything except `id` is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Remote-assigned identifier the document was requested with
    pub id: i64,
    /// The JSON object returned by the API
    pub document: Map<String, Value>,
}

impl Record {
    pub fn new(id: i64, document: Map<String, Value>) -> Self {
        Self { id, document }
    }

    /// Build a record from a decoded payload
    ///
    /// Only JSON objects qualify. Scalars, arrays and `null` yield `None`.
    pub fn from_payload(id: i64, payload: Value) -> Option<Self> {
        match payload {
            Value::Object(document) => Some(Self::new(id, document)),
            _ => None,
        }
    }

    /// Look up a top-level field of the document
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.document.get(name)
    }
}
