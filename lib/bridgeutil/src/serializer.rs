//! The self-describing wire document. Every value sent as a command
//! parameter or reply frame is encoded through this type rather than raw
//! bytes, so handlers work with a JSON-equivalent document regardless of
//! which concrete wire encoding a socket uses underneath.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct Document(Value);

#[derive(Debug)]
pub struct SerializationError(String);

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "serialization failure: {}", self.0)
    }
}

impl std::error::Error for SerializationError {}

impl Document {
    #[inline]
    pub fn null() -> Document {
        Document(Value::Null)
    }

    /// Serializes `value` into a document.
    pub fn encode<T: Serialize>(value: &T) -> Result<Document, SerializationError> {
        serde_json::to_value(value)
            .map(Document)
            .map_err(|e| SerializationError(e.to_string()))
    }

    /// Deserializes the document back into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SerializationError> {
        serde_json::from_value(self.0.clone()).map_err(|e| SerializationError(e.to_string()))
    }

    /// Encodes the document as UTF-8 bytes for transmission as a wire frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.0).expect("Value serialization cannot fail")
    }

    /// Parses a wire frame produced by `to_bytes` back into a document.
    pub fn from_bytes(bytes: &[u8]) -> Result<Document, SerializationError> {
        serde_json::from_slice(bytes)
            .map(Document)
            .map_err(|e| SerializationError(e.to_string()))
    }

    /// Builds a document from an ordered set of key/value pairs — the shape
    /// every `get` snapshot and published event uses for its top-level object.
    pub fn object(entries: Vec<(&str, Document)>) -> Document {
        let mut map = serde_json::Map::new();
        for (key, value) in entries {
            map.insert(key.to_string(), value.0);
        }
        Document(Value::Object(map))
    }

    /// Looks up a key in an object document, returning `None` if absent or if
    /// the document is not an object.
    pub fn get(&self, key: &str) -> Option<Document> {
        match &self.0 {
            Value::Object(map) => map.get(key).cloned().map(Document),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Flattens an object document into a sorted key/value map, used by the
    /// message queue to turn reply documents into alternating frames.
    pub fn into_flat_map(self) -> BTreeMap<String, Document> {
        match self.0 {
            Value::Object(map) => map.into_iter().map(|(k, v)| (k, Document(v))).collect(),
            _ => BTreeMap::new(),
        }
    }
}

impl From<Value> for Document {
    #[inline]
    fn from(value: Value) -> Document {
        Document(value)
    }
}

impl From<Document> for Value {
    #[inline]
    fn from(doc: Document) -> Value {
        doc.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_derive::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Call {
        position: String,
        bid: Option<String>,
    }

    #[test]
    fn round_trips_every_value_type() {
        let value = Call {
            position: "north".into(),
            bid: Some("1C".into()),
        };

        let doc = Document::encode(&value).unwrap();
        let bytes = doc.to_bytes();
        let back_doc = Document::from_bytes(&bytes).unwrap();
        let back: Call = back_doc.decode().unwrap();

        assert_eq!(value, back);
    }

    #[test]
    fn object_round_trips_through_get() {
        let doc = Document::object(vec![
            ("position", Document::encode(&"north").unwrap()),
            ("contract", Document::null()),
        ]);

        assert_eq!(doc.get("position").unwrap().decode::<String>().unwrap(), "north");
        assert!(doc.get("contract").unwrap().is_null());
        assert!(doc.get("missing").is_none());
    }
}
