//! Core data types for the journal.
//!
//! An [`Entry`] is one journal item's metadata: a map from property name to
//! [`Value`]. The same shape is produced by every backend, whether it came out
//! of the object store, a sidecar JSON file on removable media, or a remote
//! share's downloaded metadata.

use crate::error::{JournalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Object identity: opaque id for store entries, a path for files
pub const UID: &str = "uid";
pub const TITLE: &str = "title";
pub const DESCRIPTION: &str = "description";
pub const MIME_TYPE: &str = "mime_type";
pub const ACTIVITY: &str = "activity";
pub const ACTIVITY_ID: &str = "activity_id";
/// Modification time in epoch seconds
pub const TIMESTAMP: &str = "timestamp";
pub const CREATION_TIME: &str = "creation_time";
pub const MTIME: &str = "mtime";
pub const FILESIZE: &str = "filesize";
pub const ICON_COLOR: &str = "icon-color";
/// Favorite flag, `0` or `1`
pub const KEEP: &str = "keep";
/// Origin tag; every materialized entry carries one
pub const MOUNTPOINT: &str = "mountpoint";
pub const PREVIEW: &str = "preview";

/// Properties requested from the object store for list views.
pub const PROPERTIES: &[&str] = &[
    "activity",
    "activity_id",
    "buddies",
    "bundle_id",
    "creation_time",
    "filesize",
    "icon-color",
    "keep",
    "mime_type",
    "mountpoint",
    "mtime",
    "progress",
    "timestamp",
    "title",
    "uid",
];

/// Icon colour given to entries that carry no colour of their own.
pub const DEFAULT_ICON_COLOR: &str = "#000000,#ffffff";

/// The mount point identifier of the local object store.
pub const OBJECT_STORE_MOUNT_POINT: &str = "/";

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Convert a JSON value read from a sidecar file.
    ///
    /// Nulls are dropped. Arrays of bytes become [`Value::Bytes`]; any other
    /// nested structure is kept as its JSON text.
    pub fn from_json(json: serde_json::Value) -> Option<Value> {
        use serde_json::Value as Json;

        match json {
            Json::Null => None,
            Json::Bool(b) => Some(Value::Bool(b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Some(Value::Int(i)),
                None => n.as_f64().map(Value::Float),
            },
            Json::String(s) => Some(Value::Text(s)),
            Json::Array(items) => {
                let bytes: Option<Vec<u8>> = items
                    .iter()
                    .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect();
                match bytes {
                    Some(bytes) if !items.is_empty() => Some(Value::Bytes(bytes)),
                    _ => Some(Value::Text(Json::Array(items).to_string())),
                }
            }
            other => Some(Value::Text(other.to_string())),
        }
    }

    /// Borrow the value as text, if it is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as an integer.
    ///
    /// Floats are truncated and numeric text is parsed, since timestamps show
    /// up in all three shapes across the different backends.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
            }
            Value::Bytes(_) => None,
        }
    }

    /// Borrow the value as raw bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

/// One journal item's metadata record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Entry {
    props: BTreeMap<String, Value>,
}

impl Entry {
    /// Create an empty entry
    pub fn new() -> Self {
        Entry::default()
    }

    /// Builder-style setter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Parse an entry from a JSON object
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(map) => Ok(Entry {
                props: map
                    .into_iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k, v)))
                    .collect(),
            }),
            other => Err(JournalError::serialization(format!(
                "expected a JSON object, found {}",
                other
            ))),
        }
    }

    /// Parse an entry from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        Entry::from_json(serde_json::from_str(text)?)
    }

    /// Serialize the entry to JSON text
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.props.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.props.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.props.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.props.iter()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn uid(&self) -> Option<&str> {
        self.get_str(UID)
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str(TITLE)
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.get_str(MIME_TYPE)
    }

    pub fn mount_point(&self) -> Option<&str> {
        self.get_str(MOUNTPOINT)
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.get_i64(TIMESTAMP)
    }

    /// Whether the favorite flag is set (`keep` of `1`, `"1"` or `true`)
    pub fn is_favorite(&self) -> bool {
        self.get_i64(KEEP) == Some(1)
    }
}

impl FromIterator<(String, Value)> for Entry {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Entry {
            props: iter.into_iter().collect(),
        }
    }
}

/// Kind of change broadcast for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Updated => write!(f, "updated"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A change to one entry, identified by its object id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub object_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_from_json() {
        let entry = Entry::from_json_str(
            r#"{"title": "Drawing", "timestamp": 1300000000, "keep": "1",
                "buddies": {"a": 1}, "progress": null}"#,
        )
        .unwrap();

        assert_eq!(entry.title(), Some("Drawing"));
        assert_eq!(entry.timestamp(), Some(1_300_000_000));
        assert!(entry.is_favorite());
        assert_eq!(entry.get_str("buddies"), Some(r#"{"a":1}"#));
        assert!(!entry.contains("progress"));
    }

    #[test]
    fn test_entry_rejects_non_object() {
        assert!(Entry::from_json_str("[1, 2]").is_err());
        assert!(Entry::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_value_as_i64() {
        assert_eq!(Value::Float(12.9).as_i64(), Some(12));
        assert_eq!(Value::from("42").as_i64(), Some(42));
        assert_eq!(Value::from("1300000000.5").as_i64(), Some(1_300_000_000));
        assert_eq!(Value::from("abc").as_i64(), None);
        assert_eq!(Value::Bytes(vec![1]).as_i64(), None);
    }

    #[test]
    fn test_favorite_flag() {
        assert!(Entry::new().with(KEEP, 1i64).is_favorite());
        assert!(Entry::new().with(KEEP, true).is_favorite());
        assert!(!Entry::new().with(KEEP, "0").is_favorite());
        assert!(!Entry::new().is_favorite());
    }

    #[test]
    fn test_json_round_trip_keeps_types() {
        let entry = Entry::new()
            .with(TITLE, "Notes")
            .with(TIMESTAMP, 1_000i64)
            .with(KEEP, 0i64);
        let text = entry.to_json_string().unwrap();
        assert_eq!(Entry::from_json_str(&text).unwrap(), entry);
    }
}
