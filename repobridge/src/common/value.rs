use crate::common::Document;
use crate::errors::{RepoError, RepoResult};
use chrono::{DateTime, SecondsFormat, Utc};
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};

/// An opaque, backend-internal primary key.
///
/// The document store keys records by 12-byte object identifiers, the key-value
/// store by 16-byte UUIDs. Callers only ever see the public form: the lowercase
/// hex encoding of the key bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize)]
pub struct RecordKey(Vec<u8>);

impl RecordKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        RecordKey(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex encoding of the key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parses a public identity string into a key of exactly `expected_len` bytes.
    pub fn parse_hex(value: &str, expected_len: usize) -> RepoResult<RecordKey> {
        if value.len() != expected_len * 2 {
            log::debug!("Identity '{}' does not have {} hex digits", value, expected_len * 2);
            return Err(RepoError::invalid_input(&format!(
                "id '{}' is an invalid hex representation of a {}-byte key",
                value, expected_len
            )));
        }

        match hex::decode(value) {
            Ok(bytes) => Ok(RecordKey(bytes)),
            Err(err) => Err(RepoError::invalid_input(&format!(
                "id '{}' is an invalid hex representation of a key: {}",
                value, err
            ))),
        }
    }
}

impl Debug for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecordKey({})", self.to_hex())
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The canonical value of a document field.
///
/// Every record, filter and backend item is expressed in terms of `Value` and
/// [`Document`] before it is encoded into a backend's native representation.
#[derive(Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub enum Value {
    /// Represents a null or absent value.
    #[default]
    Null,
    /// Represents a boolean value.
    Bool(bool),
    /// Represents a signed 32-bit integer value.
    I32(i32),
    /// Represents a signed 64-bit integer value.
    I64(i64),
    /// Represents a 64-bit floating point value.
    F64(f64),
    /// Represents a string value.
    String(String),
    /// Represents a UTC timestamp.
    DateTime(DateTime<Utc>),
    /// Represents raw binary data.
    Bytes(Vec<u8>),
    /// Represents a backend-internal primary key.
    Key(RecordKey),
    /// Represents an array value.
    Array(Vec<Value>),
    /// Represents a nested document.
    Document(Document),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::I32(_) | Value::I64(_) | Value::F64(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view of the value; floats are accepted only when they are integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(i) => Some(*i as i64),
            Value::I64(i) => Some(*i),
            Value::F64(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I32(i) => Some(*i as f64),
            Value::I64(i) => Some(*i as f64),
            Value::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&RecordKey> {
        match self {
            Value::Key(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Bytes(_) => "bytes",
            Value::Key(_) => "key",
            Value::Array(_) => "array",
            Value::Document(_) => "document",
        }
    }

    /// Equality that treats numbers of different widths as equal when they
    /// denote the same quantity (`I32(5) == I64(5) == F64(5.0)`).
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_number() && b.is_number() => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            },
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y))
            }
            _ => self == other,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::I32(_) | Value::I64(_) | Value::F64(_) => 1,
            Value::String(_) => 2,
            Value::Document(_) => 3,
            Value::Array(_) => 4,
            Value::Bytes(_) => 5,
            Value::Key(_) => 6,
            Value::Bool(_) => 7,
            Value::DateTime(_) => 8,
        }
    }

    /// Total order used for sorting: values are ranked by type first
    /// (null < numbers < strings < documents < arrays < bytes < keys < bools < dates),
    /// then by value within a type.
    pub fn compare(&self, other: &Value) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (a, b) if a.is_number() => match (a, b) {
                (Value::F64(_), _) | (_, Value::F64(_)) => {
                    let x = a.as_f64().unwrap_or(f64::NAN);
                    let y = b.as_f64().unwrap_or(f64::NAN);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
                _ => a.as_i64().cmp(&b.as_i64()),
            },
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Document(a), Value::Document(b)) => a.len().cmp(&b.len()),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.compare(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Key(a), Value::Key(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }

    /// Renders the value as JSON; keys become their hex form, dates RFC 3339.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::I32(i) => serde_json::Value::from(*i),
            Value::I64(i) => serde_json::Value::from(*i),
            Value::F64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::DateTime(dt) => {
                serde_json::Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Value::Bytes(bytes) => serde_json::Value::String(hex::encode(bytes)),
            Value::Key(key) => serde_json::Value::String(key.to_hex()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Document(doc) => doc.to_json(),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::I32(i) => write!(f, "{}i32", i),
            Value::I64(i) => write!(f, "{}i64", i),
            Value::F64(v) => write!(f, "{:?}f64", v),
            Value::String(s) => write!(f, "{:?}", s),
            Value::DateTime(dt) => write!(f, "DateTime({})", dt.to_rfc3339()),
            Value::Bytes(bytes) => write!(f, "Bytes({})", hex::encode(bytes)),
            Value::Key(key) => write!(f, "{:?}", key),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Document(doc) => write!(f, "{:?}", doc),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::I64(value as i64)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::F64(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::String(value.clone())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl From<RecordKey> for Value {
    fn from(value: RecordKey) -> Self {
        Value::Key(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Document(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::I64(i),
                None => Value::F64(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                let mut doc = Document::new();
                for (key, item) in map {
                    doc.insert(key.clone(), Value::from(item));
                }
                Value::Document(doc)
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::from(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn record_key_hex_round_trip() {
        let key = RecordKey::from_bytes(vec![0x5a, 0x0f, 0xff, 0x00]);
        assert_eq!(key.to_hex(), "5a0fff00");
        assert_eq!(RecordKey::parse_hex("5a0fff00", 4).unwrap(), key);
    }

    #[test]
    fn record_key_rejects_wrong_length_and_digits() {
        assert!(RecordKey::parse_hex("5a0f", 4).is_err());
        assert!(RecordKey::parse_hex("zz0fff00", 4).is_err());
        assert!(RecordKey::parse_hex("", 12).is_err());
    }

    #[test]
    fn loose_eq_across_numeric_widths() {
        assert!(Value::I32(5).loose_eq(&Value::I64(5)));
        assert!(Value::I64(5).loose_eq(&Value::F64(5.0)));
        assert!(!Value::F64(5.5).loose_eq(&Value::I64(5)));
        assert!(!Value::String("5".into()).loose_eq(&Value::I64(5)));
    }

    #[test]
    fn compare_orders_by_type_then_value() {
        assert_eq!(Value::Null.compare(&Value::I32(1)), Ordering::Less);
        assert_eq!(Value::I32(2).compare(&Value::F64(1.5)), Ordering::Greater);
        assert_eq!(Value::from("a").compare(&Value::from("b")), Ordering::Less);
        assert_eq!(Value::I64(9).compare(&Value::from("a")), Ordering::Less);
    }

    #[test]
    fn json_conversion_handles_nested_values() {
        let json = serde_json::json!({"name": "x", "tags": ["a", "b"], "n": 3, "f": 1.5});
        let value = Value::from(&json);
        let doc = value.as_document().unwrap();

        assert_eq!(doc.get("name"), Some(&Value::from("x")));
        assert_eq!(doc.get("n"), Some(&Value::I64(3)));
        assert_eq!(doc.get("f"), Some(&Value::F64(1.5)));
        assert_eq!(doc.get("tags"), Some(&Value::from(vec!["a", "b"])));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn key_renders_as_hex_in_json() {
        let key = RecordKey::from_bytes(vec![1, 2, 3]);
        let value = Value::Document(doc! { id: (Value::Key(key)) });
        assert_eq!(value.to_json(), serde_json::json!({"id": "010203"}));
    }
}
