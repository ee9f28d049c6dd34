use crate::common::{Document, RecordKey, Value};
use crate::errors::{ErrorKind, RepoError, RepoResult};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Conversion between a single field and its canonical [`Value`].
///
/// Implemented for primitives, strings, timestamps, keys, options, vectors and
/// string-keyed maps. `#[derive(Record)]` implements it for nested record
/// types, which become nested documents.
pub trait FieldValue: Sized {
    fn to_value(&self) -> RepoResult<Value>;
    fn from_value(value: &Value) -> RepoResult<Self>;
}

/// A typed record that can be mapped to and from a canonical [`Document`].
///
/// Usually derived with `#[derive(Record)]`, which names fields after their
/// `bson` tag, else their `json`/`serde(rename)` tag, else the lowercased
/// field name.
pub trait Record: Sized {
    fn to_document(&self) -> RepoResult<Document>;
    fn from_document(document: &Document) -> RepoResult<Self>;
}

/// Reads a field for a derived record; an absent or null field yields the
/// type's default.
pub fn read_field<T: FieldValue + Default>(document: &Document, field: &str) -> RepoResult<T> {
    match document.get(field) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => T::from_value(value).map_err(|err| {
            RepoError::new_with_cause(
                &format!("failed to read field '{}'", field),
                ErrorKind::InvalidInput,
                err,
            )
        }),
    }
}

fn type_mismatch(value: &Value, expected: &str) -> RepoError {
    log::error!("Value {:?} is not {}", value, expected);
    RepoError::invalid_input(&format!("value of type {} is not {}", value.type_name(), expected))
}

macro_rules! impl_field_value_for_integer {
    ($($ty:ty => $name:expr),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn to_value(&self) -> RepoResult<Value> {
                    let wide = i64::try_from(*self).map_err(|_| {
                        RepoError::invalid_input(&format!("{} does not fit in a 64-bit integer", self))
                    })?;
                    Ok(Value::from(wide))
                }

                fn from_value(value: &Value) -> RepoResult<Self> {
                    value
                        .as_i64()
                        .and_then(|i| <$ty>::try_from(i).ok())
                        .ok_or_else(|| type_mismatch(value, $name))
                }
            }
        )*
    };
}

impl_field_value_for_integer! {
    i64 => "an i64",
    u32 => "a u32",
    u64 => "a u64",
    usize => "a usize",
}

impl FieldValue for i32 {
    fn to_value(&self) -> RepoResult<Value> {
        Ok(Value::I32(*self))
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        value
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .ok_or_else(|| type_mismatch(value, "an i32"))
    }
}

impl FieldValue for f64 {
    fn to_value(&self) -> RepoResult<Value> {
        Ok(Value::F64(*self))
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        value.as_f64().ok_or_else(|| type_mismatch(value, "an f64"))
    }
}

impl FieldValue for f32 {
    fn to_value(&self) -> RepoResult<Value> {
        Ok(Value::F64(*self as f64))
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        value
            .as_f64()
            .map(|f| f as f32)
            .ok_or_else(|| type_mismatch(value, "an f32"))
    }
}

impl FieldValue for bool {
    fn to_value(&self) -> RepoResult<Value> {
        Ok(Value::Bool(*self))
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        value.as_bool().ok_or_else(|| type_mismatch(value, "a bool"))
    }
}

impl FieldValue for String {
    fn to_value(&self) -> RepoResult<Value> {
        Ok(Value::String(self.clone()))
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            // a record may carry its key as a plain string field
            Value::Key(key) => Ok(key.to_hex()),
            _ => Err(type_mismatch(value, "a string")),
        }
    }
}

impl FieldValue for DateTime<Utc> {
    fn to_value(&self) -> RepoResult<Value> {
        Ok(Value::DateTime(*self))
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|err| RepoError::invalid_input(&format!("invalid timestamp '{}': {}", s, err))),
            _ => Err(type_mismatch(value, "a timestamp")),
        }
    }
}

impl FieldValue for RecordKey {
    fn to_value(&self) -> RepoResult<Value> {
        Ok(Value::Key(self.clone()))
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        value.as_key().cloned().ok_or_else(|| type_mismatch(value, "a key"))
    }
}

impl FieldValue for Value {
    fn to_value(&self) -> RepoResult<Value> {
        Ok(self.clone())
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        Ok(value.clone())
    }
}

impl FieldValue for Document {
    fn to_value(&self) -> RepoResult<Value> {
        Ok(Value::Document(self.clone()))
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        value.as_document().cloned().ok_or_else(|| type_mismatch(value, "a document"))
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn to_value(&self) -> RepoResult<Value> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(Value::Null),
        }
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn to_value(&self) -> RepoResult<Value> {
        let items = self.iter().map(FieldValue::to_value).collect::<RepoResult<Vec<_>>>()?;
        Ok(Value::Array(items))
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            _ => Err(type_mismatch(value, "an array")),
        }
    }
}

impl<T: FieldValue> FieldValue for BTreeMap<String, T> {
    fn to_value(&self) -> RepoResult<Value> {
        let mut doc = Document::new();
        for (key, item) in self {
            doc.insert(key.clone(), item.to_value()?);
        }
        Ok(Value::Document(doc))
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        let doc = value.as_document().ok_or_else(|| type_mismatch(value, "a document"))?;
        doc.iter()
            .map(|(key, item)| Ok((key.clone(), T::from_value(item)?)))
            .collect()
    }
}

impl<T: FieldValue> FieldValue for HashMap<String, T> {
    fn to_value(&self) -> RepoResult<Value> {
        let mut doc = Document::new();
        for (key, item) in self {
            doc.insert(key.clone(), item.to_value()?);
        }
        Ok(Value::Document(doc))
    }

    fn from_value(value: &Value) -> RepoResult<Self> {
        let doc = value.as_document().ok_or_else(|| type_mismatch(value, "a document"))?;
        doc.iter()
            .map(|(key, item)| Ok((key.clone(), T::from_value(item)?)))
            .collect()
    }
}

impl Record for Document {
    fn to_document(&self) -> RepoResult<Document> {
        Ok(self.clone())
    }

    fn from_document(document: &Document) -> RepoResult<Self> {
        Ok(document.clone())
    }
}

/// Only document values are records; anything else is rejected.
impl Record for Value {
    fn to_document(&self) -> RepoResult<Document> {
        match self {
            Value::Document(doc) => Ok(doc.clone()),
            other => {
                log::error!("Cannot map a {} value to a record", other.type_name());
                Err(RepoError::invalid_input(&format!(
                    "invalid object type {}, it should be a record or a document",
                    other.type_name()
                )))
            }
        }
    }

    fn from_document(document: &Document) -> RepoResult<Self> {
        Ok(Value::Document(document.clone()))
    }
}

impl Record for serde_json::Value {
    fn to_document(&self) -> RepoResult<Document> {
        Document::from_json(self)
    }

    fn from_document(document: &Document) -> RepoResult<Self> {
        Ok(document.to_json())
    }
}
