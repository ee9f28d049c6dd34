//! Backend-agnostic filters.
//!
//! A [`Filter`] maps field names to match criteria. Each value is one of:
//!
//! - a scalar, matched exactly;
//! - a string containing commas, matched against any of its tokens;
//! - a pattern descriptor `{"$pattern": "..."}` using `%` wildcards
//!   (see [`WildcardPattern`]);
//! - after identity normalization, a list of internal keys.
//!
//! Filters are translated into a backend's native query by a
//! [`QueryTranslator`].
//!
//! # Examples
//!
//! ```rust
//! use repobridge::filter::Filter;
//!
//! let filter = Filter::new()
//!     .eq("status", "active")
//!     .pattern("name", "jo%");
//!
//! let from_json = Filter::from_json_str(r#"{"status": "active", "name": {"$pattern": "jo%"}}"#).unwrap();
//! assert_eq!(filter, from_json);
//! ```

mod pattern;
mod translator;

pub use pattern::*;
pub use translator::*;

use crate::common::{Document, Value};
use crate::errors::{RepoError, RepoResult};
use crate::identity::{ID_LIST_SEPARATOR, PUBLIC_ID};
use std::fmt::{Debug, Display, Formatter};

/// Key of a pattern descriptor.
pub const PATTERN_KEY: &str = "$pattern";

/// An ordered mapping from field name to match criterion.
#[derive(Clone, Default, PartialEq)]
pub struct Filter {
    fields: Document,
}

impl Filter {
    /// Creates an empty filter, which matches every record.
    pub fn new() -> Self {
        Filter {
            fields: Document::new(),
        }
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    /// Matches records whose field equals any of `values`.
    pub fn any_of<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<_>>();
        self.fields.insert(field, Value::Array(values));
        self
    }

    /// Matches records whose string field matches a `%` wildcard pattern.
    pub fn pattern(mut self, field: &str, pattern: &str) -> Self {
        let mut descriptor = Document::new();
        descriptor.insert(PATTERN_KEY, pattern);
        self.fields.insert(field, Value::Document(descriptor));
        self
    }

    /// Matches by public identity; a comma separated list selects several records.
    pub fn by_id(self, id: &str) -> Self {
        self.eq(PUBLIC_ID, id)
    }

    pub fn from_document(fields: Document) -> Self {
        Filter { fields }
    }

    /// Parses the JSON wire shape of a filter.
    pub fn from_json(json: &serde_json::Value) -> RepoResult<Self> {
        let fields = Document::from_json(json)?;
        if fields.keys().any(|key| key.is_empty()) {
            log::error!("Filter contains an empty field name");
            return Err(RepoError::invalid_input("filter contains an empty field name"));
        }
        Ok(Filter { fields })
    }

    pub fn from_json_str(json: &str) -> RepoResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Filter::from_json(&value)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the public id holds more than one identity.
    pub fn has_id_list(&self) -> bool {
        match self.fields.get(PUBLIC_ID) {
            Some(Value::String(id)) => id.contains(ID_LIST_SEPARATOR),
            Some(Value::Array(_)) => true,
            _ => false,
        }
    }

    pub fn as_document(&self) -> &Document {
        &self.fields
    }

    pub fn into_document(self) -> Document {
        self.fields
    }

    /// Classifies every field of the filter, failing on the first malformed one.
    pub fn criteria(&self) -> RepoResult<Vec<(String, Criterion)>> {
        self.fields
            .iter()
            .map(|(field, value)| Ok((field.clone(), Criterion::classify(field, value)?)))
            .collect()
    }
}

impl Debug for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Filter({:?})", self.fields)
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fields)
    }
}

impl From<Document> for Filter {
    fn from(fields: Document) -> Self {
        Filter::from_document(fields)
    }
}

/// The meaning of a single filter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// The field must equal the value.
    Exact(Value),
    /// The field must equal one of the values.
    AnyOf(Vec<Value>),
    /// The field must be a string matching the pattern.
    Pattern(WildcardPattern),
}

impl Criterion {
    pub fn classify(field: &str, value: &Value) -> RepoResult<Criterion> {
        match value {
            Value::Document(descriptor) if !descriptor.is_empty() => {
                if let Some(key) = descriptor.keys().find(|key| key.as_str() != PATTERN_KEY) {
                    log::error!("Unknown filter specification '{}' on field '{}'", key, field);
                    return Err(RepoError::invalid_input(&format!(
                        "unknown filter specification '{}' on field '{}' - supported type is {}",
                        key, field, PATTERN_KEY
                    )));
                }

                match descriptor.get(PATTERN_KEY) {
                    Some(Value::String(pattern)) => Ok(Criterion::Pattern(WildcardPattern::parse(pattern))),
                    Some(other) => Err(RepoError::invalid_input(&format!(
                        "{} on field '{}' must be a string, found {}",
                        PATTERN_KEY,
                        field,
                        other.type_name()
                    ))),
                    None => Err(RepoError::invalid_input(&format!(
                        "missing {} on field '{}'",
                        PATTERN_KEY, field
                    ))),
                }
            }
            Value::String(text) if text.contains(ID_LIST_SEPARATOR) => {
                let tokens = text
                    .split(ID_LIST_SEPARATOR)
                    .map(|token| Value::String(token.to_string()))
                    .collect();
                Ok(Criterion::AnyOf(tokens))
            }
            Value::Array(items) if items.len() == 1 => Ok(Criterion::Exact(items[0].clone())),
            Value::Array(items) => Ok(Criterion::AnyOf(items.clone())),
            other => Ok(Criterion::Exact(other.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RecordKey;
    use crate::doc;
    use crate::errors::ErrorKind;

    #[test]
    fn builder_and_json_agree() {
        let built = Filter::new().eq("age", 30i64).by_id("abc").pattern("name", "a%");
        let parsed = Filter::from_json_str(r#"{"age": 30, "id": "abc", "name": {"$pattern": "a%"}}"#).unwrap();
        assert_eq!(built, parsed);
    }

    #[test]
    fn json_must_be_an_object() {
        assert!(Filter::from_json_str("[1,2]").is_err());
        assert!(Filter::from_json_str("{").is_err());
        assert!(Filter::from_json_str(r#"{"": 1}"#).is_err());
    }

    #[test]
    fn scalar_is_exact() {
        let criterion = Criterion::classify("age", &Value::I64(3)).unwrap();
        assert_eq!(criterion, Criterion::Exact(Value::I64(3)));
    }

    #[test]
    fn comma_string_is_any_of() {
        let criterion = Criterion::classify("status", &Value::from("a,b")).unwrap();
        assert_eq!(criterion, Criterion::AnyOf(vec![Value::from("a"), Value::from("b")]));
    }

    #[test]
    fn key_lists_collapse_when_single() {
        let key = Value::Key(RecordKey::from_bytes(vec![1]));
        let criterion = Criterion::classify("_id", &Value::Array(vec![key.clone()])).unwrap();
        assert_eq!(criterion, Criterion::Exact(key.clone()));

        let criterion = Criterion::classify("_id", &Value::Array(vec![key.clone(), key.clone()])).unwrap();
        assert_eq!(criterion, Criterion::AnyOf(vec![key.clone(), key]));
    }

    #[test]
    fn pattern_descriptor_is_parsed() {
        let criterion = Criterion::classify("name", &Value::Document(doc! { "$pattern": "jo%" })).unwrap();
        assert_eq!(criterion, Criterion::Pattern(WildcardPattern::parse("jo%")));
    }

    #[test]
    fn unknown_descriptor_keys_are_rejected() {
        let err = Criterion::classify("name", &Value::Document(doc! { "$regex": "x" })).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidInput);

        let value = Value::Document(doc! { "$pattern": "x", "$other": 1 });
        assert!(Criterion::classify("name", &value).is_err());

        let value = Value::Document(doc! { "$pattern": 1 });
        assert!(Criterion::classify("name", &value).is_err());
    }

    #[test]
    fn has_id_list_detects_commas() {
        assert!(Filter::new().by_id("a,b").has_id_list());
        assert!(!Filter::new().by_id("a").has_id_list());
        assert!(!Filter::new().has_id_list());
    }

    #[test]
    fn criteria_preserve_every_field() {
        let filter = Filter::new().eq("a", 1).eq("b", "x,y");
        let criteria = filter.criteria().unwrap();
        assert_eq!(criteria.len(), 2);
        assert_eq!(criteria[0].0, "a");
        assert!(matches!(criteria[1].1, Criterion::AnyOf(_)));
    }
}
