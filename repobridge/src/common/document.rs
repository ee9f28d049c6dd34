use crate::common::Value;
use crate::errors::{RepoError, RepoResult};
use im::OrdMap;
use std::fmt::{Debug, Display, Formatter};

/// Separator of nested field paths such as `address.city`.
pub const FIELD_SEPARATOR: &str = ".";

/// The canonical field map of a record.
///
/// A `Document` is an ordered map from field name to [`Value`]. The object
/// mapper turns typed records into documents, identity normalization rewrites
/// their key fields, and every backend encodes them into its native item
/// representation. Cloning is cheap since the underlying map is persistent.
///
/// # Examples
///
/// ```rust
/// use repobridge::doc;
/// use repobridge::common::Value;
///
/// let doc = doc! {
///     name: "John",
///     age: 42,
///     address: { city: "Oslo" },
///     tags: ["a", "b"],
/// };
///
/// assert_eq!(doc.get("name"), Some(&Value::from("John")));
/// assert_eq!(doc.get_path("address.city"), Some(&Value::from("Oslo")));
/// ```
#[derive(Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Document {
    data: OrdMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Document { data: OrdMap::new() }
    }

    /// Inserts a field, returning the previous value if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(key.into(), value.into())
    }

    /// Inserts a field after validating its name.
    ///
    /// Empty names are rejected; this is the entry point used when field names
    /// come from untrusted input such as a JSON filter.
    pub fn put(&mut self, key: &str, value: impl Into<Value>) -> RepoResult<()> {
        if key.is_empty() {
            log::error!("Document does not support empty field name");
            return Err(RepoError::invalid_input("document does not support empty field name"));
        }
        self.data.insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Resolves a dotted path through nested documents.
    ///
    /// A top-level field whose name contains the separator wins over a nested
    /// lookup.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.data.get(path) {
            return Some(value);
        }

        let mut parts = path.split(FIELD_SEPARATOR);
        let first = parts.next()?;
        let mut current = self.data.get(first)?;
        for part in parts {
            current = current.as_document()?.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Copies every field of `other` into this document, overwriting existing ones.
    pub fn merge(&mut self, other: &Document) {
        for (key, value) in other.iter() {
            self.data.insert(key.clone(), value.clone());
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (key, value) in self.data.iter() {
            map.insert(key.clone(), value.to_json());
        }
        serde_json::Value::Object(map)
    }

    /// Builds a document out of a JSON object.
    pub fn from_json(json: &serde_json::Value) -> RepoResult<Document> {
        match Value::from(json) {
            Value::Document(doc) => Ok(doc),
            other => {
                log::error!("Expected a JSON object but found {}", other.type_name());
                Err(RepoError::invalid_input(&format!(
                    "expected a JSON object but found {}",
                    other.type_name()
                )))
            }
        }
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.data.iter()).finish()
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            data: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = im::ordmap::ConsumingIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

/// Strips the quotes `stringify!` leaves around string-literal keys.
pub fn normalize(value: &str) -> String {
    value.trim_matches('"').to_string()
}

/// Creates a [`Document`] with JSON-like syntax.
///
/// Keys may be bare identifiers or string literals; values may be literals,
/// nested `{ ... }` documents, `[ ... ]` arrays or parenthesized expressions.
#[macro_export]
macro_rules! doc {
    () => {
        $crate::common::Document::new()
    };

    ($($key:tt : $value:tt),* $(,)?) => {
        {
            #[allow(unused_imports)]
            use $crate::doc_value;

            let mut doc = $crate::common::Document::new();
            $(
                doc.insert($crate::common::normalize(stringify!($key)), $crate::doc_value!($value));
            )*
            doc
        }
    };
}

/// Converts a single `doc!` value token tree into a [`Value`](crate::common::Value).
#[macro_export]
macro_rules! doc_value {
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::common::Value::Document($crate::doc!{ $($key : $value),* })
    };

    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}
