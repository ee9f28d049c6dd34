//! Public identity handling.
//!
//! Callers address records by a string field named `id` holding the lowercase
//! hex form of the backend key. Backends store the key in binary form under
//! their own native field (`_id` for the document store). The functions in this
//! module translate between the two shapes at every repository boundary.

use crate::common::{Document, RecordKey, Value};
use crate::errors::{RepoError, RepoResult};

/// Name of the public identity field.
pub const PUBLIC_ID: &str = "id";

/// Separator of an identity list inside a single filter value.
pub const ID_LIST_SEPARATOR: char = ',';

/// How a backend names, sizes and generates its internal keys.
#[derive(Debug, Clone, Copy)]
pub struct IdentityScheme {
    key_field: &'static str,
    key_len: usize,
    generator: fn() -> RecordKey,
}

impl IdentityScheme {
    pub const fn new(key_field: &'static str, key_len: usize, generator: fn() -> RecordKey) -> Self {
        IdentityScheme {
            key_field,
            key_len,
            generator,
        }
    }

    /// Field name the backend stores its primary key under.
    pub fn key_field(&self) -> &'static str {
        self.key_field
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// Generates a fresh key.
    pub fn generate(&self) -> RecordKey {
        (self.generator)()
    }

    /// Parses a public identity string into an internal key.
    pub fn parse(&self, id: &str) -> RepoResult<RecordKey> {
        RecordKey::parse_hex(id, self.key_len)
    }

    fn parse_value(&self, value: Value) -> RepoResult<Value> {
        match value {
            Value::String(id) => self.parse(&id).map(Value::Key),
            Value::Key(key) => Ok(Value::Key(key)),
            other => {
                log::error!("Identity of type {} is not a string", other.type_name());
                Err(RepoError::invalid_input(&format!(
                    "id must be a hex string, found {}",
                    other.type_name()
                )))
            }
        }
    }
}

/// Moves a public `id` into the backend key field, decoding it from hex.
///
/// A document without `id` is left untouched. For custom-ID collections the
/// value is moved verbatim, without decoding.
pub fn normalize_identity_inbound(
    document: &mut Document,
    scheme: &IdentityScheme,
    custom_id: bool,
) -> RepoResult<()> {
    if let Some(id) = document.remove(PUBLIC_ID) {
        let key = if custom_id { id } else { scheme.parse_value(id)? };
        document.insert(scheme.key_field(), key);
    }
    Ok(())
}

/// Like [`normalize_identity_inbound`] but accepts a comma separated list of
/// identities, producing a list of keys that the translators turn into a
/// set-membership match.
pub fn normalize_identity_list_inbound(
    document: &mut Document,
    scheme: &IdentityScheme,
    custom_id: bool,
) -> RepoResult<()> {
    if custom_id {
        return normalize_identity_inbound(document, scheme, custom_id);
    }

    if let Some(id) = document.remove(PUBLIC_ID) {
        let keys = match id {
            Value::String(ids) => ids
                .split(ID_LIST_SEPARATOR)
                .map(|id| scheme.parse(id).map(Value::Key))
                .collect::<RepoResult<Vec<_>>>()?,
            Value::Array(items) => items
                .into_iter()
                .map(|item| scheme.parse_value(item))
                .collect::<RepoResult<Vec<_>>>()?,
            other => vec![scheme.parse_value(other)?],
        };
        document.insert(scheme.key_field(), Value::Array(keys));
    }
    Ok(())
}

/// Moves a backend key back into the public `id` field as lowercase hex.
///
/// Custom-ID documents and documents whose key field does not hold a key are
/// left untouched.
pub fn normalize_identity_outbound(document: &mut Document, scheme: &IdentityScheme, custom_id: bool) {
    if custom_id {
        return;
    }

    if let Some(Value::Key(_)) = document.get(scheme.key_field()) {
        if let Some(Value::Key(key)) = document.remove(scheme.key_field()) {
            document.insert(PUBLIC_ID, Value::String(key.to_hex()));
        }
    }
}
