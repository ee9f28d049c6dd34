use repobridge::common::{Document, Value};
use repobridge::errors::{ErrorKind, RepoError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use thiserror::Error;

/// Error type of the encoding and storage layer of the fjall backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KvError {
    /// Encoding a document, key or catalog entry failed
    #[error("Serialization failed: {0}")]
    SerializationError(String),
    /// Stored bytes could not be decoded
    #[error("Deserialization failed: {0}")]
    DeserializationError(String),
    /// The underlying keyspace reported an error
    #[error("Storage failure: {0}")]
    StorageError(String),
    /// The connection was shut down
    #[error("Keyspace is closed")]
    Closed,
}

impl From<KvError> for RepoError {
    fn from(err: KvError) -> Self {
        let kind = match err {
            KvError::SerializationError(_) => ErrorKind::InvalidInput,
            KvError::DeserializationError(_) => ErrorKind::Internal,
            KvError::StorageError(_) | KvError::Closed => ErrorKind::BackendError,
        };
        RepoError::new(&err.to_string(), kind)
    }
}

pub type KvResult<T> = Result<T, KvError>;

/// Maps a fjall error to a [`RepoError`].
///
/// Corruption is reported as `Internal`; everything else the engine reports,
/// including a poisoned or closed keyspace, is a `BackendError`.
pub(crate) fn to_repo_error(error: impl Error) -> RepoError {
    let error_msg = error.to_string();
    let kind = if error_msg.contains("corrupt") || error_msg.contains("checksum") {
        ErrorKind::Internal
    } else {
        ErrorKind::BackendError
    };
    RepoError::new(&format!("Fjall Error: {}", error_msg), kind)
}

/// Integers are widened so that `5i32` and `5i64` address the same key.
#[inline]
fn normalize_key(value: &Value) -> Value {
    match value {
        Value::I32(v) => Value::I64(*v as i64),
        other => other.clone(),
    }
}

#[inline]
pub(crate) fn encode<T: Serialize>(value: &T) -> KvResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::legacy())
        .map_err(|e| KvError::SerializationError(e.to_string()))
}

#[inline]
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> KvResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
        .map(|(value, _)| value)
        .map_err(|e| KvError::DeserializationError(e.to_string()))
}

/// Storage key of a record identity.
#[inline]
pub(crate) fn encode_key(value: &Value) -> KvResult<Vec<u8>> {
    encode(&normalize_key(value))
}

#[inline]
pub(crate) fn encode_document(document: &Document) -> KvResult<Vec<u8>> {
    encode(document)
}

#[inline]
pub(crate) fn decode_document(bytes: &[u8]) -> KvResult<Document> {
    decode(bytes)
}
