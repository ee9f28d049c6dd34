//! Object mapper: typed records to canonical field maps and back.

use crate::common::{Document, Record};
use crate::errors::{ErrorKind, RepoError, RepoResult};

/// Maps a record to its canonical field map.
///
/// Field names follow the record's tags (see [`Record`]); a [`Document`] passes
/// through unchanged and a non-document [`Value`](crate::common::Value) is
/// rejected with `InvalidInput`.
pub fn to_canonical_map<T: Record>(object: &T) -> RepoResult<Document> {
    object.to_document()
}

/// Populates a record from a canonical field map.
///
/// Fields the record does not declare are ignored; declared fields that are
/// missing keep their default.
pub fn from_canonical_map<T: Record>(document: &Document) -> RepoResult<T> {
    T::from_document(document).map_err(|err| {
        if err.is(ErrorKind::InvalidInput) {
            err
        } else {
            RepoError::new_with_cause("failed to populate record", ErrorKind::InvalidInput, err)
        }
    })
}
