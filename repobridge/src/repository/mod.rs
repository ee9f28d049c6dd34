//! The repository contract.
//!
//! A [`Repository`] is a named collection of records living in one backend. It
//! exposes five operations over canonical [`Document`]s and hides everything
//! backend specific: identity encoding, query language and error codes. Typed
//! access goes through [`RepositoryExt`].
//!
//! # Examples
//!
//! ```rust
//! use repobridge::backend::{Backend, BackendConfig, DocumentBackend};
//! use repobridge::doc;
//! use repobridge::filter::Filter;
//! use repobridge::repository::{FindOptions, RepositoryDefinition};
//!
//! let config = BackendConfig::new("memory", "local", "app");
//! let backend = DocumentBackend::memory("main", config).unwrap();
//! let users = backend.define_repository(RepositoryDefinition::new("users")).unwrap();
//!
//! let saved = users.save(doc! { name: "Ada" }, None).unwrap();
//! let id = saved.get_str("id").unwrap().to_string();
//!
//! let found = users.get_one(&Filter::new().by_id(&id)).unwrap();
//! assert_eq!(found.get_str("name"), Some("Ada"));
//!
//! let all = users.get_all(&Filter::new(), &FindOptions::new()).unwrap();
//! assert_eq!(all.len(), 1);
//! ```

mod definition;
mod find_options;

pub use definition::*;
pub use find_options::*;

use crate::common::{Document, Record};
use crate::errors::RepoResult;
use crate::filter::Filter;
use crate::mapper::{from_canonical_map, to_canonical_map};

/// Uniform CRUD over one collection of one backend.
///
/// Every variant behaves identically from the caller's point of view:
///
/// - records are addressed by the public `id` (lowercase hex), unless the
///   repository uses custom identity;
/// - a missing record is `NotFound`, a unique violation `AlreadyExists`, a
///   malformed filter or identity `InvalidInput`;
/// - every operation acquires its own backend session and releases it on
///   every exit path.
pub trait Repository: Send + Sync {
    /// Name of the underlying collection.
    fn name(&self) -> &str;

    fn definition(&self) -> &RepositoryDefinition;

    /// Fetches the first record matching `filter`; `NotFound` if none does.
    fn get_one(&self, filter: &Filter) -> RepoResult<Document>;

    /// Fetches every matching record, sorted and paginated. An empty result is
    /// not an error.
    fn get_all(&self, filter: &Filter, options: &FindOptions) -> RepoResult<Vec<Document>>;

    /// Inserts `object` when `filter` is `None`, else updates the first record
    /// matching `filter` with the fields of `object` and returns the record as
    /// stored afterwards.
    ///
    /// Identity is immutable: on update, any `id` or internal key in `object`
    /// is ignored.
    fn save(&self, object: Document, filter: Option<&Filter>) -> RepoResult<Document>;

    /// Deletes the first matching record; `NotFound` if nothing was deleted.
    fn delete_one(&self, filter: &Filter) -> RepoResult<()>;

    /// Deletes every matching record, returning how many were removed.
    fn delete_all(&self, filter: &Filter) -> RepoResult<u64>;
}

/// Typed access on top of any [`Repository`].
///
/// ```rust,ignore
/// #[derive(Record, Default)]
/// struct User { id: String, name: String }
///
/// let user: User = repository.get_one_as(&Filter::new().by_id(&id))?;
/// ```
pub trait RepositoryExt: Repository {
    fn get_one_as<T: Record>(&self, filter: &Filter) -> RepoResult<T> {
        from_canonical_map(&self.get_one(filter)?)
    }

    fn get_all_as<T: Record>(&self, filter: &Filter, options: &FindOptions) -> RepoResult<Vec<T>> {
        self.get_all(filter, options)?
            .iter()
            .map(from_canonical_map::<T>)
            .collect()
    }

    fn save_record<T: Record>(&self, record: &T, filter: Option<&Filter>) -> RepoResult<T> {
        let saved = self.save(to_canonical_map(record)?, filter)?;
        from_canonical_map(&saved)
    }
}

impl<R: Repository + ?Sized> RepositoryExt for R {}
