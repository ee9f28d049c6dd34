use crate::errors::RepoResult;
use crate::filter::Filter;

/// Turns a backend-agnostic [`Filter`] into a backend's native query.
///
/// Translation is pure: it never touches the backend, and the same filter
/// always yields the same query. Malformed filters fail with `InvalidInput`.
pub trait QueryTranslator: Send + Sync {
    type Query;

    fn translate(&self, filter: &Filter) -> RepoResult<Self::Query>;
}
