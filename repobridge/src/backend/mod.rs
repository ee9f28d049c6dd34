//! Backends and their lifecycle.
//!
//! A backend owns one live connection to a storage engine, an immutable
//! configuration snapshot, and the builder that turns repository definitions
//! into repositories bound to that connection. Repositories have no lifecycle
//! of their own: once the backend is shut down, building new repositories
//! fails with `BackendError` and existing ones stop working.
//!
//! The [`BackendManager`] creates backends lazily by logical name from a
//! [`ManagerConfig`], using builders registered per backend type.

mod config;
mod manager;

pub use config::*;
pub use manager::*;

use crate::errors::{RepoError, RepoResult};
use crate::repository::{Repository, RepositoryDefinition};
use crate::store::document::MemoryStore;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// A live connection a backend hands out to its repositories.
pub trait BackendConnection: Clone + Send + Sync + 'static {
    /// Releases the connection. Called exactly once, at shutdown.
    fn cleanup(&self) -> RepoResult<()>;
}

/// Builds a repository bound to the backend's connection.
pub type RepositoryBuilder<C> = fn(&RepositoriesBackend<C>, RepositoryDefinition) -> RepoResult<Arc<dyn Repository>>;

/// Object-safe view of a backend, as kept by the [`BackendManager`].
pub trait Backend: Send + Sync {
    /// Logical name of the backend.
    fn name(&self) -> &str;

    fn config(&self) -> &BackendConfig;

    /// Returns the repository for `definition`, building and provisioning it on
    /// first use. Repositories are cached per collection name; asking again
    /// with a different definition fails with `BackendError`.
    fn define_repository(&self, definition: RepositoryDefinition) -> RepoResult<Arc<dyn Repository>>;

    /// Returns the repository of a configured collection, looked up by its key
    /// or its name.
    fn repository(&self, name: &str) -> RepoResult<Arc<dyn Repository>>;

    fn is_open(&self) -> bool;

    /// Releases the connection. Later calls are no-ops.
    fn shutdown(&self) -> RepoResult<()>;
}

struct RepositoriesBackendInner<C: BackendConnection> {
    name: String,
    config: BackendConfig,
    connection: RwLock<Option<C>>,
    builder: RepositoryBuilder<C>,
    repositories: DashMap<String, Arc<dyn Repository>>,
}

/// The [`Backend`] implementation shared by every storage engine; only the
/// connection type and the repository builder differ.
pub struct RepositoriesBackend<C: BackendConnection> {
    inner: Arc<RepositoriesBackendInner<C>>,
}

/// A backend over a document store.
pub type DocumentBackend<S = MemoryStore> = RepositoriesBackend<S>;

impl<C: BackendConnection> Clone for RepositoriesBackend<C> {
    fn clone(&self) -> Self {
        RepositoriesBackend {
            inner: self.inner.clone(),
        }
    }
}

impl<C: BackendConnection> RepositoriesBackend<C> {
    pub fn new(name: &str, config: BackendConfig, connection: C, builder: RepositoryBuilder<C>) -> Self {
        RepositoriesBackend {
            inner: Arc::new(RepositoriesBackendInner {
                name: name.to_string(),
                config,
                connection: RwLock::new(Some(connection)),
                builder,
                repositories: DashMap::new(),
            }),
        }
    }

    /// The live connection; `BackendError` once the backend is shut down.
    pub fn connection(&self) -> RepoResult<C> {
        match self.inner.connection.read().as_ref() {
            Some(connection) => Ok(connection.clone()),
            None => {
                log::error!("Backend {} has no live connection", self.inner.name);
                Err(RepoError::backend(&format!(
                    "backend {} has no live connection",
                    self.inner.name
                )))
            }
        }
    }

    /// Builds a repository without consulting or filling the cache.
    pub fn build_repository(&self, definition: RepositoryDefinition) -> RepoResult<Arc<dyn Repository>> {
        (self.inner.builder)(self, definition)
    }

    /// A cached repository answers only for the definition it was built from.
    fn matching(
        &self,
        repository: Arc<dyn Repository>,
        definition: &RepositoryDefinition,
    ) -> RepoResult<Arc<dyn Repository>> {
        if repository.definition() == definition {
            return Ok(repository);
        }
        log::error!(
            "Repository {} on backend {} is already defined differently",
            definition.name(),
            self.inner.name
        );
        Err(RepoError::backend(&format!(
            "repository {} is already defined with another definition on backend {}",
            definition.name(),
            self.inner.name
        )))
    }
}

impl<C: BackendConnection> Backend for RepositoriesBackend<C> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn config(&self) -> &BackendConfig {
        &self.inner.config
    }

    fn define_repository(&self, definition: RepositoryDefinition) -> RepoResult<Arc<dyn Repository>> {
        if let Some(repository) = self.inner.repositories.get(definition.name()) {
            return self.matching(repository.clone(), &definition);
        }

        let name = definition.name().to_string();
        let repository = self.build_repository(definition.clone())?;
        log::debug!("Built repository {} on backend {}", name, self.inner.name);
        let cached = self.inner.repositories.entry(name).or_insert(repository).clone();
        self.matching(cached, &definition)
    }

    fn repository(&self, name: &str) -> RepoResult<Arc<dyn Repository>> {
        if let Some(repository) = self.inner.repositories.get(name) {
            return Ok(repository.clone());
        }

        match self.inner.config.collection(name) {
            Some((key, collection)) => self.define_repository(collection.to_definition(key)?),
            None => {
                log::error!("Collection {} is not configured on backend {}", name, self.inner.name);
                Err(RepoError::backend(&format!(
                    "collection {} is not configured on backend {}",
                    name, self.inner.name
                )))
            }
        }
    }

    fn is_open(&self) -> bool {
        self.inner.connection.read().is_some()
    }

    fn shutdown(&self) -> RepoResult<()> {
        let connection = self.inner.connection.write().take();
        self.inner.repositories.clear();
        match connection {
            Some(connection) => {
                log::debug!("Shutting down backend {}", self.inner.name);
                connection.cleanup()
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::errors::ErrorKind;
    use crate::filter::Filter;

    fn backend() -> DocumentBackend {
        let config = BackendConfig::new("memory", "local", "app")
            .with_collection("users", CollectionConfig::new("app_users"));
        DocumentBackend::memory("main", config).unwrap()
    }

    #[test]
    fn repositories_are_cached() {
        let backend = backend();
        let a = backend.define_repository(RepositoryDefinition::new("things")).unwrap();
        let b = backend.define_repository(RepositoryDefinition::new("things")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn redefinition_is_a_backend_error() {
        let backend = backend();
        let plain = backend.define_repository(RepositoryDefinition::new("users")).unwrap();

        let err = backend
            .define_repository(RepositoryDefinition::new("users").with_custom_id(true))
            .err()
            .map(|e| *e.kind());
        assert_eq!(err, Some(ErrorKind::BackendError));

        // the cached repository is untouched
        let again = backend.define_repository(RepositoryDefinition::new("users")).unwrap();
        assert!(Arc::ptr_eq(&plain, &again));
        assert!(!again.definition().is_custom_id());
    }

    #[test]
    fn configured_collections_by_key_or_name() {
        let backend = backend();
        let by_key = backend.repository("users").unwrap();
        let by_name = backend.repository("app_users").unwrap();
        assert_eq!(by_key.name(), "app_users");
        assert!(Arc::ptr_eq(&by_key, &by_name));

        let err = backend.repository("unknown").err().map(|e| *e.kind());
        assert_eq!(err, Some(ErrorKind::BackendError));
    }

    #[test]
    fn shutdown_drops_the_connection() {
        let backend = backend();
        let users = backend.repository("users").unwrap();
        users.save(doc! { name: "a" }, None).unwrap();

        backend.shutdown().unwrap();
        assert!(!backend.is_open());
        backend.shutdown().unwrap();

        let err = backend.define_repository(RepositoryDefinition::new("x")).err().map(|e| *e.kind());
        assert_eq!(err, Some(ErrorKind::BackendError));

        let err = users.get_one(&Filter::new()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::BackendError);
    }
}
