use crate::backend::{Backend, BackendConfig, BackendConnection, BackendManager, RepositoriesBackend};
use crate::errors::{ErrorKind, RepoError, RepoResult};
use crate::repository::{Repository, RepositoryDefinition};
use crate::store::document::driver::DocumentStore;
use crate::store::document::memory::MemoryStore;
use crate::store::document::repository::DocumentRepository;
use std::sync::Arc;

/// Backend type name of the in-process document store.
pub const MEMORY_BACKEND: &str = "memory";
/// Backend type name of MongoDB.
pub const MONGODB_BACKEND: &str = "mongodb";

fn close_store<S: DocumentStore>(store: &S) -> RepoResult<()> {
    store.close().map_err(|err| {
        log::error!("Failed to close document store: {}", err);
        RepoError::new_with_cause("failed to close document store", ErrorKind::BackendError, err.into())
    })
}

impl BackendConnection for MemoryStore {
    fn cleanup(&self) -> RepoResult<()> {
        close_store(self)
    }
}

/// Builds a [`DocumentRepository`] on the backend's live store.
pub fn build_document_repository<S: DocumentStore + BackendConnection>(
    backend: &RepositoriesBackend<S>,
    definition: RepositoryDefinition,
) -> RepoResult<Arc<dyn Repository>> {
    let store = backend.connection()?;
    let repository = DocumentRepository::open(store, &backend.config().database, definition)?;
    Ok(Arc::new(repository))
}

impl RepositoriesBackend<MemoryStore> {
    /// A backend on a fresh in-process store.
    pub fn memory(name: &str, config: BackendConfig) -> RepoResult<Self> {
        Ok(RepositoriesBackend::new(
            name,
            config,
            MemoryStore::new(),
            build_document_repository::<MemoryStore>,
        ))
    }
}

fn memory_backend(name: &str, config: &BackendConfig) -> RepoResult<Arc<dyn Backend>> {
    Ok(Arc::new(RepositoriesBackend::memory(name, config.clone())?))
}

#[cfg(feature = "mongodb")]
mod mongodb_backend {
    use super::*;
    use crate::store::document::mongo::MongoStore;

    impl BackendConnection for MongoStore {
        fn cleanup(&self) -> RepoResult<()> {
            close_store(self)
        }
    }

    impl RepositoriesBackend<MongoStore> {
        /// Connects to the configured MongoDB deployment.
        pub fn mongodb(name: &str, config: BackendConfig) -> RepoResult<Self> {
            let store = MongoStore::connect(&config)?;
            Ok(RepositoriesBackend::new(
                name,
                config,
                store,
                build_document_repository::<MongoStore>,
            ))
        }
    }

    pub(super) fn build(name: &str, config: &BackendConfig) -> RepoResult<Arc<dyn Backend>> {
        Ok(Arc::new(RepositoriesBackend::mongodb(name, config.clone())?))
    }
}

/// Registers the document backends compiled into this crate.
pub(crate) fn register_builtin_backends(manager: &BackendManager) {
    manager.support_backend(MEMORY_BACKEND, memory_backend);
    #[cfg(feature = "mongodb")]
    manager.support_backend(MONGODB_BACKEND, mongodb_backend::build);
}
