use crate::backend::{Backend, BackendConfig, ManagerConfig};
use crate::errors::{RepoError, RepoResult};
use crate::repository::Repository;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Creates a backend of one type from its logical name and configuration.
pub type BackendBuilder = fn(&str, &BackendConfig) -> RepoResult<Arc<dyn Backend>>;

struct BackendManagerInner {
    config: ManagerConfig,
    builders: DashMap<String, BackendBuilder>,
    backends: DashMap<String, Arc<dyn Backend>>,
    build_lock: Mutex<()>,
}

/// Registry of backend types and cache of live backends.
///
/// Backends are created on first request, at most once per logical name, and
/// all of them are released by [`shutdown`](BackendManager::shutdown).
///
/// # Examples
///
/// ```rust
/// use repobridge::backend::{BackendManager, ManagerConfig};
///
/// let config = ManagerConfig::from_json_str(r#"{
///     "main": { "type": "memory", "database": "app", "collections": { "users": {} } }
/// }"#).unwrap();
///
/// let manager = BackendManager::new(config);
/// let users = manager.repository("main", "users").unwrap();
/// assert_eq!(users.name(), "users");
/// manager.shutdown().unwrap();
/// ```
#[derive(Clone)]
pub struct BackendManager {
    inner: Arc<BackendManagerInner>,
}

impl BackendManager {
    /// Creates a manager with the built-in backend types registered.
    pub fn new(config: ManagerConfig) -> Self {
        let manager = BackendManager {
            inner: Arc::new(BackendManagerInner {
                config,
                builders: DashMap::new(),
                backends: DashMap::new(),
                build_lock: Mutex::new(()),
            }),
        };
        crate::store::document::register_builtin_backends(&manager);
        manager
    }

    /// Registers (or replaces) the builder of a backend type.
    pub fn support_backend(&self, kind: &str, builder: BackendBuilder) {
        self.inner.builders.insert(kind.to_string(), builder);
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.inner.builders.contains_key(kind)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Returns the backend configured under `name`, creating it on first use.
    pub fn get_backend(&self, name: &str) -> RepoResult<Arc<dyn Backend>> {
        if let Some(backend) = self.inner.backends.get(name) {
            return Ok(backend.clone());
        }

        let _guard = self.inner.build_lock.lock();
        if let Some(backend) = self.inner.backends.get(name) {
            return Ok(backend.clone());
        }

        let Some(config) = self.inner.config.get(name) else {
            log::error!("Backend {} is not configured", name);
            return Err(RepoError::backend(&format!("backend {} is not configured", name)));
        };

        let builder = match self.inner.builders.get(&config.kind) {
            Some(builder) => *builder,
            None => {
                log::error!("Backend {} has unsupported type {}", name, config.kind);
                return Err(RepoError::backend(&format!(
                    "backend type {} is not supported",
                    config.kind
                )));
            }
        };

        config.validate()?;
        let backend = builder(name, config)?;
        log::debug!("Created backend {} of type {}", name, config.kind);
        self.inner.backends.insert(name.to_string(), backend.clone());
        Ok(backend)
    }

    /// Shorthand for `get_backend(backend)?.repository(collection)`.
    pub fn repository(&self, backend: &str, collection: &str) -> RepoResult<Arc<dyn Repository>> {
        self.get_backend(backend)?.repository(collection)
    }

    /// Shuts every live backend down. Every backend is attempted; the first
    /// failure is returned.
    pub fn shutdown(&self) -> RepoResult<()> {
        let _guard = self.inner.build_lock.lock();
        let names: Vec<String> = self.inner.backends.iter().map(|entry| entry.key().clone()).collect();

        let mut result = Ok(());
        for name in names {
            if let Some((_, backend)) = self.inner.backends.remove(&name) {
                if let Err(err) = backend.shutdown() {
                    log::error!("Failed to shut down backend {}: {}", name, err);
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CollectionConfig, DocumentBackend};
    use crate::errors::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Logging for the whole crate's test run.
    #[ctor::ctor]
    fn init() {
        colog::init();
    }

    fn config() -> ManagerConfig {
        ManagerConfig::new()
            .with_backend(
                "main",
                BackendConfig::new("memory", "", "app").with_collection("users", CollectionConfig::new("users")),
            )
            .with_backend("other", BackendConfig::new("counting", "", "app"))
            .with_backend("broken", BackendConfig::new("nosuchtype", "", "app"))
    }

    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    fn counting_builder(name: &str, config: &BackendConfig) -> RepoResult<Arc<dyn Backend>> {
        BUILDS.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(DocumentBackend::memory(name, config.clone())?))
    }

    #[test]
    fn builds_lazily_and_once() {
        let manager = BackendManager::new(config());
        manager.support_backend("counting", counting_builder);

        let before = BUILDS.load(Ordering::SeqCst);
        let a = manager.get_backend("other").unwrap();
        let b = manager.get_backend("other").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(BUILDS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn unknown_names_and_types_fail() {
        let manager = BackendManager::new(config());
        let err = manager.get_backend("missing").err().map(|e| *e.kind());
        assert_eq!(err, Some(ErrorKind::BackendError));

        let err = manager.get_backend("broken").err().map(|e| *e.kind());
        assert_eq!(err, Some(ErrorKind::BackendError));
    }

    #[test]
    fn memory_is_builtin() {
        let manager = BackendManager::new(config());
        assert!(manager.supports("memory"));
        let users = manager.repository("main", "users").unwrap();
        assert_eq!(users.name(), "users");
    }

    #[test]
    fn shutdown_releases_every_backend() {
        let manager = BackendManager::new(config());
        let backend = manager.get_backend("main").unwrap();
        assert!(backend.is_open());

        manager.shutdown().unwrap();
        assert!(!backend.is_open());

        // a later request builds a fresh backend
        let fresh = manager.get_backend("main").unwrap();
        assert!(fresh.is_open());
        assert!(!Arc::ptr_eq(&backend, &fresh));
    }
}
