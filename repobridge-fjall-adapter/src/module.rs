use crate::config::FjallConfig;
use crate::repository::KvRepository;
use crate::store::FjallConnection;
use fjall::CompressionType;
use repobridge::backend::{Backend, BackendConfig, BackendManager, RepositoriesBackend};
use repobridge::errors::{RepoError, RepoResult};
use repobridge::repository::{Repository, RepositoryDefinition};
use std::sync::Arc;

/// Backend type name of the fjall key-value store.
pub const FJALL_BACKEND: &str = "fjall";

/// A backend over a fjall keyspace.
pub type KvBackend = RepositoriesBackend<FjallConnection>;

/// Builds a [`KvRepository`] on the backend's live connection.
pub fn build_kv_repository(
    backend: &KvBackend,
    definition: RepositoryDefinition,
) -> RepoResult<Arc<dyn Repository>> {
    let connection = backend.connection()?;
    let repository = KvRepository::open(connection, &backend.config().database, definition)?;
    Ok(Arc::new(repository))
}

/// Opens a key-value backend from its configuration: `host` is the keyspace
/// directory and `options` tune the keyspace.
pub fn open_backend(name: &str, config: BackendConfig) -> RepoResult<KvBackend> {
    let store_config = FjallConfig::from_backend_config(&config)?;
    let connection = FjallConnection::open(store_config)?;
    Ok(KvBackend::new(name, config, connection, build_kv_repository))
}

fn fjall_backend(name: &str, config: &BackendConfig) -> RepoResult<Arc<dyn Backend>> {
    Ok(Arc::new(open_backend(name, config.clone())?))
}

/// Registers the `fjall` backend type with a manager.
///
/// # Examples
///
/// ```rust,ignore
/// use repobridge::backend::{BackendManager, ManagerConfig};
///
/// let config = ManagerConfig::from_json_str(r#"{
///     "cache": { "type": "fjall", "host": "/var/lib/app/kv", "database": "app" }
/// }"#)?;
/// let manager = BackendManager::new(config);
/// repobridge_fjall_adapter::register(&manager);
/// let sessions = manager.repository("cache", "sessions")?;
/// ```
pub fn register(manager: &BackendManager) {
    manager.support_backend(FJALL_BACKEND, fjall_backend);
}

/// Programmatic entry point of the key-value backend.
///
/// `FjallModule` opens a [`KvBackend`] with a keyspace configured in code
/// rather than through [`BackendConfig`] options.
///
/// # Examples
///
/// ```rust,ignore
/// use repobridge::backend::BackendConfig;
/// use repobridge_fjall_adapter::FjallModule;
///
/// let backend = FjallModule::with_config()
///     .production_preset()
///     .db_path("/path/to/kv")
///     .build()
///     .open("cache", BackendConfig::new("fjall", "", "app"))?;
/// ```
///
/// # Configuration Presets
///
/// - `production_preset()` - Balanced configuration for production use
/// - `high_throughput_preset()` - Optimized for high-write workloads
/// - `low_memory_preset()` - Optimized for low-memory environments
pub struct FjallModule {
    store_config: FjallConfig,
}

impl FjallModule {
    /// Creates a new builder for configuring a Fjall module.
    #[inline]
    pub fn with_config() -> FjallModuleBuilder {
        FjallModuleBuilder::new()
    }

    pub fn store_config(&self) -> &FjallConfig {
        &self.store_config
    }

    /// Opens the keyspace and returns a backend on it. Only the `database` of
    /// `config` is used; a `host` is taken as the keyspace path when the module
    /// has none.
    pub fn open(&self, name: &str, config: BackendConfig) -> RepoResult<KvBackend> {
        if self.store_config.db_path().is_empty() && !config.host.trim().is_empty() {
            self.store_config.set_db_path(config.host.trim());
        }
        if config.database.is_empty() {
            log::error!("No database configured for backend {}", name);
            return Err(RepoError::backend("database name is required"));
        }

        let connection = FjallConnection::open(self.store_config.clone())?;
        Ok(KvBackend::new(name, config, connection, build_kv_repository))
    }
}

/// Builder for configuring a Fjall module.
pub struct FjallModuleBuilder {
    store_config: FjallConfig,
}

impl FjallModuleBuilder {
    #[inline]
    pub fn new() -> FjallModuleBuilder {
        FjallModuleBuilder {
            store_config: FjallConfig::new(),
        }
    }

    /// Balanced settings: 256 MB block cache, 128 MB write buffer, bloom
    /// filters, LZ4 and a 100ms fsync interval.
    #[inline]
    pub fn production_preset(self) -> Self {
        self.store_config.apply_production_preset();
        self
    }

    /// Large buffers and manual journal persistence, for bulk loads where
    /// losing the tail of the journal on a crash is acceptable.
    #[inline]
    pub fn high_throughput_preset(self) -> Self {
        self.store_config.apply_high_throughput_preset();
        self
    }

    #[inline]
    pub fn low_memory_preset(self) -> Self {
        self.store_config.apply_low_memory_preset();
        self
    }

    #[inline]
    pub fn db_path(self, db_path: &str) -> Self {
        self.store_config.set_db_path(db_path);
        self
    }

    #[inline]
    pub fn manual_journal_persist(self, manual_journal_persist: bool) -> Self {
        self.store_config.set_manual_journal_persist(manual_journal_persist);
        self
    }

    #[inline]
    pub fn flush_workers(self, flush_workers_count: usize) -> Self {
        self.store_config.set_flush_workers(flush_workers_count);
        self
    }

    #[inline]
    pub fn compaction_workers(self, compaction_workers_count: usize) -> Self {
        self.store_config.set_compaction_workers(compaction_workers_count);
        self
    }

    #[inline]
    pub fn block_cache_capacity(self, block_cache_capacity: u64) -> Self {
        self.store_config.set_block_cache_capacity(block_cache_capacity);
        self
    }

    #[inline]
    pub fn max_journaling_size(self, max_journaling_size: u64) -> Self {
        self.store_config.set_max_journaling_size(max_journaling_size);
        self
    }

    #[inline]
    pub fn max_write_buffer_size(self, max_write_buffer_size: u64) -> Self {
        self.store_config.set_max_write_buffer_size(max_write_buffer_size);
        self
    }

    #[inline]
    pub fn max_memtable_size(self, max_memtable_size: u32) -> Self {
        self.store_config.set_max_memtable_size(max_memtable_size);
        self
    }

    /// Fsync interval in milliseconds; 0 leaves syncing to the OS.
    #[inline]
    pub fn fsync_frequency(self, fsync_ms: u16) -> Self {
        self.store_config.set_fsync_frequency(fsync_ms);
        self
    }

    /// Bloom filter bits per key; 0 or less disables bloom filters.
    #[inline]
    pub fn bloom_filter_bits(self, bits: i8) -> Self {
        self.store_config.set_bloom_filter_bits(bits);
        self
    }

    #[inline]
    pub fn compression_type(self, compression_type: CompressionType) -> Self {
        self.store_config.set_compression_type(compression_type);
        self
    }

    #[inline]
    pub fn kv_separated(self, kv_separated: bool) -> Self {
        self.store_config.set_kv_separated(kv_separated);
        self
    }

    #[inline]
    pub fn build(self) -> FjallModule {
        FjallModule {
            store_config: self.store_config,
        }
    }
}
