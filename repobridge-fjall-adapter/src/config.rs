use fjall::{CompressionType, Config, KvSeparationOptions, PartitionCreateOptions};
use parking_lot::RwLock;
use repobridge::backend::BackendConfig;
use repobridge::errors::{RepoError, RepoResult};
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU16, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Option keys read from [`BackendConfig::options`] by
/// [`FjallConfig::from_backend_config`].
pub mod option_keys {
    pub const PRESET: &str = "preset";
    pub const BLOCK_CACHE_SIZE: &str = "blockCacheSize";
    pub const MAX_WRITE_BUFFER_SIZE: &str = "maxWriteBufferSize";
    pub const MAX_JOURNALING_SIZE: &str = "maxJournalingSize";
    pub const MAX_MEMTABLE_SIZE: &str = "maxMemtableSize";
    pub const FLUSH_WORKERS: &str = "flushWorkers";
    pub const COMPACTION_WORKERS: &str = "compactionWorkers";
    pub const FSYNC_MS: &str = "fsyncMs";
    pub const BLOOM_FILTER_BITS: &str = "bloomFilterBits";
    pub const COMPRESSION: &str = "compression";
    pub const KV_SEPARATED: &str = "kvSeparated";
    pub const MANUAL_JOURNAL_PERSIST: &str = "manualJournalPersist";
}

#[derive(Clone)]
/// Fjall keyspace configuration.
///
/// A cloneable, thread-safe holder of the tuning parameters of the keyspace
/// backing a key-value backend. Clones share the same settings.
///
/// Usually built from the `host` (keyspace directory) and `options` of a
/// [`BackendConfig`], or through [`FjallModule::with_config`](crate::FjallModule::with_config).
pub struct FjallConfig {
    inner: Arc<FjallConfigInner>,
}

impl FjallConfig {
    /// Creates a configuration with default values:
    /// - Block cache: 64 MB
    /// - Write buffer: 128 MB
    /// - Max journaling size: 512 MB
    /// - Bloom filter: 10 bits per key
    /// - Compression: LZ4
    /// - Flush workers: number of available CPU cores
    /// - Compaction workers: half of available CPU cores
    #[inline]
    pub fn new() -> FjallConfig {
        FjallConfig {
            inner: Arc::new(FjallConfigInner::new()),
        }
    }

    /// Reads the keyspace path from `host` and tuning values from `options`.
    ///
    /// A `preset` option (`production`, `highThroughput` or `lowMemory`) is
    /// applied first, so individual options override it. Unknown options are
    /// ignored; a known option with a value of the wrong type fails with
    /// `BackendError`.
    pub fn from_backend_config(config: &BackendConfig) -> RepoResult<FjallConfig> {
        use option_keys::*;

        if config.host.trim().is_empty() {
            log::error!("Fjall backend requires the keyspace path as host");
            return Err(RepoError::backend("fjall backend requires a keyspace path as host"));
        }

        let fjall_config = FjallConfig::new();
        fjall_config.set_db_path(config.host.trim());

        if let Some(preset) = config.options.get(PRESET) {
            match preset.as_str() {
                Some("production") => fjall_config.apply_production_preset(),
                Some("highThroughput") => fjall_config.apply_high_throughput_preset(),
                Some("lowMemory") => fjall_config.apply_low_memory_preset(),
                _ => {
                    log::error!("Unknown fjall preset {}", preset);
                    return Err(RepoError::backend(&format!("unknown fjall preset {}", preset)));
                }
            }
        }

        for (key, value) in &config.options {
            match key.as_str() {
                PRESET => {}
                BLOCK_CACHE_SIZE => fjall_config.set_block_cache_capacity(option_u64(key, value)?),
                MAX_WRITE_BUFFER_SIZE => fjall_config.set_max_write_buffer_size(option_u64(key, value)?),
                MAX_JOURNALING_SIZE => fjall_config.set_max_journaling_size(option_u64(key, value)?),
                MAX_MEMTABLE_SIZE => fjall_config.set_max_memtable_size(option_int(key, value)?),
                FLUSH_WORKERS => fjall_config.set_flush_workers(option_int(key, value)?),
                COMPACTION_WORKERS => fjall_config.set_compaction_workers(option_int(key, value)?),
                FSYNC_MS => fjall_config.set_fsync_frequency(option_int(key, value)?),
                BLOOM_FILTER_BITS => fjall_config.set_bloom_filter_bits(option_int(key, value)?),
                KV_SEPARATED => fjall_config.set_kv_separated(option_bool(key, value)?),
                MANUAL_JOURNAL_PERSIST => fjall_config.set_manual_journal_persist(option_bool(key, value)?),
                COMPRESSION => match value.as_str() {
                    Some("lz4") => fjall_config.set_compression_type(CompressionType::Lz4),
                    Some("none") => fjall_config.set_compression_type(CompressionType::None),
                    _ => return Err(invalid_option(key, value)),
                },
                _ => log::debug!("Ignoring unknown fjall option {}", key),
            }
        }

        Ok(fjall_config)
    }

    /// Builds the fjall keyspace configuration.
    #[inline]
    pub(crate) fn keyspace_config(&self) -> Config {
        let mut config = Config::new(self.inner.db_path());
        config = config
            .manual_journal_persist(self.inner.manual_journal_persist())
            .flush_workers(self.inner.flush_workers())
            .compaction_workers(self.inner.compaction_workers())
            .cache_size(self.inner.block_cache_capacity())
            .max_journaling_size(self.inner.max_journaling_size())
            .max_write_buffer_size(self.inner.max_write_buffer_size());

        if self.inner.fsync_frequency() > 0 {
            config = config.fsync_ms(Some(self.inner.fsync_frequency()));
        }
        config
    }

    /// Builds the options every table partition is opened with.
    #[inline]
    pub(crate) fn partition_config(&self) -> PartitionCreateOptions {
        let mut config = PartitionCreateOptions::default();
        config = config
            .bloom_filter_bits(if self.inner.bloom_filter_bits() <= 0 {
                None
            } else {
                Some(self.inner.bloom_filter_bits() as u8)
            })
            .compression(self.inner.compression_type())
            .max_memtable_size(self.inner.max_memtable_size())
            .block_size(self.inner.block_size());

        if self.inner.kv_separated() {
            config = config.with_kv_separation(KvSeparationOptions::default());
        }
        config
    }

    pub(crate) fn apply_production_preset(&self) {
        let cpus = available_cpus();
        self.set_block_cache_capacity(256 * 1024 * 1024);
        self.set_max_write_buffer_size(128 * 1024 * 1024);
        self.set_max_memtable_size(32 * 1024 * 1024);
        self.set_flush_workers(cpus);
        self.set_compaction_workers((cpus / 2).max(1));
        self.set_bloom_filter_bits(10);
        self.set_fsync_frequency(100);
        self.set_compression_type(CompressionType::Lz4);
    }

    pub(crate) fn apply_high_throughput_preset(&self) {
        let cpus = available_cpus();
        self.set_block_cache_capacity(512 * 1024 * 1024);
        self.set_max_write_buffer_size(256 * 1024 * 1024);
        self.set_max_memtable_size(64 * 1024 * 1024);
        self.set_flush_workers(cpus);
        self.set_compaction_workers(cpus);
        self.set_manual_journal_persist(true);
        self.set_kv_separated(true);
        self.set_bloom_filter_bits(0);
    }

    pub(crate) fn apply_low_memory_preset(&self) {
        self.set_block_cache_capacity(16 * 1024 * 1024);
        self.set_max_write_buffer_size(32 * 1024 * 1024);
        self.set_max_memtable_size(8 * 1024 * 1024);
        self.set_flush_workers(1);
        self.set_compaction_workers(1);
        self.set_bloom_filter_bits(10);
    }

    #[inline]
    pub fn db_path(&self) -> &str {
        self.inner.db_path()
    }

    /// Sets the keyspace directory. Only the first call takes effect.
    #[inline]
    pub(crate) fn set_db_path(&self, db_path: &str) {
        self.inner.set_db_path(db_path)
    }

    #[inline]
    pub fn manual_journal_persist(&self) -> bool {
        self.inner.manual_journal_persist()
    }

    #[inline]
    pub(crate) fn set_manual_journal_persist(&self, v: bool) {
        self.inner.set_manual_journal_persist(v)
    }

    #[inline]
    pub fn flush_workers(&self) -> usize {
        self.inner.flush_workers()
    }

    #[inline]
    pub(crate) fn set_flush_workers(&self, c: usize) {
        self.inner.set_flush_workers(c)
    }

    #[inline]
    pub fn compaction_workers(&self) -> usize {
        self.inner.compaction_workers()
    }

    #[inline]
    pub(crate) fn set_compaction_workers(&self, c: usize) {
        self.inner.set_compaction_workers(c)
    }

    #[inline]
    pub fn block_cache_capacity(&self) -> u64 {
        self.inner.block_cache_capacity()
    }

    #[inline]
    pub(crate) fn set_block_cache_capacity(&self, c: u64) {
        self.inner.set_block_cache_capacity(c)
    }

    #[inline]
    pub fn max_journaling_size(&self) -> u64 {
        self.inner.max_journaling_size()
    }

    #[inline]
    pub(crate) fn set_max_journaling_size(&self, s: u64) {
        self.inner.set_max_journaling_size(s)
    }

    #[inline]
    pub fn max_write_buffer_size(&self) -> u64 {
        self.inner.max_write_buffer_size()
    }

    #[inline]
    pub(crate) fn set_max_write_buffer_size(&self, s: u64) {
        self.inner.set_max_write_buffer_size(s)
    }

    /// Fsync interval in milliseconds; 0 leaves syncing to fjall.
    #[inline]
    pub fn fsync_frequency(&self) -> u16 {
        self.inner.fsync_frequency()
    }

    #[inline]
    pub(crate) fn set_fsync_frequency(&self, f: u16) {
        self.inner.set_fsync_frequency(f)
    }

    /// Bloom filter bits per key; 0 or less disables the filter.
    #[inline]
    pub fn bloom_filter_bits(&self) -> i8 {
        self.inner.bloom_filter_bits()
    }

    #[inline]
    pub(crate) fn set_bloom_filter_bits(&self, b: i8) {
        self.inner.set_bloom_filter_bits(b)
    }

    #[inline]
    pub fn compression_type(&self) -> CompressionType {
        self.inner.compression_type()
    }

    #[inline]
    pub(crate) fn set_compression_type(&self, ct: CompressionType) {
        self.inner.set_compression_type(ct)
    }

    #[inline]
    pub fn max_memtable_size(&self) -> u32 {
        self.inner.max_memtable_size()
    }

    #[inline]
    pub(crate) fn set_max_memtable_size(&self, s: u32) {
        self.inner.set_max_memtable_size(s)
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.inner.block_size()
    }

    #[inline]
    pub(crate) fn set_block_size(&self, s: u32) {
        self.inner.set_block_size(s)
    }

    #[inline]
    pub fn kv_separated(&self) -> bool {
        self.inner.kv_separated()
    }

    #[inline]
    pub(crate) fn set_kv_separated(&self, v: bool) {
        self.inner.set_kv_separated(v)
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism().map(usize::from).unwrap_or(4)
}

fn invalid_option(key: &str, value: &serde_json::Value) -> RepoError {
    log::error!("Invalid value {} for fjall option {}", value, key);
    RepoError::backend(&format!("invalid value {} for fjall option {}", value, key))
}

fn option_u64(key: &str, value: &serde_json::Value) -> RepoResult<u64> {
    value.as_u64().ok_or_else(|| invalid_option(key, value))
}

/// An integer option that must fit the setting's type.
fn option_int<T: TryFrom<u64>>(key: &str, value: &serde_json::Value) -> RepoResult<T> {
    T::try_from(option_u64(key, value)?).map_err(|_| invalid_option(key, value))
}

fn option_bool(key: &str, value: &serde_json::Value) -> RepoResult<bool> {
    value.as_bool().ok_or_else(|| invalid_option(key, value))
}

/// Settings storage; every field is an atomic so that clones of
/// [`FjallConfig`] can be tuned without locking.
struct FjallConfigInner {
    db_path: OnceLock<String>,
    manual_journal_persist: AtomicBool,
    flush_workers_count: AtomicUsize,
    compaction_workers_count: AtomicUsize,
    block_cache_capacity: AtomicU64,
    max_journaling_size: AtomicU64,
    max_write_buffer_size: AtomicU64,
    fsync_frequency: AtomicU16,

    bloom_filter_bits: AtomicI8,
    compression_type: RwLock<CompressionType>,
    max_memtable_size: AtomicU32,
    block_size: AtomicU32,
    kv_separated: AtomicBool,
}

impl FjallConfigInner {
    pub const DEFAULT_BLOCK_CACHE_MB: u64 = 64;
    pub const DEFAULT_WRITE_BUFFER_MB: u64 = 128;
    pub const DEFAULT_MAX_JOURNALING_MB: u64 = 512;
    pub const DEFAULT_MEMTABLE_MB: u32 = 32;

    fn new() -> FjallConfigInner {
        let cpus = available_cpus();
        let flush_workers = cpus.max(1);
        let compaction_workers = (cpus / 2).max(1);

        FjallConfigInner {
            db_path: OnceLock::new(),
            manual_journal_persist: AtomicBool::new(false),
            flush_workers_count: AtomicUsize::new(flush_workers),
            compaction_workers_count: AtomicUsize::new(compaction_workers),
            block_cache_capacity: AtomicU64::new(Self::DEFAULT_BLOCK_CACHE_MB * 1_024 * 1_024),
            max_journaling_size: AtomicU64::new(Self::DEFAULT_MAX_JOURNALING_MB * 1_024 * 1_024),
            max_write_buffer_size: AtomicU64::new(Self::DEFAULT_WRITE_BUFFER_MB * 1_024 * 1_024),
            fsync_frequency: AtomicU16::new(0),
            bloom_filter_bits: AtomicI8::new(10),
            compression_type: RwLock::new(CompressionType::Lz4),
            max_memtable_size: AtomicU32::new(Self::DEFAULT_MEMTABLE_MB * 1_024 * 1_024),
            block_size: AtomicU32::new(4 * 1_024),
            kv_separated: AtomicBool::new(false),
        }
    }

    #[inline]
    fn db_path(&self) -> &str {
        self.db_path.get().map(String::as_str).unwrap_or_default()
    }

    #[inline]
    fn set_db_path(&self, db_path: &str) {
        self.db_path.get_or_init(|| db_path.to_string());
    }

    #[inline]
    fn manual_journal_persist(&self) -> bool {
        self.manual_journal_persist.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_manual_journal_persist(&self, manual_journal_persist: bool) {
        self.manual_journal_persist.store(manual_journal_persist, Ordering::Relaxed)
    }

    #[inline]
    fn flush_workers(&self) -> usize {
        self.flush_workers_count.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_flush_workers(&self, flush_workers_count: usize) {
        self.flush_workers_count.store(flush_workers_count.max(1), Ordering::Relaxed)
    }

    #[inline]
    fn compaction_workers(&self) -> usize {
        self.compaction_workers_count.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_compaction_workers(&self, compaction_workers_count: usize) {
        self.compaction_workers_count
            .store(compaction_workers_count.max(1), Ordering::Relaxed)
    }

    #[inline]
    fn block_cache_capacity(&self) -> u64 {
        self.block_cache_capacity.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_block_cache_capacity(&self, block_cache_capacity: u64) {
        self.block_cache_capacity.store(block_cache_capacity, Ordering::Relaxed)
    }

    #[inline]
    fn max_journaling_size(&self) -> u64 {
        self.max_journaling_size.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_max_journaling_size(&self, max_journaling_size: u64) {
        self.max_journaling_size.store(max_journaling_size, Ordering::Relaxed)
    }

    #[inline]
    fn max_write_buffer_size(&self) -> u64 {
        self.max_write_buffer_size.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_max_write_buffer_size(&self, max_write_buffer_size: u64) {
        self.max_write_buffer_size.store(max_write_buffer_size, Ordering::Relaxed)
    }

    #[inline]
    fn fsync_frequency(&self) -> u16 {
        self.fsync_frequency.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_fsync_frequency(&self, fsync_frequency: u16) {
        self.fsync_frequency.store(fsync_frequency, Ordering::Relaxed)
    }

    #[inline]
    fn bloom_filter_bits(&self) -> i8 {
        self.bloom_filter_bits.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_bloom_filter_bits(&self, bloom_filter_bits: i8) {
        self.bloom_filter_bits.store(bloom_filter_bits, Ordering::Relaxed)
    }

    #[inline]
    fn compression_type(&self) -> CompressionType {
        *self.compression_type.read()
    }

    #[inline]
    fn set_compression_type(&self, compression_type: CompressionType) {
        *self.compression_type.write() = compression_type;
    }

    #[inline]
    fn max_memtable_size(&self) -> u32 {
        self.max_memtable_size.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_max_memtable_size(&self, max_memtable_size: u32) {
        self.max_memtable_size.store(max_memtable_size, Ordering::Relaxed)
    }

    #[inline]
    fn block_size(&self) -> u32 {
        self.block_size.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_block_size(&self, block_size: u32) {
        self.block_size.store(block_size, Ordering::Relaxed)
    }

    #[inline]
    fn kv_separated(&self) -> bool {
        self.kv_separated.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_kv_separated(&self, kv_separated: bool) {
        self.kv_separated.store(kv_separated, Ordering::Relaxed)
    }
}
