use crate::config::FjallConfig;
use crate::wrapper::{to_repo_error, KvError};
use dashmap::DashMap;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use parking_lot::Mutex;
use repobridge::backend::BackendConnection;
use repobridge::errors::{RepoError, RepoResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Name of the partition holding the provisioned definition of every table.
pub const CATALOG_PARTITION: &str = "repobridge_catalog";

#[derive(Clone)]
/// A live connection to a fjall keyspace.
///
/// Every table (one per `database.collection`) lives in its own partition.
/// Partition handles are opened once and cached; writers of a table are
/// serialized through a per-table lock so that uniqueness checks and the
/// write that follows them are atomic.
pub struct FjallConnection {
    inner: Arc<FjallConnectionInner>,
}

impl FjallConnection {
    /// Opens (or creates) the keyspace at the configured path.
    pub fn open(config: FjallConfig) -> RepoResult<FjallConnection> {
        if config.db_path().is_empty() {
            log::error!("Fjall keyspace path is not configured");
            return Err(RepoError::backend("fjall keyspace path is not configured"));
        }

        match Keyspace::open(config.keyspace_config()) {
            Ok(keyspace) => {
                log::debug!("Opened fjall keyspace at {}", config.db_path());
                Ok(FjallConnection {
                    inner: Arc::new(FjallConnectionInner {
                        keyspace,
                        config,
                        partitions: DashMap::new(),
                        table_locks: DashMap::new(),
                        closed: AtomicBool::new(false),
                    }),
                })
            }
            Err(err) => {
                log::error!("Failed to open or create keyspace: {}", err);
                Err(to_repo_error(err))
            }
        }
    }

    /// Encodes a table name into a valid partition name.
    ///
    /// Fjall partition names only allow `a-zA-Z0-9_-.#$`. Every other byte,
    /// and `#` itself, is written as `#` followed by two hex digits.
    pub(crate) fn encode_name(name: &str) -> String {
        let valid = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '$');
        if name.chars().all(valid) {
            return name.to_string();
        }

        let mut encoded = String::with_capacity(name.len() * 2);
        for c in name.chars() {
            if valid(c) {
                encoded.push(c);
            } else {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    encoded.push_str(&format!("#{:02x}", byte));
                }
            }
        }
        encoded
    }

    /// Partition name of `collection` in `database`.
    pub fn table_name(database: &str, collection: &str) -> String {
        Self::encode_name(&format!("{}.{}", database, collection))
    }

    pub fn config(&self) -> &FjallConfig {
        &self.inner.config
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }

    #[inline]
    fn check_opened(&self) -> RepoResult<()> {
        if self.is_closed() {
            log::error!("Fjall keyspace at {} is closed", self.inner.config.db_path());
            return Err(KvError::Closed.into());
        }
        Ok(())
    }

    /// Returns the handle of a partition, opening it on first use.
    pub(crate) fn partition(&self, name: &str) -> RepoResult<PartitionHandle> {
        self.check_opened()?;
        if let Some(partition) = self.inner.partitions.get(name) {
            return Ok(partition.clone());
        }

        match self
            .inner
            .keyspace
            .open_partition(name, self.inner.config.partition_config())
        {
            Ok(partition) => Ok(self
                .inner
                .partitions
                .entry(name.to_string())
                .or_insert(partition)
                .clone()),
            Err(err) => {
                log::error!("Failed to open partition {}: {}", name, err);
                Err(to_repo_error(err))
            }
        }
    }

    pub fn has_table(&self, name: &str) -> bool {
        !self.is_closed() && self.inner.keyspace.partition_exists(name)
    }

    /// The write lock of a table.
    pub(crate) fn table_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.inner
            .table_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Starts an atomic write batch across partitions.
    pub(crate) fn batch(&self) -> RepoResult<fjall::Batch> {
        self.check_opened()?;
        Ok(self.inner.keyspace.batch())
    }

    /// Flushes the journal to disk.
    pub fn commit(&self) -> RepoResult<()> {
        self.check_opened()?;
        self.inner.keyspace.persist(PersistMode::SyncAll).map_err(|err| {
            log::error!("Failed to commit keyspace: {}", err);
            to_repo_error(err)
        })
    }

    /// Persists pending writes and marks the connection closed. A second close
    /// fails.
    pub fn close(&self) -> RepoResult<()> {
        if self.inner.closed.swap(true, Ordering::Relaxed) {
            return Err(KvError::Closed.into());
        }

        let result = self.inner.keyspace.persist(PersistMode::SyncAll);
        self.inner.partitions.clear();
        self.inner.table_locks.clear();
        match result {
            Ok(()) => {
                log::debug!("Closed fjall keyspace at {}", self.inner.config.db_path());
                Ok(())
            }
            Err(err) => {
                log::error!("Failed to persist keyspace while closing: {}", err);
                Err(to_repo_error(err))
            }
        }
    }
}

impl BackendConnection for FjallConnection {
    fn cleanup(&self) -> RepoResult<()> {
        self.close()
    }
}

struct FjallConnectionInner {
    keyspace: Keyspace,
    config: FjallConfig,
    partitions: DashMap<String, PartitionHandle>,
    table_locks: DashMap<String, Arc<Mutex<()>>>,
    closed: AtomicBool,
}
