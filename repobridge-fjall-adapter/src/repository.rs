use crate::provision::{prepare_table, TableMeta};
use crate::store::FjallConnection;
use crate::translator::{KvQuery, KvTranslator};
use crate::wrapper::{decode_document, encode_document, encode_key, to_repo_error};
use chrono::Utc;
use fjall::PartitionHandle;
use repobridge::common::{Document, RecordKey, Value};
use repobridge::errors::{RepoError, RepoResult};
use repobridge::filter::{Filter, QueryTranslator};
use repobridge::identity::{
    normalize_identity_inbound, normalize_identity_list_inbound, normalize_identity_outbound, IdentityScheme,
    PUBLIC_ID,
};
use repobridge::repository::{FindOptions, Repository, RepositoryDefinition, SortOrder};
use std::collections::HashSet;
use std::sync::Arc;

/// Length of a generated key: a v4 UUID.
pub const KV_KEY_LEN: usize = 16;

pub fn new_uuid_key() -> RecordKey {
    RecordKey::from_bytes(uuid::Uuid::new_v4().as_bytes().to_vec())
}

/// Identity of the key-value store: 16-byte UUID keys stored under `id`.
pub const KV_IDENTITY: IdentityScheme = IdentityScheme::new(PUBLIC_ID, KV_KEY_LEN, new_uuid_key);

/// A stored item with its storage key.
type Item = (Vec<u8>, Document);

struct KvRepositoryInner {
    connection: FjallConnection,
    table: String,
    definition: RepositoryDefinition,
    meta: TableMeta,
    translator: KvTranslator,
}

/// A [`Repository`] over one table of a fjall keyspace.
///
/// Items are whole documents, bincode encoded, keyed by their encoded
/// identity. Filters on the identity become point reads; every other filter
/// scans the table. Sorting and pagination happen in memory.
#[derive(Clone)]
pub struct KvRepository {
    inner: Arc<KvRepositoryInner>,
}

impl KvRepository {
    /// Resolves the table of the collection, provisions it and returns the
    /// repository.
    pub fn open(connection: FjallConnection, database: &str, definition: RepositoryDefinition) -> RepoResult<Self> {
        if database.is_empty() {
            log::error!("No database configured for collection {}", definition.name());
            return Err(RepoError::backend("database name is required"));
        }
        if definition.name().is_empty() {
            log::error!("Repository definition has no collection name");
            return Err(RepoError::backend("collection name is required"));
        }

        let table = FjallConnection::table_name(database, definition.name());
        let meta = prepare_table(&connection, &table, &definition)?;

        Ok(KvRepository {
            inner: Arc::new(KvRepositoryInner {
                connection,
                table,
                definition,
                meta,
                translator: KvTranslator,
            }),
        })
    }

    /// Partition name of the table.
    pub fn table(&self) -> &str {
        &self.inner.table
    }

    pub fn meta(&self) -> &TableMeta {
        &self.inner.meta
    }

    /// Removes every expired item now instead of waiting for a read to find
    /// it. Returns the number of items removed.
    pub fn purge_expired(&self) -> RepoResult<u64> {
        let Some(ttl) = &self.inner.meta.ttl else {
            return Ok(0);
        };

        let lock = self.inner.connection.table_lock(&self.inner.table);
        let _guard = lock.lock();

        let partition = self.partition()?;
        let now = Utc::now();
        let mut expired = Vec::new();
        for entry in partition.iter() {
            let (key, bytes) = entry.map_err(|err| self.storage_error("Scan", err))?;
            if ttl.is_expired(&decode_document(&bytes)?, now) {
                expired.push(key.to_vec());
            }
        }
        self.remove_all(&partition, &expired)
    }

    fn custom_id(&self) -> bool {
        self.inner.definition.is_custom_id()
    }

    fn partition(&self) -> RepoResult<PartitionHandle> {
        self.inner.connection.partition(&self.inner.table)
    }

    fn storage_error(&self, operation: &str, err: fjall::Error) -> RepoError {
        log::error!("{} on {} failed: {}", operation, self.inner.table, err);
        to_repo_error(err)
    }

    fn query(&self, filter: &Filter, allow_list: bool) -> RepoResult<KvQuery> {
        let mut fields = filter.as_document().clone();
        if !self.custom_id() {
            if allow_list {
                normalize_identity_list_inbound(&mut fields, &KV_IDENTITY, false)?;
            } else {
                normalize_identity_inbound(&mut fields, &KV_IDENTITY, false)?;
            }
        }
        self.inner.translator.translate(&Filter::from_document(fields))
    }

    fn outbound(&self, mut item: Document) -> Document {
        normalize_identity_outbound(&mut item, &KV_IDENTITY, self.custom_id());
        item
    }

    fn is_expired(&self, item: &Document, now: chrono::DateTime<Utc>) -> bool {
        self.inner.meta.ttl.as_ref().is_some_and(|ttl| ttl.is_expired(item, now))
    }

    /// Live items matching the query, in key order. With `purge`, expired
    /// items met on the way are removed; the caller must hold the table lock.
    fn read_items(&self, partition: &PartitionHandle, query: &KvQuery, purge: bool) -> RepoResult<Vec<Item>> {
        let now = Utc::now();
        let mut items = Vec::new();
        let mut expired = Vec::new();

        let mut visit = |key: Vec<u8>, item: Document| {
            if self.is_expired(&item, now) {
                expired.push(key);
            } else if query.matches(&item) {
                items.push((key, item));
            }
        };

        match query.key_candidates(KV_IDENTITY.key_field()) {
            Some(candidates) => {
                let mut seen = HashSet::new();
                for candidate in candidates {
                    let key = encode_key(candidate)?;
                    if !seen.insert(key.clone()) {
                        continue;
                    }
                    let bytes = partition.get(&key).map_err(|err| self.storage_error("Read", err))?;
                    if let Some(bytes) = bytes {
                        visit(key, decode_document(&bytes)?);
                    }
                }
            }
            None => {
                for entry in partition.iter() {
                    let (key, bytes) = entry.map_err(|err| self.storage_error("Scan", err))?;
                    visit(key.to_vec(), decode_document(&bytes)?);
                }
            }
        }

        if purge && !expired.is_empty() {
            let purged = self.remove_all(partition, &expired)?;
            log::debug!("Purged {} expired items from {}", purged, self.inner.table);
        }
        Ok(items)
    }

    fn remove_all(&self, partition: &PartitionHandle, keys: &[Vec<u8>]) -> RepoResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut batch = self.inner.connection.batch()?;
        for key in keys {
            batch.remove(partition, key.as_slice());
        }
        batch.commit().map_err(|err| self.storage_error("Delete", err))?;
        Ok(keys.len() as u64)
    }

    fn write(&self, partition: &PartitionHandle, key: &[u8], item: &Document) -> RepoResult<()> {
        partition
            .insert(key, encode_document(item)?)
            .map_err(|err| self.storage_error("Write", err))
    }

    /// Fails with `AlreadyExists` when another live item shares a key of a
    /// unique index with `item`.
    fn check_unique(&self, partition: &PartitionHandle, item: &Document, own_key: Option<&[u8]>) -> RepoResult<()> {
        let indexes: Vec<_> = self
            .inner
            .meta
            .unique_indexes()
            .filter_map(|index| index.key_of(item).map(|key| (index, key)))
            .collect();
        if indexes.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        for entry in partition.iter() {
            let (key, bytes) = entry.map_err(|err| self.storage_error("Scan", err))?;
            if own_key == Some(&key[..]) {
                continue;
            }
            let other = decode_document(&bytes)?;
            if self.is_expired(&other, now) {
                continue;
            }

            for (index, values) in &indexes {
                let Some(other_values) = index.key_of(&other) else {
                    continue;
                };
                if values.iter().zip(other_values.iter()).all(|(a, b)| a.loose_eq(b)) {
                    log::warn!("Unique index {} violated on {}", index.name, self.inner.table);
                    return Err(RepoError::already_exists(&format!(
                        "duplicate key for unique index {} on {}",
                        index.name, self.inner.table
                    )));
                }
            }
        }
        Ok(())
    }

    fn sort(&self, items: &mut [Item], options: &FindOptions) {
        if let Some((field, order)) = options.sort() {
            items.sort_by(|(_, a), (_, b)| {
                let a = a.get_path(field).unwrap_or(&Value::Null);
                let b = b.get_path(field).unwrap_or(&Value::Null);
                let ordering = a.compare(b);
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }
    }

    fn not_found(&self, filter: &Filter) -> RepoError {
        RepoError::not_found(&format!("no record matches {}", filter))
    }

    fn insert(&self, mut document: Document) -> RepoResult<Document> {
        let identity = if self.custom_id() {
            match document.get(PUBLIC_ID) {
                Some(id) if !id.is_null() => id.clone(),
                _ => {
                    log::error!("Custom-ID record for {} has no id", self.inner.table);
                    return Err(RepoError::invalid_input("record requires an id in a custom-ID repository"));
                }
            }
        } else {
            let key = Value::Key(KV_IDENTITY.generate());
            document.insert(KV_IDENTITY.key_field(), key.clone());
            key
        };

        let storage_key = encode_key(&identity)?;
        let lock = self.inner.connection.table_lock(&self.inner.table);
        let _guard = lock.lock();
        let partition = self.partition()?;

        if let Some(existing) = partition
            .get(&storage_key)
            .map_err(|err| self.storage_error("Read", err))?
        {
            if !self.is_expired(&decode_document(&existing)?, Utc::now()) {
                log::warn!("Record {} already exists in {}", identity, self.inner.table);
                return Err(RepoError::already_exists(&format!(
                    "record {} already exists in {}",
                    identity, self.inner.table
                )));
            }
        }

        self.check_unique(&partition, &document, Some(&storage_key))?;
        self.write(&partition, &storage_key, &document)?;

        Ok(self.outbound(document))
    }

    fn update(&self, mut document: Document, filter: &Filter) -> RepoResult<Document> {
        let query = self.query(filter, false)?;
        // identity is immutable
        document.remove(KV_IDENTITY.key_field());

        if !document.is_empty() {
            let lock = self.inner.connection.table_lock(&self.inner.table);
            let _guard = lock.lock();
            let partition = self.partition()?;

            let Some((key, mut item)) = self.read_items(&partition, &query, true)?.into_iter().next() else {
                return Err(self.not_found(filter));
            };
            for (field, value) in document.iter() {
                set_path(&mut item, field, value.clone());
            }

            self.check_unique(&partition, &item, Some(&key))?;
            self.write(&partition, &key, &item)?;
        }

        self.get_one(filter)
    }
}

/// Sets a dotted field path, creating intermediate documents.
fn set_path(item: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            item.insert(path, value);
        }
        Some((head, rest)) => {
            let mut nested = match item.get(head) {
                Some(Value::Document(nested)) => nested.clone(),
                _ => Document::new(),
            };
            set_path(&mut nested, rest, value);
            item.insert(head, Value::Document(nested));
        }
    }
}

impl Repository for KvRepository {
    fn name(&self) -> &str {
        self.inner.definition.name()
    }

    fn definition(&self) -> &RepositoryDefinition {
        &self.inner.definition
    }

    fn get_one(&self, filter: &Filter) -> RepoResult<Document> {
        let query = self.query(filter, false)?;
        let partition = self.partition()?;
        match self.read_items(&partition, &query, false)?.into_iter().next() {
            Some((_, item)) => Ok(self.outbound(item)),
            None => Err(self.not_found(filter)),
        }
    }

    fn get_all(&self, filter: &Filter, options: &FindOptions) -> RepoResult<Vec<Document>> {
        let query = self.query(filter, filter.has_id_list())?;
        let partition = self.partition()?;
        let mut items = self.read_items(&partition, &query, false)?;
        self.sort(&mut items, options);
        Ok(options
            .paginate(items)
            .into_iter()
            .map(|(_, item)| self.outbound(item))
            .collect())
    }

    fn save(&self, object: Document, filter: Option<&Filter>) -> RepoResult<Document> {
        match filter {
            None => self.insert(object),
            Some(filter) => self.update(object, filter),
        }
    }

    fn delete_one(&self, filter: &Filter) -> RepoResult<()> {
        let query = self.query(filter, false)?;
        let lock = self.inner.connection.table_lock(&self.inner.table);
        let _guard = lock.lock();
        let partition = self.partition()?;

        match self.read_items(&partition, &query, true)?.into_iter().next() {
            Some((key, _)) => partition
                .remove(key.as_slice())
                .map_err(|err| self.storage_error("Delete", err)),
            None => Err(self.not_found(filter)),
        }
    }

    fn delete_all(&self, filter: &Filter) -> RepoResult<u64> {
        let query = self.query(filter, filter.has_id_list())?;
        let lock = self.inner.connection.table_lock(&self.inner.table);
        let _guard = lock.lock();
        let partition = self.partition()?;

        let keys: Vec<Vec<u8>> = self
            .read_items(&partition, &query, true)?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        self.remove_all(&partition, &keys)
    }
}
