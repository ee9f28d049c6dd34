use crate::store::{FjallConnection, CATALOG_PARTITION};
use crate::wrapper::{decode, encode, to_repo_error};
use chrono::{DateTime, Duration, Utc};
use repobridge::common::{Document, Value};
use repobridge::errors::{ErrorKind, RepoError, RepoResult};
use repobridge::repository::{Index, RepositoryDefinition};
use serde::{Deserialize, Serialize};

/// A provisioned secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

impl IndexMeta {
    fn from_index(index: &Index) -> Self {
        IndexMeta {
            name: index.name(),
            fields: index.fields().to_vec(),
            unique: index.is_unique(),
        }
    }

    /// The indexed values of an item, or `None` when the item has none of the
    /// fields (sparse).
    pub fn key_of(&self, item: &Document) -> Option<Vec<Value>> {
        let values: Vec<Value> = self
            .fields
            .iter()
            .map(|field| item.get_path(field).cloned().unwrap_or(Value::Null))
            .collect();
        if values.iter().all(Value::is_null) {
            None
        } else {
            Some(values)
        }
    }
}

/// Expiry settings of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlMeta {
    pub field: String,
    pub seconds: i64,
}

impl TtlMeta {
    /// The instant an item expires: `seconds` after the timestamp held in
    /// the ttl field. Items without a timestamp never expire.
    pub fn expires_at(&self, item: &Document) -> Option<DateTime<Utc>> {
        match item.get_path(&self.field) {
            Some(Value::DateTime(stamp)) => stamp.checked_add_signed(Duration::seconds(self.seconds)),
            _ => None,
        }
    }

    pub fn is_expired(&self, item: &Document, now: DateTime<Utc>) -> bool {
        self.expires_at(item).is_some_and(|expires_at| expires_at <= now)
    }
}

/// Catalog entry of a table: what has been provisioned for it so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub indexes: Vec<IndexMeta>,
    pub ttl: Option<TtlMeta>,
}

impl TableMeta {
    pub fn unique_indexes(&self) -> impl Iterator<Item = &IndexMeta> {
        self.indexes.iter().filter(|index| index.unique)
    }
}

/// Reads the catalog entry of a table; an unknown table has an empty entry.
pub fn read_table_meta(connection: &FjallConnection, table: &str) -> RepoResult<TableMeta> {
    let catalog = connection.partition(CATALOG_PARTITION)?;
    match catalog.get(table) {
        Ok(Some(bytes)) => Ok(decode(&bytes)?),
        Ok(None) => Ok(TableMeta::default()),
        Err(err) => {
            log::error!("Failed to read catalog entry of {}: {}", table, err);
            Err(to_repo_error(err))
        }
    }
}

fn write_table_meta(connection: &FjallConnection, table: &str, meta: &TableMeta) -> RepoResult<()> {
    let catalog = connection.partition(CATALOG_PARTITION)?;
    catalog.insert(table, encode(meta)?).map_err(|err| {
        log::error!("Failed to write catalog entry of {}: {}", table, err);
        to_repo_error(err)
    })
}

/// Fails with `AlreadyExists` when two live items share a key of `index`.
fn check_existing_items(
    connection: &FjallConnection,
    table: &str,
    index: &IndexMeta,
    ttl: Option<&TtlMeta>,
) -> RepoResult<()> {
    let partition = connection.partition(table)?;
    let now = Utc::now();
    let mut seen: Vec<Vec<Value>> = Vec::new();

    for entry in partition.iter() {
        let (_, bytes) = entry.map_err(to_repo_error)?;
        let item: Document = decode(&bytes)?;
        if ttl.is_some_and(|ttl| ttl.is_expired(&item, now)) {
            continue;
        }
        if let Some(key) = index.key_of(&item) {
            let duplicate = seen
                .iter()
                .any(|other| other.iter().zip(key.iter()).all(|(a, b)| a.loose_eq(b)));
            if duplicate {
                log::error!("Cannot create unique index {} on {}: duplicate values", index.name, table);
                return Err(RepoError::already_exists(&format!(
                    "duplicate values for unique index {} on {}",
                    index.name, table
                )));
            }
            seen.push(key);
        }
    }
    Ok(())
}

/// Records the declared indexes and expiry of a table in the catalog.
///
/// Safe to run repeatedly. An index that is already provisioned with other
/// options keeps its original options; a changed expiry replaces the old one.
/// Returns the effective catalog entry.
pub fn prepare_table(
    connection: &FjallConnection,
    table: &str,
    definition: &RepositoryDefinition,
) -> RepoResult<TableMeta> {
    definition.validate()?;

    let lock = connection.table_lock(table);
    let _guard = lock.lock();

    let mut meta = read_table_meta(connection, table)?;
    // creates the partition of an empty table
    connection.partition(table)?;

    for index in definition.indexes() {
        let wanted = IndexMeta::from_index(index);
        match meta.indexes.iter().find(|existing| existing.name == wanted.name) {
            Some(existing) if *existing == wanted => {
                log::debug!("Index {} already provisioned on {}", wanted.name, table)
            }
            Some(existing) => {
                log::warn!(
                    "Index {} already exists on {} with other options (unique: {})",
                    existing.name,
                    table,
                    existing.unique
                );
            }
            None => {
                if wanted.unique {
                    check_existing_items(connection, table, &wanted, meta.ttl.as_ref()).map_err(|err| {
                        RepoError::new_with_cause(
                            &format!("failed to create index {} on {}", wanted.name, table),
                            ErrorKind::BackendError,
                            err,
                        )
                    })?;
                }
                log::debug!("Created index {} on {}", wanted.name, table);
                meta.indexes.push(wanted);
            }
        }
    }

    if let Some(ttl) = definition.ttl() {
        let wanted = TtlMeta {
            field: ttl.ttl_field().to_string(),
            seconds: ttl.ttl_seconds(),
        };
        if meta.ttl.as_ref() != Some(&wanted) {
            if meta.ttl.is_some() {
                log::warn!("Re-creating expiry of {} on field {}", table, wanted.field);
            }
            meta.ttl = Some(wanted);
        }
    }

    write_table_meta(connection, table, &meta)?;
    Ok(meta)
}
