//! In-process document engine.
//!
//! `MemoryStore` keeps BSON documents in memory and implements the subset of
//! document-store behavior the repositories rely on: equality, `$in`, `$regex`
//! and `$exists` queries, `$set`/`$unset` updates, sort/skip/limit, sparse
//! unique (compound) indexes, and TTL indexes that expire documents lazily.

mod matcher;

use crate::store::document::driver::{
    DocumentSession, DocumentStore, DriverError, DriverResult, FindSpec, IndexSpec, Namespace,
    DUPLICATE_KEY_CODE, INDEX_KEY_SPECS_CONFLICT_CODE, INDEX_OPTIONS_CONFLICT_CODE,
};
use bson::oid::ObjectId;
use bson::Bson;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

const ID_FIELD: &str = "_id";
const INDEX_NOT_FOUND_CODE: i32 = 27;

#[derive(Default)]
struct MemoryCollection {
    documents: Vec<bson::Document>,
    indexes: Vec<IndexSpec>,
}

impl MemoryCollection {
    fn is_expired(&self, document: &bson::Document, now: chrono::DateTime<Utc>) -> bool {
        self.indexes.iter().any(|index| {
            let (Some(expire_after), Some(field)) = (index.expire_after, index.keys.first()) else {
                return false;
            };
            match matcher::lookup(document, field) {
                Some(Bson::DateTime(stamp)) => match chrono::Duration::from_std(expire_after) {
                    Ok(ttl) => stamp.to_chrono() + ttl <= now,
                    Err(_) => false,
                },
                _ => false,
            }
        })
    }

    fn purge_expired(&mut self) {
        if self.indexes.iter().all(|index| index.expire_after.is_none()) {
            return;
        }

        let now = Utc::now();
        let before = self.documents.len();
        let expired: Vec<bool> = self.documents.iter().map(|doc| self.is_expired(doc, now)).collect();
        let mut flags = expired.into_iter();
        self.documents.retain(|_| !flags.next().unwrap_or(false));

        let purged = before - self.documents.len();
        if purged > 0 {
            log::debug!("Expired {} documents", purged);
        }
    }

    fn position(&self, filter: &bson::Document) -> DriverResult<Option<usize>> {
        let now = Utc::now();
        for (position, document) in self.documents.iter().enumerate() {
            if !self.is_expired(document, now) && matcher::matches(document, filter)? {
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    fn find(&self, filter: &bson::Document, spec: &FindSpec) -> DriverResult<Vec<bson::Document>> {
        let now = Utc::now();
        let mut result = Vec::new();
        for document in &self.documents {
            if !self.is_expired(document, now) && matcher::matches(document, filter)? {
                result.push(document.clone());
            }
        }

        if let Some((field, direction)) = &spec.sort {
            result.sort_by(|a, b| {
                let ordering = matcher::compare(matcher::lookup(a, field), matcher::lookup(b, field));
                if *direction < 0 {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let iter = result.into_iter().skip(spec.skip as usize);
        Ok(match spec.limit {
            Some(limit) if limit != 0 => iter.take(limit.unsigned_abs() as usize).collect(),
            _ => iter.collect(),
        })
    }

    fn index_key(document: &bson::Document, index: &IndexSpec) -> Option<Vec<Bson>> {
        let values: Vec<Option<&Bson>> = index.keys.iter().map(|key| matcher::lookup(document, key)).collect();
        if index.sparse && values.iter().all(Option::is_none) {
            return None;
        }
        Some(values.into_iter().map(|v| v.cloned().unwrap_or(Bson::Null)).collect())
    }

    fn same_key(a: &[Bson], b: &[Bson]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| matcher::bson_eq(x, y))
    }

    /// Checks `candidate` against the primary key and every unique index,
    /// ignoring the document at `skip`.
    fn check_unique(&self, candidate: &bson::Document, skip: Option<usize>) -> DriverResult<()> {
        let others = || {
            self.documents
                .iter()
                .enumerate()
                .filter(move |(position, _)| Some(*position) != skip)
                .map(|(_, doc)| doc)
        };

        if let Some(id) = candidate.get(ID_FIELD) {
            if others().any(|doc| doc.get(ID_FIELD).is_some_and(|other| matcher::bson_eq(other, id))) {
                return Err(DriverError::from_code(
                    DUPLICATE_KEY_CODE,
                    &format!("E11000 duplicate key error index: _id_ dup key: {{ _id: {} }}", id),
                ));
            }
        }

        for index in self.indexes.iter().filter(|index| index.unique) {
            let Some(key) = Self::index_key(candidate, index) else {
                continue;
            };
            let duplicate = others()
                .filter_map(|doc| Self::index_key(doc, index))
                .any(|other| Self::same_key(&key, &other));
            if duplicate {
                return Err(DriverError::from_code(
                    DUPLICATE_KEY_CODE,
                    &format!("E11000 duplicate key error index: {} dup key: {:?}", index.name, key),
                ));
            }
        }
        Ok(())
    }

    fn insert(&mut self, mut document: bson::Document) -> DriverResult<()> {
        self.purge_expired();
        if !document.contains_key(ID_FIELD) {
            document.insert(ID_FIELD, ObjectId::new());
        }
        self.check_unique(&document, None)?;
        self.documents.push(document);
        Ok(())
    }

    fn update_one(&mut self, filter: &bson::Document, update: &bson::Document) -> DriverResult<u64> {
        self.purge_expired();
        let Some(position) = self.position(filter)? else {
            return Ok(0);
        };

        let mut updated = self.documents[position].clone();
        matcher::apply_update(&mut updated, update)?;
        if updated.get(ID_FIELD) != self.documents[position].get(ID_FIELD) {
            return Err(DriverError::BadQuery(
                "performing an update on the path '_id' would modify the immutable field '_id'".to_string(),
            ));
        }

        self.check_unique(&updated, Some(position))?;
        self.documents[position] = updated;
        Ok(1)
    }

    fn delete(&mut self, filter: &bson::Document, many: bool) -> DriverResult<u64> {
        self.purge_expired();
        let mut doomed = Vec::new();
        for (position, document) in self.documents.iter().enumerate() {
            if matcher::matches(document, filter)? {
                doomed.push(position);
                if !many {
                    break;
                }
            }
        }

        for position in doomed.iter().rev() {
            self.documents.remove(*position);
        }
        Ok(doomed.len() as u64)
    }

    fn create_index(&mut self, spec: &IndexSpec) -> DriverResult<()> {
        if let Some(existing) = self.indexes.iter().find(|index| index.name == spec.name || index.keys == spec.keys) {
            if existing.keys != spec.keys {
                return Err(DriverError::from_code(
                    INDEX_KEY_SPECS_CONFLICT_CODE,
                    &format!("index with name {} already exists with different key specs", spec.name),
                ));
            }
            if existing.name != spec.name || !existing.same_options(spec) {
                return Err(DriverError::from_code(
                    INDEX_OPTIONS_CONFLICT_CODE,
                    &format!("index {} already exists with different options", existing.name),
                ));
            }
            return Ok(());
        }

        if spec.unique {
            let keys: Vec<Vec<Bson>> = self
                .documents
                .iter()
                .filter_map(|doc| Self::index_key(doc, spec))
                .collect();
            for (i, key) in keys.iter().enumerate() {
                if keys[i + 1..].iter().any(|other| Self::same_key(key, other)) {
                    return Err(DriverError::from_code(
                        DUPLICATE_KEY_CODE,
                        &format!("E11000 duplicate key error building index {}", spec.name),
                    ));
                }
            }
        }

        self.indexes.push(spec.clone());
        Ok(())
    }

    fn drop_index(&mut self, name: &str) -> DriverResult<()> {
        let before = self.indexes.len();
        self.indexes.retain(|index| index.name != name);
        if self.indexes.len() == before {
            return Err(DriverError::from_code(
                INDEX_NOT_FOUND_CODE,
                &format!("index not found with name [{}]", name),
            ));
        }
        Ok(())
    }
}

struct MemoryStoreInner {
    collections: DashMap<Namespace, Arc<RwLock<MemoryCollection>>>,
    open_sessions: AtomicUsize,
    closed: AtomicBool,
}

/// A document store living entirely in process memory.
///
/// Cloning yields another handle on the same data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Arc::new(MemoryStoreInner {
                collections: DashMap::new(),
                open_sessions: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Number of sessions currently held by callers.
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Indexes currently defined on a collection.
    pub fn indexes(&self, ns: &Namespace) -> Vec<IndexSpec> {
        self.collection(ns).read().indexes.clone()
    }

    fn collection(&self, ns: &Namespace) -> Arc<RwLock<MemoryCollection>> {
        self.inner
            .collections
            .entry(ns.clone())
            .or_insert_with(|| Arc::new(RwLock::new(MemoryCollection::default())))
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl DocumentStore for MemoryStore {
    type Session = MemorySession;

    fn session(&self) -> DriverResult<MemorySession> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession { store: self.clone() })
    }

    fn close(&self) -> DriverResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        self.inner.collections.clear();
        Ok(())
    }
}

/// A session on a [`MemoryStore`]; released on drop.
pub struct MemorySession {
    store: MemoryStore,
}

impl MemorySession {
    fn collection(&self, ns: &Namespace) -> DriverResult<Arc<RwLock<MemoryCollection>>> {
        if self.store.is_closed() {
            return Err(DriverError::Closed);
        }
        Ok(self.store.collection(ns))
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.store.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DocumentSession for MemorySession {
    fn find_one(&self, ns: &Namespace, filter: &bson::Document) -> DriverResult<Option<bson::Document>> {
        let collection = self.collection(ns)?;
        let collection = collection.read();
        Ok(collection
            .position(filter)?
            .map(|position| collection.documents[position].clone()))
    }

    fn find(&self, ns: &Namespace, filter: &bson::Document, spec: &FindSpec) -> DriverResult<Vec<bson::Document>> {
        self.collection(ns)?.read().find(filter, spec)
    }

    fn insert_one(&self, ns: &Namespace, document: bson::Document) -> DriverResult<()> {
        self.collection(ns)?.write().insert(document)
    }

    fn update_one(&self, ns: &Namespace, filter: &bson::Document, update: &bson::Document) -> DriverResult<u64> {
        self.collection(ns)?.write().update_one(filter, update)
    }

    fn delete_one(&self, ns: &Namespace, filter: &bson::Document) -> DriverResult<u64> {
        self.collection(ns)?.write().delete(filter, false)
    }

    fn delete_many(&self, ns: &Namespace, filter: &bson::Document) -> DriverResult<u64> {
        self.collection(ns)?.write().delete(filter, true)
    }

    fn create_index(&self, ns: &Namespace, index: &IndexSpec) -> DriverResult<()> {
        self.collection(ns)?.write().create_index(index)
    }

    fn drop_index(&self, ns: &Namespace, name: &str) -> DriverResult<()> {
        self.collection(ns)?.write().drop_index(name)
    }
}
