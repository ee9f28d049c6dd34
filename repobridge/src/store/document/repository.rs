use crate::common::{Document, Value};
use crate::errors::{ErrorKind, RepoError, RepoResult};
use crate::filter::{Filter, QueryTranslator};
use crate::identity::{
    normalize_identity_inbound, normalize_identity_list_inbound, normalize_identity_outbound, IdentityScheme,
    PUBLIC_ID,
};
use crate::repository::{FindOptions, Repository, RepositoryDefinition, SortOrder};
use crate::store::document::codec::{bson_to_document, document_to_bson, new_object_id_key, OBJECT_ID_LEN};
use crate::store::document::driver::{DocumentSession, DocumentStore, DriverError, FindSpec, Namespace};
use crate::store::document::provision::prepare_collection;
use crate::store::document::translator::MongoTranslator;
use std::sync::Arc;

/// Identity of the document store: 12-byte object ids under `_id`.
pub const DOCUMENT_IDENTITY: IdentityScheme = IdentityScheme::new("_id", OBJECT_ID_LEN, new_object_id_key);

struct DocumentRepositoryInner<S: DocumentStore> {
    store: S,
    namespace: Namespace,
    definition: RepositoryDefinition,
    translator: MongoTranslator,
}

/// A [`Repository`] over a document store collection.
///
/// Holds only a handle on the shared store; every operation opens its own
/// session and drops it before returning.
pub struct DocumentRepository<S: DocumentStore> {
    inner: Arc<DocumentRepositoryInner<S>>,
}

impl<S: DocumentStore> Clone for DocumentRepository<S> {
    fn clone(&self) -> Self {
        DocumentRepository {
            inner: self.inner.clone(),
        }
    }
}

impl<S: DocumentStore> DocumentRepository<S> {
    /// Resolves the collection namespace, provisions its indexes and returns the
    /// repository.
    pub fn open(store: S, database: &str, definition: RepositoryDefinition) -> RepoResult<Self> {
        if database.is_empty() {
            log::error!("No database configured for collection {}", definition.name());
            return Err(RepoError::backend("database name is required"));
        }
        if definition.name().is_empty() {
            log::error!("Repository definition has no collection name");
            return Err(RepoError::backend("collection name is required"));
        }

        let namespace = Namespace::new(database, definition.name());
        {
            let session = store.session()?;
            prepare_collection(&session, &namespace, &definition)?;
        }

        Ok(DocumentRepository {
            inner: Arc::new(DocumentRepositoryInner {
                store,
                namespace,
                definition,
                translator: MongoTranslator,
            }),
        })
    }

    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    fn custom_id(&self) -> bool {
        self.inner.definition.is_custom_id()
    }

    fn session(&self) -> RepoResult<S::Session> {
        self.inner.store.session().map_err(|err| {
            log::error!("Failed to open a session on {}: {}", self.inner.namespace, err);
            RepoError::from(err)
        })
    }

    fn query(&self, filter: &Filter, allow_list: bool) -> RepoResult<bson::Document> {
        let mut fields = filter.as_document().clone();
        if !self.custom_id() {
            if allow_list {
                normalize_identity_list_inbound(&mut fields, &DOCUMENT_IDENTITY, false)?;
            } else {
                normalize_identity_inbound(&mut fields, &DOCUMENT_IDENTITY, false)?;
            }
        }
        self.inner.translator.translate(&Filter::from_document(fields))
    }

    fn outbound(&self, document: &bson::Document) -> RepoResult<Document> {
        let mut document = bson_to_document(document)?;
        normalize_identity_outbound(&mut document, &DOCUMENT_IDENTITY, self.custom_id());
        Ok(document)
    }

    fn map_error(&self, operation: &str, err: DriverError) -> RepoError {
        let error = RepoError::from(err);
        match error.kind() {
            ErrorKind::AlreadyExists => log::warn!("{} on {}: {}", operation, self.inner.namespace, error),
            _ => log::error!("{} on {} failed: {}", operation, self.inner.namespace, error),
        }
        error
    }

    fn find_spec(&self, options: &FindOptions) -> FindSpec {
        FindSpec {
            sort: options.sort().map(|(field, order)| {
                let field = if field == PUBLIC_ID && !self.custom_id() {
                    DOCUMENT_IDENTITY.key_field()
                } else {
                    field
                };
                let direction = match order {
                    SortOrder::Ascending => 1,
                    SortOrder::Descending => -1,
                };
                (field.to_string(), direction)
            }),
            skip: u64::try_from(options.offset_value()).unwrap_or(u64::MAX),
            limit: options.limit_value().map(|limit| i64::try_from(limit).unwrap_or(i64::MAX)),
        }
    }

    fn insert(&self, mut document: Document) -> RepoResult<Document> {
        let key_field = DOCUMENT_IDENTITY.key_field();
        if self.custom_id() {
            match document.get(PUBLIC_ID).cloned() {
                Some(id) if !id.is_null() => {
                    document.insert(key_field, id);
                }
                _ if document.contains_key(key_field) => {}
                _ => {
                    log::error!("Custom-ID record for {} has no id", self.inner.namespace);
                    return Err(RepoError::invalid_input("record requires an id in a custom-ID repository"));
                }
            }
        } else {
            document.remove(PUBLIC_ID);
            document.insert(key_field, Value::Key(DOCUMENT_IDENTITY.generate()));
        }

        let session = self.session()?;
        session
            .insert_one(&self.inner.namespace, document_to_bson(&document))
            .map_err(|err| self.map_error("Insert", err))?;

        normalize_identity_outbound(&mut document, &DOCUMENT_IDENTITY, self.custom_id());
        Ok(document)
    }

    fn update(&self, mut document: Document, filter: &Filter) -> RepoResult<Document> {
        let query = self.query(filter, false)?;
        document.remove(DOCUMENT_IDENTITY.key_field());
        document.remove(PUBLIC_ID);

        if !document.is_empty() {
            let session = self.session()?;
            let update = bson::doc! { "$set": document_to_bson(&document) };
            let matched = session
                .update_one(&self.inner.namespace, &query, &update)
                .map_err(|err| self.map_error("Update", err))?;
            if matched == 0 {
                return Err(RepoError::not_found(&format!("no record matches {}", filter)));
            }
        }

        self.get_one(filter)
    }
}

impl<S: DocumentStore> Repository for DocumentRepository<S> {
    fn name(&self) -> &str {
        self.inner.definition.name()
    }

    fn definition(&self) -> &RepositoryDefinition {
        &self.inner.definition
    }

    fn get_one(&self, filter: &Filter) -> RepoResult<Document> {
        let query = self.query(filter, false)?;
        let session = self.session()?;
        match session.find_one(&self.inner.namespace, &query) {
            Ok(Some(document)) => self.outbound(&document),
            Ok(None) | Err(DriverError::NotFound) => {
                Err(RepoError::not_found(&format!("no record matches {}", filter)))
            }
            Err(err) => Err(self.map_error("Find", err)),
        }
    }

    fn get_all(&self, filter: &Filter, options: &FindOptions) -> RepoResult<Vec<Document>> {
        let query = self.query(filter, filter.has_id_list())?;
        let session = self.session()?;
        let documents = session
            .find(&self.inner.namespace, &query, &self.find_spec(options))
            .map_err(|err| self.map_error("Find", err))?;
        documents.iter().map(|document| self.outbound(document)).collect()
    }

    fn save(&self, object: Document, filter: Option<&Filter>) -> RepoResult<Document> {
        match filter {
            None => self.insert(object),
            Some(filter) => self.update(object, filter),
        }
    }

    fn delete_one(&self, filter: &Filter) -> RepoResult<()> {
        let query = self.query(filter, false)?;
        let session = self.session()?;
        let deleted = session
            .delete_one(&self.inner.namespace, &query)
            .map_err(|err| self.map_error("Delete", err))?;
        if deleted == 0 {
            return Err(RepoError::not_found(&format!("no record matches {}", filter)));
        }
        Ok(())
    }

    fn delete_all(&self, filter: &Filter) -> RepoResult<u64> {
        let query = self.query(filter, filter.has_id_list())?;
        let session = self.session()?;
        session
            .delete_many(&self.inner.namespace, &query)
            .map_err(|err| self.map_error("Delete", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::repository::Index;
    use crate::store::document::memory::MemoryStore;

    fn repository(definition: RepositoryDefinition) -> (MemoryStore, DocumentRepository<MemoryStore>) {
        let store = MemoryStore::new();
        let repository = DocumentRepository::open(store.clone(), "test", definition).unwrap();
        (store, repository)
    }

    #[test]
    fn open_requires_database_and_name() {
        let err = DocumentRepository::open(MemoryStore::new(), "", RepositoryDefinition::new("users")).err();
        assert_eq!(err.map(|e| *e.kind()), Some(ErrorKind::BackendError));

        let err = DocumentRepository::open(MemoryStore::new(), "test", RepositoryDefinition::new("")).err();
        assert_eq!(err.map(|e| *e.kind()), Some(ErrorKind::BackendError));
    }

    #[test]
    fn insert_assigns_public_id() {
        let (_, repository) = repository(RepositoryDefinition::new("users"));
        let saved = repository.save(doc! { name: "Ada", id: "ignored" }, None).unwrap();

        let id = saved.get_str("id").unwrap();
        assert_eq!(id.len(), 24);
        assert_ne!(id, "ignored");
        assert!(!saved.contains_key("_id"));

        let found = repository.get_one(&Filter::new().by_id(id)).unwrap();
        assert_eq!(found, saved);
    }

    #[test]
    fn huge_limit_returns_everything() {
        let (_, repository) = repository(RepositoryDefinition::new("users"));
        for name in ["Ada", "Grace", "Linus"] {
            repository.save(doc! { name: name }, None).unwrap();
        }

        let options = FindOptions::new().limit(usize::MAX);
        assert_eq!(repository.find_spec(&options).limit, Some(i64::MAX));
        assert_eq!(repository.get_all(&Filter::new(), &options).unwrap().len(), 3);
    }

    #[test]
    fn get_one_not_found_and_bad_id() {
        let (_, repository) = repository(RepositoryDefinition::new("users"));
        let err = repository.get_one(&Filter::new().eq("name", "nobody")).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotFound);

        let err = repository.get_one(&Filter::new().by_id("xyz")).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidInput);
    }

    #[test]
    fn get_all_handles_id_lists_sort_and_paging() {
        let (_, repository) = repository(RepositoryDefinition::new("users"));
        let mut ids = Vec::new();
        for (name, age) in [("a", 30), ("b", 10), ("c", 20)] {
            let saved = repository.save(doc! { name: name, age: age }, None).unwrap();
            ids.push(saved.get_str("id").unwrap().to_string());
        }

        let filter = Filter::new().by_id(&format!("{},{}", ids[0], ids[2]));
        let found = repository.get_all(&filter, &FindOptions::new()).unwrap();
        assert_eq!(found.len(), 2);

        let options = FindOptions::new().sort_by("age", SortOrder::Descending).limit(2);
        let found = repository.get_all(&Filter::new(), &options).unwrap();
        let names: Vec<&str> = found.iter().map(|d| d.get_str("name").unwrap()).collect();
        assert_eq!(names, vec!["a", "c"]);

        let found = repository.get_all(&Filter::new().eq("name", "zzz"), &FindOptions::new()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn unique_violation_is_already_exists() {
        let (_, repository) =
            repository(RepositoryDefinition::new("users").with_index(Index::new(["email"], true).unwrap()));
        repository.save(doc! { email: "a@x" }, None).unwrap();
        let err = repository.save(doc! { email: "a@x" }, None).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::AlreadyExists);
    }

    #[test]
    fn update_keeps_identity() {
        let (_, repository) = repository(RepositoryDefinition::new("users"));
        let saved = repository.save(doc! { name: "Ada", age: 36 }, None).unwrap();
        let id = saved.get_str("id").unwrap().to_string();

        let other = "0123456789abcdef01234567";
        let updated = repository
            .save(doc! { id: other, age: 37 }, Some(&Filter::new().by_id(&id)))
            .unwrap();
        assert_eq!(updated.get_str("id"), Some(id.as_str()));
        assert_eq!(updated.get("age"), Some(&Value::I32(37)));
        assert_eq!(updated.get_str("name"), Some("Ada"));

        let err = repository
            .save(doc! { age: 1 }, Some(&Filter::new().eq("name", "nobody")))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotFound);
    }

    #[test]
    fn delete_semantics() {
        let (_, repository) = repository(RepositoryDefinition::new("users"));
        let saved = repository.save(doc! { kind: "x" }, None).unwrap();
        repository.save(doc! { kind: "x" }, None).unwrap();

        repository.delete_one(&Filter::new().by_id(saved.get_str("id").unwrap())).unwrap();
        let err = repository
            .delete_one(&Filter::new().by_id(saved.get_str("id").unwrap()))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotFound);

        assert_eq!(repository.delete_all(&Filter::new().eq("kind", "x")).unwrap(), 1);
        assert_eq!(repository.delete_all(&Filter::new().eq("kind", "x")).unwrap(), 0);
    }

    #[test]
    fn custom_id_is_verbatim() {
        let (_, repository) = repository(RepositoryDefinition::new("users").with_custom_id(true));
        let saved = repository.save(doc! { id: "user-1", name: "Ada" }, None).unwrap();
        assert_eq!(saved.get_str("_id"), Some("user-1"));
        assert_eq!(saved.get_str("id"), Some("user-1"));

        let found = repository.get_one(&Filter::new().by_id("user-1")).unwrap();
        assert_eq!(found.get_str("_id"), Some("user-1"));

        let err = repository.save(doc! { id: "user-1" }, None).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::AlreadyExists);

        let err = repository.save(doc! { name: "anonymous" }, None).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidInput);
    }

    #[test]
    fn sessions_are_released_on_failure() {
        let (store, repository) = repository(RepositoryDefinition::new("users"));
        let _ = repository.get_one(&Filter::new().eq("name", "nobody"));
        let _ = repository.get_one(&Filter::new().pattern("name", "a%").eq("x", Value::Document(doc! { "$bad": 1 })));
        let _ = repository.delete_one(&Filter::new().eq("name", "nobody"));
        assert_eq!(store.open_sessions(), 0);
    }

    #[test]
    fn closed_store_is_a_backend_error() {
        let (store, repository) = repository(RepositoryDefinition::new("users"));
        store.close().unwrap();
        let err = repository.get_all(&Filter::new(), &FindOptions::new()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::BackendError);
    }
}
