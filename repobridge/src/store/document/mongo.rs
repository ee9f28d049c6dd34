//! MongoDB driver, enabled by the `mongodb` feature.

use crate::backend::BackendConfig;
use crate::errors::{ErrorKind, RepoError, RepoResult};
use crate::store::document::driver::{
    DocumentSession, DocumentStore, DriverError, DriverResult, FindSpec, IndexSpec, Namespace,
};
use bson::doc;
use mongodb::error::{Error as MongoError, ErrorKind as MongoErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, Credential, FindOptions, IndexOptions, ServerAddress};
use mongodb::sync::{Client, Collection};
use mongodb::IndexModel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on connecting to and selecting a server.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

fn map_mongo_error(err: MongoError) -> DriverError {
    match err.kind.as_ref() {
        MongoErrorKind::Write(WriteFailure::WriteError(failure)) => {
            DriverError::from_code(failure.code, &failure.message)
        }
        MongoErrorKind::Command(failure) => DriverError::from_code(failure.code, &failure.message),
        _ => DriverError::Transport(err.to_string()),
    }
}

/// Parses a comma separated host list such as `db1:27017,db2:27017`.
pub fn parse_hosts(hosts: &str) -> RepoResult<Vec<ServerAddress>> {
    let hosts = hosts
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(|host| {
            ServerAddress::parse(host).map_err(|err| {
                log::error!("Invalid MongoDB host '{}': {}", host, err);
                RepoError::backend(&format!("invalid host '{}': {}", host, err))
            })
        })
        .collect::<RepoResult<Vec<_>>>()?;

    if hosts.is_empty() {
        return Err(RepoError::backend("at least one host is required"));
    }
    Ok(hosts)
}

struct MongoStoreInner {
    client: Client,
    closed: AtomicBool,
}

/// A connection pool to a MongoDB deployment.
#[derive(Clone)]
pub struct MongoStore {
    inner: Arc<MongoStoreInner>,
}

impl MongoStore {
    /// Connects with the configured hosts and credentials and checks the
    /// deployment is reachable.
    pub fn connect(config: &BackendConfig) -> RepoResult<Self> {
        let mut options = ClientOptions::default();
        options.hosts = parse_hosts(&config.host)?;
        options.connect_timeout = Some(DIAL_TIMEOUT);
        options.server_selection_timeout = Some(DIAL_TIMEOUT);
        options.app_name = Some("repobridge".to_string());

        if !config.credentials.username.is_empty() {
            let mut credential = Credential::default();
            credential.username = Some(config.credentials.username.clone());
            credential.password = Some(config.credentials.password.clone());
            credential.source = Some(config.database.clone());
            options.credential = Some(credential);
        }

        let client = Client::with_options(options).map_err(|err| {
            log::error!("Failed to create MongoDB client for {}: {}", config.host, err);
            RepoError::new_with_cause("failed to create mongodb client", ErrorKind::BackendError, map_mongo_error(err).into())
        })?;

        client
            .database(&config.database)
            .run_command(doc! { "ping": 1 }, None)
            .map_err(|err| {
                log::error!("Failed to reach MongoDB at {}: {}", config.host, err);
                RepoError::new_with_cause("failed to connect to mongodb", ErrorKind::BackendError, map_mongo_error(err).into())
            })?;

        Ok(MongoStore {
            inner: Arc::new(MongoStoreInner {
                client,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

impl DocumentStore for MongoStore {
    type Session = MongoSession;

    fn session(&self) -> DriverResult<MongoSession> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        Ok(MongoSession {
            client: self.inner.client.clone(),
        })
    }

    fn close(&self) -> DriverResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        Ok(())
    }
}

/// A handle on the shared pool, scoped to one operation.
pub struct MongoSession {
    client: Client,
}

impl MongoSession {
    fn collection(&self, ns: &Namespace) -> Collection<bson::Document> {
        self.client.database(ns.database()).collection(ns.collection())
    }
}

impl DocumentSession for MongoSession {
    fn find_one(&self, ns: &Namespace, filter: &bson::Document) -> DriverResult<Option<bson::Document>> {
        self.collection(ns)
            .find_one(filter.clone(), None)
            .map_err(map_mongo_error)
    }

    fn find(&self, ns: &Namespace, filter: &bson::Document, spec: &FindSpec) -> DriverResult<Vec<bson::Document>> {
        let mut options = FindOptions::default();
        options.sort = spec.sort.as_ref().map(|(field, direction)| {
            let mut sort = bson::Document::new();
            sort.insert(field.clone(), *direction);
            sort
        });
        if spec.skip > 0 {
            options.skip = Some(spec.skip);
        }
        options.limit = spec.limit;

        let cursor = self
            .collection(ns)
            .find(filter.clone(), options)
            .map_err(map_mongo_error)?;
        cursor
            .map(|document| document.map_err(map_mongo_error))
            .collect()
    }

    fn insert_one(&self, ns: &Namespace, document: bson::Document) -> DriverResult<()> {
        self.collection(ns)
            .insert_one(document, None)
            .map(|_| ())
            .map_err(map_mongo_error)
    }

    fn update_one(&self, ns: &Namespace, filter: &bson::Document, update: &bson::Document) -> DriverResult<u64> {
        self.collection(ns)
            .update_one(filter.clone(), update.clone(), None)
            .map(|result| result.matched_count)
            .map_err(map_mongo_error)
    }

    fn delete_one(&self, ns: &Namespace, filter: &bson::Document) -> DriverResult<u64> {
        self.collection(ns)
            .delete_one(filter.clone(), None)
            .map(|result| result.deleted_count)
            .map_err(map_mongo_error)
    }

    fn delete_many(&self, ns: &Namespace, filter: &bson::Document) -> DriverResult<u64> {
        self.collection(ns)
            .delete_many(filter.clone(), None)
            .map(|result| result.deleted_count)
            .map_err(map_mongo_error)
    }

    fn create_index(&self, ns: &Namespace, index: &IndexSpec) -> DriverResult<()> {
        let mut keys = bson::Document::new();
        for key in &index.keys {
            keys.insert(key.clone(), 1);
        }

        let mut options = IndexOptions::default();
        options.name = Some(index.name.clone());
        options.unique = Some(index.unique);
        options.sparse = Some(index.sparse);
        options.background = Some(index.background);
        options.expire_after = index.expire_after;

        let model = IndexModel::builder().keys(keys).options(options).build();
        self.collection(ns)
            .create_index(model, None)
            .map(|_| ())
            .map_err(map_mongo_error)
    }

    fn drop_index(&self, ns: &Namespace, name: &str) -> DriverResult<()> {
        self.collection(ns)
            .drop_index(name, None)
            .map_err(map_mongo_error)
    }
}
