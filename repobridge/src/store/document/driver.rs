use crate::errors::{ErrorKind, RepoError};
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;

/// Server code of a duplicate key violation.
pub const DUPLICATE_KEY_CODE: i32 = 11000;
/// Server code of "index already exists with different options".
pub const INDEX_OPTIONS_CONFLICT_CODE: i32 = 85;
/// Server code of "index already exists with a different key specification".
pub const INDEX_KEY_SPECS_CONFLICT_CODE: i32 = 86;

/// Errors raised by a document driver, before they are mapped onto the
/// repository error kinds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("document not found")]
    NotFound,

    #[error("duplicate key error (code {code}): {message}")]
    DuplicateKey { code: i32, message: String },

    #[error("index options conflict (code {code}): {message}")]
    IndexOptionsConflict { code: i32, message: String },

    #[error("bad query: {0}")]
    BadQuery(String),

    #[error("connection is closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

impl DriverError {
    /// Classifies a server error code.
    pub fn from_code(code: i32, message: &str) -> DriverError {
        match code {
            DUPLICATE_KEY_CODE | 11001 | 12582 => DriverError::DuplicateKey {
                code,
                message: message.to_string(),
            },
            INDEX_OPTIONS_CONFLICT_CODE | INDEX_KEY_SPECS_CONFLICT_CODE => DriverError::IndexOptionsConflict {
                code,
                message: message.to_string(),
            },
            _ => DriverError::Transport(format!("(code {}) {}", code, message)),
        }
    }

    pub fn is_index_conflict(&self) -> bool {
        matches!(self, DriverError::IndexOptionsConflict { .. })
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

impl From<DriverError> for RepoError {
    fn from(err: DriverError) -> Self {
        let kind = match &err {
            DriverError::NotFound => ErrorKind::NotFound,
            DriverError::DuplicateKey { .. } => ErrorKind::AlreadyExists,
            DriverError::IndexOptionsConflict { .. } => ErrorKind::BackendError,
            DriverError::BadQuery(_) => ErrorKind::InvalidInput,
            DriverError::Closed => ErrorKind::BackendError,
            DriverError::Transport(_) => ErrorKind::Internal,
        };
        RepoError::new(&err.to_string(), kind)
    }
}

/// Fully qualified collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    pub fn new(database: &str, collection: &str) -> Self {
        Namespace {
            database: database.to_string(),
            collection: collection.to_string(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// An index as understood by the document driver.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<String>,
    pub unique: bool,
    pub sparse: bool,
    pub background: bool,
    pub expire_after: Option<Duration>,
}

impl IndexSpec {
    /// Options other than the name and keys; two specs with the same keys but
    /// different options conflict.
    pub fn same_options(&self, other: &IndexSpec) -> bool {
        self.unique == other.unique && self.sparse == other.sparse && self.expire_after == other.expire_after
    }
}

/// Sort, skip and limit of a driver level find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    /// Field and direction, `1` ascending, `-1` descending.
    pub sort: Option<(String, i32)>,
    pub skip: u64,
    pub limit: Option<i64>,
}

/// A short-lived handle on a document store connection.
///
/// Every repository operation acquires one session and drops it when done;
/// dropping the session releases whatever it holds.
pub trait DocumentSession {
    fn find_one(&self, ns: &Namespace, filter: &bson::Document) -> DriverResult<Option<bson::Document>>;

    fn find(&self, ns: &Namespace, filter: &bson::Document, spec: &FindSpec) -> DriverResult<Vec<bson::Document>>;

    fn insert_one(&self, ns: &Namespace, document: bson::Document) -> DriverResult<()>;

    /// Applies `update` to the first match, returning the number of matched documents.
    fn update_one(&self, ns: &Namespace, filter: &bson::Document, update: &bson::Document) -> DriverResult<u64>;

    fn delete_one(&self, ns: &Namespace, filter: &bson::Document) -> DriverResult<u64>;

    fn delete_many(&self, ns: &Namespace, filter: &bson::Document) -> DriverResult<u64>;

    fn create_index(&self, ns: &Namespace, index: &IndexSpec) -> DriverResult<()>;

    fn drop_index(&self, ns: &Namespace, name: &str) -> DriverResult<()>;
}

/// A live connection to a document store.
pub trait DocumentStore: Clone + Send + Sync + 'static {
    type Session: DocumentSession;

    /// Opens a session scoped to a single operation.
    fn session(&self) -> DriverResult<Self::Session>;

    /// Closes the connection; later sessions fail with [`DriverError::Closed`].
    fn close(&self) -> DriverResult<()>;
}
