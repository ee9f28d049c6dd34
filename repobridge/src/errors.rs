use backtrace::Backtrace;
use parking_lot::RwLock;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Error kinds observable by callers of a repository.
///
/// Backend-native failures never cross the repository boundary as-is: they are
/// inspected where they occur and mapped onto one of these kinds. Callers branch
/// on the kind only.
///
/// # Examples
///
/// ```rust
/// use repobridge::errors::{ErrorKind, RepoError, RepoResult};
///
/// fn lookup() -> RepoResult<()> {
///     Err(RepoError::not_found("no record matches the filter"))
/// }
///
/// assert_eq!(lookup().unwrap_err().kind(), &ErrorKind::NotFound);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ErrorKind {
    /// Malformed filter, malformed identity string or an object of the wrong shape.
    InvalidInput,
    /// The requested record (or the target of a filtered update/delete) does not exist.
    NotFound,
    /// A unique index or a duplicate primary key was violated.
    AlreadyExists,
    /// Configuration or provisioning failure: missing connection, missing
    /// namespace, invalid TTL settings, failed index creation.
    BackendError,
    /// An unexpected transport or engine failure that has no better mapping.
    Internal,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidInput => write!(f, "Invalid input"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::AlreadyExists => write!(f, "Already exists"),
            ErrorKind::BackendError => write!(f, "Backend error"),
            ErrorKind::Internal => write!(f, "Internal error"),
        }
    }
}

/// Error type of every repobridge operation.
///
/// Carries a message, the [`ErrorKind`] callers branch on, an optional cause
/// forming an error chain, and a backtrace captured at construction.
#[derive(Clone)]
pub struct RepoError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<RepoError>>,
    backtrace: Arc<RwLock<Backtrace>>,
}

impl RepoError {
    /// Creates a new error with the given message and kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        RepoError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Arc::new(RwLock::new(Backtrace::new_unresolved())),
        }
    }

    /// Creates a new error that keeps `cause` as the next link of the chain.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: RepoError) -> Self {
        RepoError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(RwLock::new(Backtrace::new_unresolved())),
        }
    }

    pub fn invalid_input(message: &str) -> Self {
        RepoError::new(message, ErrorKind::InvalidInput)
    }

    pub fn not_found(message: &str) -> Self {
        RepoError::new(message, ErrorKind::NotFound)
    }

    pub fn already_exists(message: &str) -> Self {
        RepoError::new(message, ErrorKind::AlreadyExists)
    }

    pub fn backend(message: &str) -> Self {
        RepoError::new(message, ErrorKind::BackendError)
    }

    pub fn internal(message: &str) -> Self {
        RepoError::new(message, ErrorKind::Internal)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&RepoError> {
        self.cause.as_deref()
    }

    /// Returns `true` if this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.error_kind == kind
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "[{}] {}\nCaused by: {:?}", self.error_kind, self.message, cause),
            None => {
                let mut backtrace = self.backtrace.write();
                backtrace.resolve();
                write!(f, "[{}] {}\n{:?}", self.error_kind, self.message, *backtrace)
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// Shorthand for `Result<T, RepoError>`.
pub type RepoResult<T> = Result<T, RepoError>;

impl From<std::io::Error> for RepoError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        };
        RepoError::new(&format!("IO error: {}", err), error_kind)
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        RepoError::new(&format!("JSON error: {}", err), ErrorKind::InvalidInput)
    }
}

impl From<regex::Error> for RepoError {
    fn from(err: regex::Error) -> Self {
        RepoError::new(&format!("Invalid pattern: {}", err), ErrorKind::InvalidInput)
    }
}
