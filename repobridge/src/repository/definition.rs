use crate::errors::{RepoError, RepoResult};

/// A secondary index declared for a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    fields: Vec<String>,
    unique: bool,
}

impl Index {
    /// Creates an index over `fields`, in order. At least one field is required.
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>, unique: bool) -> RepoResult<Index> {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() || fields.iter().any(|f| f.is_empty()) {
            log::error!("Index requires at least one non-empty field");
            return Err(RepoError::invalid_input("index requires at least one non-empty field"));
        }
        Ok(Index { fields, unique })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Conventional index name: each field suffixed with its direction, e.g. `email_1_name_1`.
    pub fn name(&self) -> String {
        self.fields
            .iter()
            .map(|field| format!("{}_1", field))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Time-to-live settings of a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlConfig {
    enabled: bool,
    ttl_seconds: i64,
    ttl_field: String,
}

impl TtlConfig {
    /// Expires records `ttl_seconds` after the timestamp held in `ttl_field`.
    pub fn new(ttl_field: &str, ttl_seconds: i64) -> Self {
        TtlConfig {
            enabled: true,
            ttl_seconds,
            ttl_field: ttl_field.to_string(),
        }
    }

    pub fn disabled() -> Self {
        TtlConfig {
            enabled: false,
            ttl_seconds: 0,
            ttl_field: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    pub fn ttl_field(&self) -> &str {
        &self.ttl_field
    }

    /// Checks the settings of an enabled TTL; fails with `BackendError`.
    pub fn validate(&self) -> RepoResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.ttl_field.is_empty() {
            log::error!("TTL is enabled but no TTL attribute is configured");
            return Err(RepoError::backend("ttl attribute must be configured when ttl is enabled"));
        }
        if self.ttl_seconds <= 0 {
            log::error!("TTL is enabled with non-positive duration {}", self.ttl_seconds);
            return Err(RepoError::backend("ttl must be greater than zero when ttl is enabled"));
        }
        Ok(())
    }
}

/// Declarative description of a repository: its collection name, indexes,
/// identity mode and optional expiry.
///
/// # Examples
///
/// ```rust
/// use repobridge::repository::{Index, RepositoryDefinition, TtlConfig};
///
/// let definition = RepositoryDefinition::new("users")
///     .with_index(Index::new(["email"], true).unwrap())
///     .with_ttl(TtlConfig::new("expires_at", 3600));
///
/// assert_eq!(definition.name(), "users");
/// assert!(!definition.is_custom_id());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDefinition {
    name: String,
    indexes: Vec<Index>,
    custom_id: bool,
    ttl: Option<TtlConfig>,
}

impl RepositoryDefinition {
    pub fn new(name: &str) -> Self {
        RepositoryDefinition {
            name: name.to_string(),
            indexes: Vec::new(),
            custom_id: false,
            ttl: None,
        }
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Switches to caller-managed identity: the record's own `id` becomes the
    /// internal key as-is.
    pub fn with_custom_id(mut self, custom_id: bool) -> Self {
        self.custom_id = custom_id;
        self
    }

    pub fn with_ttl(mut self, ttl: TtlConfig) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn is_custom_id(&self) -> bool {
        self.custom_id
    }

    /// TTL settings, only if enabled.
    pub fn ttl(&self) -> Option<&TtlConfig> {
        self.ttl.as_ref().filter(|ttl| ttl.is_enabled())
    }

    /// Validates everything provisioning depends on; fails with `BackendError`.
    pub fn validate(&self) -> RepoResult<()> {
        if self.name.is_empty() {
            log::error!("Repository definition has no collection name");
            return Err(RepoError::backend("collection name is required"));
        }
        if let Some(ttl) = self.ttl() {
            ttl.validate()?;
            let field = ttl.ttl_field();
            if self.indexes.iter().any(|index| matches!(index.fields(), [only] if only == field)) {
                log::error!("Index on {} collides with the TTL index of {}", field, self.name);
                return Err(RepoError::backend(&format!(
                    "field {} cannot carry both a declared index and the ttl index",
                    field
                )));
            }
        }
        Ok(())
    }
}
