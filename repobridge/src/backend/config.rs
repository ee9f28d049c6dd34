use crate::errors::{RepoError, RepoResult};
use crate::repository::{Index, RepositoryDefinition, TtlConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::path::Path;

/// Credentials used to authenticate against a backend.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"******")
            .finish()
    }
}

/// A declared index of a configured collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// Configuration of one collection, as found under `collections.<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub indexes: Vec<IndexConfig>,
    #[serde(default)]
    pub enable_ttl: bool,
    #[serde(default)]
    pub ttl: i64,
    #[serde(default)]
    pub ttl_attribute: String,
    #[serde(default)]
    pub custom_id: bool,
}

impl CollectionConfig {
    pub fn new(name: &str) -> Self {
        CollectionConfig {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Builds the repository definition; `fallback_name` is used when the
    /// collection has no explicit name.
    pub fn to_definition(&self, fallback_name: &str) -> RepoResult<RepositoryDefinition> {
        let name = if self.name.is_empty() { fallback_name } else { &self.name };
        let mut definition = RepositoryDefinition::new(name).with_custom_id(self.custom_id);

        for index in &self.indexes {
            let index = Index::new(index.columns.iter().cloned(), index.unique).map_err(|err| {
                RepoError::new_with_cause(
                    &format!("invalid index on collection {}", name),
                    crate::errors::ErrorKind::BackendError,
                    err,
                )
            })?;
            definition = definition.with_index(index);
        }

        if self.enable_ttl {
            definition = definition.with_ttl(TtlConfig::new(&self.ttl_attribute, self.ttl));
        }
        Ok(definition)
    }
}

/// Configuration of one backend instance.
///
/// ```json
/// {
///   "type": "memory",
///   "host": "localhost",
///   "database": "app",
///   "credentials": { "username": "u", "password": "p" },
///   "collections": {
///     "users": {
///       "name": "users",
///       "indexes": [{ "columns": ["email"], "unique": true }],
///       "enableTtl": true, "ttl": 3600, "ttlAttribute": "created"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionConfig>,
    /// Backend specific settings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl BackendConfig {
    pub fn new(kind: &str, host: &str, database: &str) -> Self {
        BackendConfig {
            kind: kind.to_string(),
            host: host.to_string(),
            database: database.to_string(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        self
    }

    pub fn with_collection(mut self, key: &str, collection: CollectionConfig) -> Self {
        self.collections.insert(key.to_string(), collection);
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn from_json_str(json: &str) -> RepoResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Looks a collection up by its key, falling back to its configured name.
    pub fn collection(&self, name: &str) -> Option<(&str, &CollectionConfig)> {
        self.collections
            .get_key_value(name)
            .or_else(|| self.collections.iter().find(|(_, c)| c.name == name))
            .map(|(key, collection)| (key.as_str(), collection))
    }

    /// Checks the settings every backend needs; fails with `BackendError`.
    pub fn validate(&self) -> RepoResult<()> {
        if self.kind.is_empty() {
            log::error!("Backend configuration has no type");
            return Err(RepoError::backend("backend type is required"));
        }
        if self.database.is_empty() {
            log::error!("Backend configuration of type {} has no database", self.kind);
            return Err(RepoError::backend("database name is required"));
        }
        for (key, collection) in &self.collections {
            collection.to_definition(key)?.validate()?;
        }
        Ok(())
    }
}

/// Configuration of every backend, keyed by logical backend name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManagerConfig {
    backends: BTreeMap<String, BackendConfig>,
}

impl ManagerConfig {
    pub fn new() -> Self {
        ManagerConfig::default()
    }

    pub fn with_backend(mut self, name: &str, config: BackendConfig) -> Self {
        self.backends.insert(name.to_string(), config);
        self
    }

    pub fn from_json_str(json: &str) -> RepoResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> RepoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            log::error!("Failed to read configuration {}: {}", path.display(), err);
            RepoError::from(err)
        })?;
        ManagerConfig::from_json_str(&content)
    }

    pub fn get(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.backends.keys()
    }
}
