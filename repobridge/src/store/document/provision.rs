use crate::errors::{ErrorKind, RepoError, RepoResult};
use crate::repository::{Index, RepositoryDefinition, TtlConfig};
use crate::store::document::driver::{DocumentSession, IndexSpec, Namespace};
use std::time::Duration;

pub fn index_spec(index: &Index) -> IndexSpec {
    IndexSpec {
        name: index.name(),
        keys: index.fields().to_vec(),
        unique: index.is_unique(),
        sparse: true,
        background: true,
        expire_after: None,
    }
}

/// The expiry index; its name never collides with a declared index.
pub fn ttl_index_spec(ttl: &TtlConfig) -> IndexSpec {
    IndexSpec {
        name: format!("{}_ttl", ttl.ttl_field()),
        keys: vec![ttl.ttl_field().to_string()],
        unique: false,
        sparse: false,
        background: true,
        expire_after: Some(Duration::from_secs(ttl.ttl_seconds().unsigned_abs())),
    }
}

/// Creates the declared indexes and the TTL index of a collection.
///
/// Safe to run repeatedly. An index that already exists with other options is
/// kept as it is, except for the TTL index which is dropped and re-created so
/// that a changed expiry takes effect. Only an index created here under the
/// TTL name is ever dropped; any other index over the TTL field makes
/// provisioning fail.
pub fn prepare_collection<S: DocumentSession>(
    session: &S,
    ns: &Namespace,
    definition: &RepositoryDefinition,
) -> RepoResult<()> {
    definition.validate()?;

    for index in definition.indexes() {
        let spec = index_spec(index);
        match session.create_index(ns, &spec) {
            Ok(()) => log::debug!("Ensured index {} on {}", spec.name, ns),
            Err(err) if err.is_index_conflict() => {
                log::warn!("Index {} already exists on {} with other options: {}", spec.name, ns, err);
            }
            Err(err) => {
                log::error!("Failed to create index {} on {}: {}", spec.name, ns, err);
                return Err(RepoError::new_with_cause(
                    &format!("failed to create index {} on {}", spec.name, ns),
                    ErrorKind::BackendError,
                    err.into(),
                ));
            }
        }
    }

    if let Some(ttl) = definition.ttl() {
        let spec = ttl_index_spec(ttl);
        let created = match session.create_index(ns, &spec) {
            Err(err) if err.is_index_conflict() => {
                log::warn!("Re-creating TTL index {} on {}: {}", spec.name, ns, err);
                session
                    .drop_index(ns, &spec.name)
                    .and_then(|_| session.create_index(ns, &spec))
            }
            other => other,
        };

        if let Err(err) = created {
            log::error!("Failed to create TTL index {} on {}: {}", spec.name, ns, err);
            return Err(RepoError::new_with_cause(
                &format!("failed to create ttl index on {}", ns),
                ErrorKind::BackendError,
                err.into(),
            ));
        }
    }
    Ok(())
}
