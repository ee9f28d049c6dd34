use crate::repository::{employee_definition, employee_document};
use chrono::{Duration, SubsecRound, Utc};
use repobridge::backend::{Backend, BackendConfig, BackendManager, CollectionConfig, DocumentBackend};
use repobridge::doc;
use repobridge::errors::ErrorKind;
use repobridge::filter::Filter;
use repobridge::repository::{FindOptions, Index, Repository, RepositoryDefinition, TtlConfig};
use repobridge::store::document::MEMORY_BACKEND;
use repobridge_fjall_adapter::{open_backend, FJALL_BACKEND};
use repobridge_int_test::test_util::{
    cleanup, create_test_context, random_path, run_test, test_config, BACKENDS, DOCUMENT, KEY_VALUE,
};
use std::fs;
use std::sync::Arc;

#[test]
fn test_empty_ttl_attribute_fails_provisioning() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let definition = RepositoryDefinition::new("sessions").with_ttl(TtlConfig::new("", 3600));
                let err = ctx.repository(backend, definition).err().map(|e| *e.kind());
                assert_eq!(err, Some(ErrorKind::BackendError), "{}", backend);

                let definition = RepositoryDefinition::new("sessions").with_ttl(TtlConfig::new("expires", 0));
                let err = ctx.repository(backend, definition).err().map(|e| *e.kind());
                assert_eq!(err, Some(ErrorKind::BackendError), "{}", backend);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_configured_ttl_without_attribute_fails() {
    let mut collection = CollectionConfig::new("sessions");
    collection.enable_ttl = true;
    collection.ttl = 3600;

    let path = random_path();
    let mut config = test_config(&path);
    for backend in BACKENDS {
        let backend_config = config.get(backend).unwrap().clone().with_collection("sessions", collection.clone());
        config = config.with_backend(backend, backend_config);
    }

    let manager = BackendManager::new(config);
    repobridge_fjall_adapter::register(&manager);
    for backend in BACKENDS {
        let err = manager.repository(backend, "sessions").err().map(|e| *e.kind());
        assert_eq!(err, Some(ErrorKind::BackendError), "{}", backend);
    }

    manager.shutdown().unwrap();
    let _ = fs::remove_dir_all(&path);
}

#[test]
fn test_repositories_are_cached_per_collection() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let first = ctx.repository(backend, employee_definition("employees"))?;
                let second = ctx.repository(backend, employee_definition("employees"))?;
                assert!(Arc::ptr_eq(&first, &second), "{}", backend);
            }
            Ok(())
        },
        cleanup,
    )
}

fn relaxed_employee_definition() -> RepositoryDefinition {
    // same index name as employee_definition, other options
    RepositoryDefinition::new("employees").with_index(Index::new(["emailAddress"], false).unwrap())
}

fn assert_original_index_kept(repo: Arc<dyn Repository>) {
    repo.save(employee_document("Ada", 36), None).unwrap();
    let err = repo.save(employee_document("Ada", 37), None).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::AlreadyExists);
}

#[test]
fn test_conflicting_index_is_tolerated() {
    let backend = DocumentBackend::memory(DOCUMENT, BackendConfig::new(MEMORY_BACKEND, "local", "app")).unwrap();
    backend.build_repository(employee_definition("employees")).unwrap();
    assert_original_index_kept(backend.build_repository(relaxed_employee_definition()).unwrap());
    backend.shutdown().unwrap();

    let path = random_path();
    let backend = open_backend(KEY_VALUE, BackendConfig::new(FJALL_BACKEND, &path, "app")).unwrap();
    backend.build_repository(employee_definition("employees")).unwrap();
    assert_original_index_kept(backend.build_repository(relaxed_employee_definition()).unwrap());
    backend.shutdown().unwrap();
    let _ = fs::remove_dir_all(&path);
}

#[test]
fn test_kv_provisioning_survives_reopen() {
    run_test(
        create_test_context,
        |ctx| {
            let repo = ctx.repository(KEY_VALUE, employee_definition("employees"))?;
            let saved = repo.save(employee_document("Ada", 36), None)?;
            ctx.manager().shutdown()?;

            // a second manager over the same keyspace
            let manager = BackendManager::new(test_config(ctx.path()));
            repobridge_fjall_adapter::register(&manager);
            let repo = manager.get_backend(KEY_VALUE)?.define_repository(employee_definition("employees"))?;

            let found = repo.get_one(&Filter::new().by_id(saved.get_str("id").unwrap()))?;
            assert_eq!(found, saved);
            let err = repo.save(employee_document("Ada", 50), None).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::AlreadyExists);

            manager.shutdown()
        },
        cleanup,
    )
}

#[test]
fn test_ttl_field_is_a_creation_timestamp() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let definition = RepositoryDefinition::new("sessions").with_ttl(TtlConfig::new("created", 3600));
                let repo = ctx.repository(backend, definition)?;

                let created = (Utc::now() - Duration::seconds(10)).trunc_subsecs(3);
                let saved = repo.save(doc! { user: "ada", created: created }, None)?;
                assert_eq!(saved.get("created").and_then(|value| value.as_datetime()), Some(&created), "{}", backend);

                // refreshing the timestamp keeps the record alive
                let filter = Filter::new().by_id(saved.get_str("id").unwrap());
                let touched_at = Utc::now().trunc_subsecs(3);
                let touched = repo.save(doc! { created: touched_at }, Some(&filter))?;
                assert_eq!(touched.get("created").and_then(|value| value.as_datetime()), Some(&touched_at), "{}", backend);
                assert_eq!(repo.get_one(&filter)?.get_str("user"), Some("ada"));

                // a timestamp older than the ttl hides it
                let err = repo
                    .save(doc! { created: (touched_at - Duration::seconds(3601)) }, Some(&filter))
                    .unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::NotFound, "{}", backend);
                assert!(repo.get_all(&Filter::new(), &FindOptions::new())?.is_empty());
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_index_on_ttl_field_fails_provisioning() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let definition = RepositoryDefinition::new("sessions")
                    .with_index(Index::new(["created"], true).unwrap())
                    .with_ttl(TtlConfig::new("created", 3600));
                let err = ctx.repository(backend, definition).err().map(|e| *e.kind());
                assert_eq!(err, Some(ErrorKind::BackendError), "{}", backend);

                // the unique index stays enforced once the ttl is elsewhere
                let definition = RepositoryDefinition::new("sessions")
                    .with_index(Index::new(["created"], true).unwrap())
                    .with_ttl(TtlConfig::new("touched", 3600));
                let repo = ctx.repository(backend, definition)?;
                let created = Utc::now().trunc_subsecs(3);
                repo.save(doc! { user: "ada", created: created }, None)?;
                let err = repo.save(doc! { user: "grace", created: created }, None).unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::AlreadyExists, "{}", backend);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_document_ttl_index() {
    run_test(
        create_test_context,
        |ctx| {
            let definition = RepositoryDefinition::new("sessions").with_ttl(TtlConfig::new("createdAt", 60));
            let repo = ctx.repository(DOCUMENT, definition)?;

            repo.save(doc! { user: "fresh", createdAt: (Utc::now()) }, None)?;
            repo.save(doc! { user: "stale", createdAt: (Utc::now() - Duration::seconds(120)) }, None)?;

            let found = repo.get_all(&Filter::new(), &FindOptions::new())?;
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].get_str("user"), Some("fresh"));
            Ok(())
        },
        cleanup,
    )
}
