use crate::repository::{employee_definition, employee_document, is_hex_id};
use repobridge::doc;
use repobridge::errors::ErrorKind;
use repobridge::filter::Filter;
use repobridge::repository::{FindOptions, RepositoryDefinition};
use repobridge_int_test::test_util::{cleanup, create_test_context, run_test, BACKENDS, DOCUMENT};

fn key_len(backend: &str) -> usize {
    if backend == DOCUMENT {
        12
    } else {
        16
    }
}

#[test]
fn test_insert_returns_fresh_hex_ids() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("employees"))?;

                let first = repo.save(employee_document("Ada", 36), None)?;
                let second = repo.save(employee_document("Grace", 45), None)?;

                let first_id = first.get_str("id").unwrap();
                let second_id = second.get_str("id").unwrap();
                assert!(is_hex_id(first_id, key_len(backend)), "{}: {}", backend, first_id);
                assert!(is_hex_id(second_id, key_len(backend)), "{}: {}", backend, second_id);
                assert_ne!(first_id, second_id);

                // the enriched object carries the payload
                assert_eq!(first.get_str("fullName"), Some("Ada"));
                assert!(!first.contains_key("_id"));
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_caller_id_is_ignored_on_insert() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("employees"))?;
                let mut payload = employee_document("Ada", 36);
                payload.insert("id", "0123456789abcdef01234567");

                let saved = repo.save(payload, None)?;
                assert_ne!(saved.get_str("id"), Some("0123456789abcdef01234567"));
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_unique_index_collision_already_exists() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, employee_definition("employees"))?;

                let first = repo.save(employee_document("Ada", 36), None)?;
                assert!(is_hex_id(first.get_str("id").unwrap(), key_len(backend)));

                let err = repo.save(employee_document("Ada", 40), None).unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::AlreadyExists, "{}", backend);

                // the failed insert left nothing behind
                let all = repo.get_all(&Filter::new(), &FindOptions::new())?;
                assert_eq!(all.len(), 1);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_zero_matches() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("employees"))?;
                repo.save(employee_document("Ada", 36), None)?;

                let filter = Filter::new().eq("fullName", "Nobody");
                let err = repo.get_one(&filter).unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::NotFound, "{}", backend);

                let all = repo.get_all(&filter, &FindOptions::new())?;
                assert!(all.is_empty());

                let err = repo.delete_one(&filter).unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::NotFound);
                assert_eq!(repo.delete_all(&filter)?, 0);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_delete_one_then_get_one() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("employees"))?;
                let saved = repo.save(employee_document("Ada", 36), None)?;
                let filter = Filter::new().by_id(saved.get_str("id").unwrap());

                assert_eq!(repo.get_one(&filter)?, saved);
                repo.delete_one(&filter)?;

                let err = repo.get_one(&filter).unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::NotFound, "{}", backend);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_delete_all() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("employees"))?;
                for (name, age) in [("Ada", 36), ("Alan", 41), ("Grace", 45)] {
                    repo.save(employee_document(name, age), None)?;
                }

                assert_eq!(repo.delete_all(&Filter::new().pattern("fullName", "A%"))?, 2);
                let rest = repo.get_all(&Filter::new(), &FindOptions::new())?;
                assert_eq!(rest.len(), 1);
                assert_eq!(rest[0].get_str("fullName"), Some("Grace"));

                assert_eq!(repo.delete_all(&Filter::new())?, 1);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_update_sets_fields_of_first_match() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, employee_definition("employees"))?;
                let ada = repo.save(employee_document("Ada", 36), None)?;
                let grace = repo.save(employee_document("Grace", 45), None)?;

                let filter = Filter::new().by_id(ada.get_str("id").unwrap());
                let updated = repo.save(doc! { age: 37, team: "engines" }, Some(&filter))?;
                assert_eq!(updated.get_str("id"), ada.get_str("id"));
                assert_eq!(updated.get_str("fullName"), Some("Ada"));
                assert_eq!(updated.get_str("team"), Some("engines"));
                assert_eq!(repo.get_one(&filter)?, updated);

                // a unique violation on update
                let err = repo
                    .save(doc! { emailAddress: "grace@example.com" }, Some(&filter))
                    .unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::AlreadyExists, "{}", backend);
                let untouched = repo.get_one(&Filter::new().by_id(grace.get_str("id").unwrap()))?;
                assert_eq!(untouched, grace);

                let err = repo
                    .save(doc! { age: 1 }, Some(&Filter::new().eq("fullName", "Nobody")))
                    .unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::NotFound);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_update_cannot_change_identity() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("employees"))?;
                let saved = repo.save(employee_document("Ada", 36), None)?;
                let id = saved.get_str("id").unwrap().to_string();
                let filter = Filter::new().by_id(&id);

                let other_id = "ffffffffffffffffffffffffffffffff"[..key_len(backend) * 2].to_string();
                let updated = repo.save(doc! { id: (other_id.as_str()), age: 37 }, Some(&filter))?;

                // the age changed, the id did not
                assert_eq!(updated.get_str("id"), Some(id.as_str()));
                assert_eq!(repo.get_one(&filter)?.get_str("id"), Some(id.as_str()));
                let err = repo.get_one(&Filter::new().by_id(&other_id)).unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::NotFound, "{}", backend);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_malformed_id_is_invalid_input() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("employees"))?;
                for id in ["not-hex", "abc", "0123"] {
                    let err = repo.get_one(&Filter::new().by_id(id)).unwrap_err();
                    assert_eq!(err.kind(), &ErrorKind::InvalidInput, "{} {}", backend, id);
                }
            }
            Ok(())
        },
        cleanup,
    )
}
