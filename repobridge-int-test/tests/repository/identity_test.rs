use repobridge::common::Value;
use repobridge::doc;
use repobridge::errors::ErrorKind;
use repobridge::filter::Filter;
use repobridge::identity::{normalize_identity_inbound, normalize_identity_list_inbound, normalize_identity_outbound};
use repobridge::repository::{FindOptions, RepositoryDefinition};
use repobridge::store::document::DOCUMENT_IDENTITY;
use repobridge_fjall_adapter::KV_IDENTITY;
use repobridge_int_test::test_util::{cleanup, create_test_context, run_test, BACKENDS, DOCUMENT};

#[test]
fn test_identity_round_trip() {
    for scheme in [&DOCUMENT_IDENTITY, &KV_IDENTITY] {
        for _ in 0..20 {
            let hex = scheme.generate().to_hex();
            let mut document = doc! { id: (hex.as_str()), name: "x" };

            normalize_identity_inbound(&mut document, scheme, false).unwrap();
            assert!(matches!(document.get(scheme.key_field()), Some(Value::Key(_))));

            normalize_identity_outbound(&mut document, scheme, false);
            assert_eq!(document.get_str("id"), Some(hex.as_str()));
        }
    }
}

#[test]
fn test_id_list_becomes_key_list() {
    let ids: Vec<String> = (0..3).map(|_| DOCUMENT_IDENTITY.generate().to_hex()).collect();
    let mut document = doc! { id: (ids.join(",")) };
    normalize_identity_list_inbound(&mut document, &DOCUMENT_IDENTITY, false).unwrap();

    match document.get("_id") {
        Some(Value::Array(keys)) => {
            assert_eq!(keys.len(), 3);
            assert!(keys.iter().all(|key| matches!(key, Value::Key(_))));
        }
        other => panic!("expected a key list, found {:?}", other),
    }
}

#[test]
fn test_custom_ids_are_verbatim() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let definition = RepositoryDefinition::new("accounts").with_custom_id(true);
                let repo = ctx.repository(backend, definition)?;

                let saved = repo.save(doc! { id: "acct-42", owner: "Ada" }, None)?;
                assert_eq!(saved.get_str("id"), Some("acct-42"), "{}", backend);
                if backend == DOCUMENT {
                    // exposed under the native key field as well
                    assert_eq!(saved.get_str("_id"), Some("acct-42"));
                }

                let found = repo.get_one(&Filter::new().by_id("acct-42"))?;
                assert_eq!(found.get_str("owner"), Some("Ada"));

                let err = repo.save(doc! { id: "acct-42", owner: "Grace" }, None).unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::AlreadyExists, "{}", backend);

                let err = repo.save(doc! { owner: "Linus" }, None).unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::InvalidInput, "{}", backend);

                repo.delete_one(&Filter::new().by_id("acct-42"))?;
                assert!(repo.get_all(&Filter::new(), &FindOptions::new())?.is_empty());
            }
            Ok(())
        },
        cleanup,
    )
}
