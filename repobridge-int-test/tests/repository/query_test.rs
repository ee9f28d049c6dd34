use crate::repository::employee_document;
use rand::rng;
use rand::seq::SliceRandom;
use repobridge::common::{Document, Value};
use repobridge::doc;
use repobridge::filter::Filter;
use repobridge::repository::{FindOptions, Repository, RepositoryDefinition, SortOrder};
use repobridge_int_test::test_util::{cleanup, create_test_context, run_test, BACKENDS};
use std::collections::BTreeSet;

fn codes(repo: &dyn Repository, pattern: &str) -> BTreeSet<String> {
    repo.get_all(&Filter::new().pattern("code", pattern), &FindOptions::new())
        .unwrap()
        .iter()
        .filter_map(|document| document.get_str("code").map(str::to_string))
        .collect()
}

fn set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn test_wildcard_patterns() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("codes"))?;
                for code in ["ab", "axyzb", "xab", "abc", "100%", "1000", "a.b", "a+b"] {
                    repo.save(doc! { code: code }, None)?;
                }

                assert_eq!(codes(repo.as_ref(), "a%b"), set(&["ab", "axyzb", "a.b", "a+b"]), "{}", backend);
                assert_eq!(codes(repo.as_ref(), "100%%"), set(&["100%"]));
                assert_eq!(codes(repo.as_ref(), "100%"), set(&["100%", "1000"]));
                assert_eq!(codes(repo.as_ref(), "%b"), set(&["ab", "axyzb", "xab", "a.b", "a+b"]));
                assert_eq!(codes(repo.as_ref(), "%xy%"), set(&["axyzb"]));

                // no wildcard: only the literal itself, regex metacharacters included
                assert_eq!(codes(repo.as_ref(), "ab"), set(&["ab"]));
                assert_eq!(codes(repo.as_ref(), "a.b"), set(&["a.b"]));
                assert_eq!(codes(repo.as_ref(), "a+b"), set(&["a+b"]));
                assert_eq!(codes(repo.as_ref(), "AB"), set(&[]));
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_comma_separated_values_match_any() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("tickets"))?;
                for status in ["new", "open", "closed"] {
                    repo.save(doc! { status: status }, None)?;
                }

                let found = repo.get_all(&Filter::new().eq("status", "new,open"), &FindOptions::new())?;
                assert_eq!(found.len(), 2, "{}", backend);

                let found = repo.get_all(&Filter::new().eq("status", "closed"), &FindOptions::new())?;
                assert_eq!(found.len(), 1);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_id_list_matches_each_key() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("employees"))?;
                let mut ids = Vec::new();
                for name in ["Ada", "Alan", "Grace", "Linus"] {
                    let saved = repo.save(employee_document(name, 30), None)?;
                    ids.push(saved.get_str("id").unwrap().to_string());
                }

                let filter = Filter::new().by_id(&ids[..3].join(","));
                let found = repo.get_all(&filter, &FindOptions::new())?;
                let found_ids: BTreeSet<String> = found
                    .iter()
                    .map(|document| document.get_str("id").unwrap().to_string())
                    .collect();
                assert_eq!(found_ids, ids[..3].iter().cloned().collect(), "{}", backend);

                assert_eq!(repo.delete_all(&Filter::new().by_id(&ids[2..].join(",")))?, 2);
                assert_eq!(repo.get_all(&Filter::new(), &FindOptions::new())?.len(), 2);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_sort_and_paginate() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("ranked"))?;
                let mut scores = vec![50, 10, 40, 20, 30];
                scores.shuffle(&mut rng());
                for score in scores {
                    repo.save(doc! { score: score, group: "a" }, None)?;
                }

                let options = FindOptions::new()
                    .sort_by("score", SortOrder::Ascending)
                    .limit(2)
                    .offset(1);
                let page = repo.get_all(&Filter::new().eq("group", "a"), &options)?;
                let ranked: Vec<&Value> = page.iter().filter_map(|document| document.get("score")).collect();
                assert_eq!(ranked, vec![&Value::I32(20), &Value::I32(30)], "{}", backend);

                let options = FindOptions::from_params("score", "desc", 0, 3);
                let page = repo.get_all(&Filter::new(), &options)?;
                let ranked: Vec<&Value> = page.iter().filter_map(|document| document.get("score")).collect();
                assert_eq!(ranked, vec![&Value::I32(20), &Value::I32(10)]);

                let options = FindOptions::new().offset(10);
                assert!(repo.get_all(&Filter::new(), &options)?.is_empty());
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_filters_from_json() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("people"))?;
                repo.save(doc! { name: "johnson", city: "Oslo" }, None)?;
                repo.save(doc! { name: "johnny", city: "Bergen" }, None)?;
                repo.save(doc! { name: "jack", city: "Oslo" }, None)?;

                let filter = Filter::from_json_str(r#"{ "name": { "$pattern": "john%" }, "city": "Oslo,Bergen" }"#)?;
                let found = repo.get_all(&filter, &FindOptions::new())?;
                assert_eq!(found.len(), 2, "{}", backend);

                let err = Filter::from_json_str(r#"{ "name": { "$regex": "john" } }"#)
                    .and_then(|filter| repo.get_all(&filter, &FindOptions::new()))
                    .unwrap_err();
                assert_eq!(err.kind(), &repobridge::errors::ErrorKind::InvalidInput);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_nested_fields_and_arrays() {
    run_test(
        create_test_context,
        |ctx| {
            for backend in BACKENDS {
                let repo = ctx.repository(backend, RepositoryDefinition::new("products"))?;
                let first: Document = doc! { name: "apple", category: ["food", "produce"], origin: { country: "NO" } };
                let second: Document = doc! { name: "chair", category: ["furniture"], origin: { country: "SE" } };
                repo.save(first, None)?;
                repo.save(second, None)?;

                let found = repo.get_one(&Filter::new().eq("category", "produce"))?;
                assert_eq!(found.get_str("name"), Some("apple"), "{}", backend);

                let found = repo.get_one(&Filter::new().eq("origin.country", "SE"))?;
                assert_eq!(found.get_str("name"), Some("chair"));
            }
            Ok(())
        },
        cleanup,
    )
}
