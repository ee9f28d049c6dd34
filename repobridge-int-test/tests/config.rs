use repobridge::backend::{BackendManager, ManagerConfig};
use repobridge::doc;
use repobridge::errors::ErrorKind;
use repobridge::filter::Filter;
use repobridge::repository::FindOptions;
use repobridge_int_test::test_util::{random_path, KEY_VALUE};
use std::fs;

fn manager_json(path: &str) -> String {
    format!(
        r#"{{
            "document": {{
                "type": "memory",
                "host": "local",
                "database": "app",
                "credentials": {{ "username": "app", "password": "secret" }},
                "collections": {{
                    "users": {{
                        "name": "app_users",
                        "indexes": [{{ "columns": ["email"], "unique": true }}]
                    }},
                    "sessions": {{ "enableTtl": true, "ttl": 60, "ttlAttribute": "createdAt" }}
                }}
            }},
            "kv": {{
                "type": "fjall",
                "host": "{}",
                "database": "app",
                "options": {{ "preset": "lowMemory", "compression": "none" }},
                "collections": {{
                    "codes": {{ "customId": true }},
                    "users": {{ "indexes": [{{ "columns": ["email"], "unique": true }}] }}
                }}
            }}
        }}"#,
        path.replace('\\', "\\\\")
    )
}

#[test]
fn test_manager_from_json_file() {
    let path = random_path();
    let config_file = format!("{}.json", path);
    fs::write(&config_file, manager_json(&path)).unwrap();

    let config = ManagerConfig::from_file(&config_file).unwrap();
    let document = config.get("document").unwrap();
    assert_eq!(document.credentials.username, "app");
    assert_eq!(document.collections["users"].indexes[0].columns, vec!["email"]);
    assert!(document.collections["sessions"].enable_ttl);
    assert!(config.get(KEY_VALUE).unwrap().collections["codes"].custom_id);

    let round_trip = ManagerConfig::from_json_str(&config.to_json_string().unwrap()).unwrap();
    assert_eq!(round_trip, config);

    let manager = BackendManager::new(config);
    repobridge_fjall_adapter::register(&manager);

    for backend in ["document", KEY_VALUE] {
        let users = manager.repository(backend, "users").unwrap();
        users.save(doc! { email: "ada@example.com" }, None).unwrap();
        let err = users.save(doc! { email: "ada@example.com" }, None).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::AlreadyExists, "{}", backend);
    }
    assert_eq!(manager.repository("document", "users").unwrap().name(), "app_users");

    let codes = manager.repository(KEY_VALUE, "codes").unwrap();
    codes.save(doc! { id: "X1", label: "first" }, None).unwrap();
    let found = codes.get_all(&Filter::new().by_id("X1"), &FindOptions::new()).unwrap();
    assert_eq!(found.len(), 1);

    manager.shutdown().unwrap();
    let err = codes.get_one(&Filter::new()).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::BackendError);

    let _ = fs::remove_file(&config_file);
    let _ = fs::remove_dir_all(&path);
}

#[test]
fn test_unknown_backends() {
    let config = ManagerConfig::from_json_str(r#"{ "main": { "type": "cassandra", "database": "app" } }"#).unwrap();
    let manager = BackendManager::new(config);

    let err = manager.get_backend("main").err().map(|e| *e.kind());
    assert_eq!(err, Some(ErrorKind::BackendError));
    let err = manager.get_backend("other").err().map(|e| *e.kind());
    assert_eq!(err, Some(ErrorKind::BackendError));
}

#[test]
fn test_kv_backend_requires_a_path() {
    let config = ManagerConfig::from_json_str(r#"{ "kv": { "type": "fjall", "database": "app" } }"#).unwrap();
    let manager = BackendManager::new(config);
    repobridge_fjall_adapter::register(&manager);

    let err = manager.get_backend(KEY_VALUE).err().map(|e| *e.kind());
    assert_eq!(err, Some(ErrorKind::BackendError));
}

#[test]
fn test_malformed_configuration() {
    let err = ManagerConfig::from_json_str(r#"{ "main": { "type": 1 } }"#).err().map(|e| *e.kind());
    assert_eq!(err, Some(ErrorKind::InvalidInput));
}
