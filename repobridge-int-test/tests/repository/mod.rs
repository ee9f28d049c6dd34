mod crud_test;
mod identity_test;
mod provisioning_test;
mod query_test;
mod typed_repository_test;

use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use repobridge::common::Document;
use repobridge::doc;
use repobridge::repository::{Index, RepositoryDefinition};
use repobridge_derive::Record;

#[derive(Debug, Record, Default, Clone, PartialEq)]
pub struct Employee {
    pub id: String,
    #[record(bson = "fullName")]
    pub name: String,
    #[serde(rename = "emailAddress")]
    pub email: String,
    pub age: i32,
    #[record(json = "skills,omitempty")]
    pub tags: Vec<String>,
    pub address: Option<Address>,
    #[record(skip)]
    pub session_token: Option<String>,
}

#[derive(Debug, Record, Default, Clone, PartialEq)]
pub struct Address {
    pub city: String,
    pub zip: String,
}

/// Employees, unique by email address.
pub fn employee_definition(name: &str) -> RepositoryDefinition {
    RepositoryDefinition::new(name).with_index(Index::new(["emailAddress"], true).unwrap())
}

pub fn generate_employee(age: i32) -> Employee {
    let first: String = FirstName().fake();
    let last: String = LastName().fake();
    let email: String = SafeEmail().fake();

    Employee {
        id: String::new(),
        name: format!("{} {}", first, last),
        // prefixed so that generated addresses never collide
        email: format!("{}.{}", uuid::Uuid::new_v4().simple(), email),
        age,
        tags: vec!["rust".to_string()],
        address: Some(Address {
            city: "Oslo".to_string(),
            zip: "0150".to_string(),
        }),
        session_token: None,
    }
}

pub fn employee_document(name: &str, age: i32) -> Document {
    doc! {
        fullName: name,
        emailAddress: (format!("{}@example.com", name.to_lowercase())),
        age: age,
    }
}

/// Whether `id` is a lowercase hex string of `len` bytes.
pub fn is_hex_id(id: &str, len: usize) -> bool {
    id.len() == len * 2 && id.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
