#![allow(clippy::new_without_default)]
//! # repobridge - one repository contract over NoSQL stores
//!
//! repobridge lets application code read and write records through named
//! repositories without binding to a storage driver. The same five operations
//! (`get_one`, `get_all`, `save`, `delete_one`, `delete_all`) work on a
//! document store (BSON documents keyed by 12-byte object ids, in process or
//! on MongoDB) and on a key-value store (see the `repobridge_fjall_adapter`
//! crate).
//!
//! ## Key Features
//!
//! - **Uniform identity**: records are addressed by a public `id`, the
//!   lowercase hex form of the backend key, whatever the backend stores
//! - **Portable filters**: exact matches, comma separated alternatives and
//!   `%` wildcard patterns, translated to each backend's native query
//! - **Typed records**: `#[derive(Record)]` maps structs to canonical documents
//! - **Declarative provisioning**: unique, compound and TTL indexes created
//!   idempotently from a repository definition or JSON configuration
//! - **Uniform errors**: every failure is one of a handful of [`errors::ErrorKind`]s
//!
//! ## Quick Start
//!
//! ```rust
//! use repobridge::backend::{BackendManager, ManagerConfig};
//! use repobridge::doc;
//! use repobridge::filter::Filter;
//! use repobridge::repository::FindOptions;
//!
//! let config = ManagerConfig::from_json_str(r#"{
//!     "main": {
//!         "type": "memory",
//!         "database": "app",
//!         "collections": {
//!             "users": { "indexes": [{ "columns": ["email"], "unique": true }] }
//!         }
//!     }
//! }"#).unwrap();
//!
//! let manager = BackendManager::new(config);
//! let users = manager.repository("main", "users").unwrap();
//!
//! let ada = users.save(doc! { name: "Ada", email: "ada@example.com" }, None).unwrap();
//! let id = ada.get_str("id").unwrap();
//!
//! let found = users.get_all(&Filter::new().pattern("name", "A%"), &FindOptions::new()).unwrap();
//! assert_eq!(found[0].get_str("id"), Some(id));
//!
//! manager.shutdown().unwrap();
//! ```
//!
//! ## Module Organization
//!
//! - [`backend`] - Backends, their configuration and the backend manager
//! - [`common`] - Canonical values, documents and the record traits
//! - [`errors`] - Error types and result definitions
//! - [`filter`] - Filters, wildcard patterns and the query translator trait
//! - [`identity`] - Public identity normalization
//! - [`mapper`] - Object mapper between records and documents
//! - [`repository`] - The repository contract and its options
//! - [`store`] - Document-store engines

pub mod backend;
pub mod common;
pub mod errors;
pub mod filter;
pub mod identity;
pub mod mapper;
pub mod repository;
pub mod store;
