//! Document-store backends.
//!
//! Records are BSON documents keyed by 12-byte object ids. The repository
//! talks to a pluggable [`DocumentStore`] driver: [`MemoryStore`] runs in
//! process, `MongoStore` (feature `mongodb`) talks to a MongoDB deployment.

mod backend;
pub mod codec;
mod driver;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod provision;
mod repository;
mod translator;

pub use backend::{build_document_repository, MEMORY_BACKEND, MONGODB_BACKEND};
pub(crate) use backend::register_builtin_backends;
pub use driver::*;
pub use memory::{MemorySession, MemoryStore};
#[cfg(feature = "mongodb")]
pub use mongo::{MongoSession, MongoStore};
pub use repository::*;
pub use translator::*;
