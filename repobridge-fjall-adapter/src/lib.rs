//! Key-value backend for repobridge on a fjall keyspace.
//!
//! Each collection is a fjall partition named `database.collection`. Items
//! are whole documents keyed by a 16-byte UUID (or by the record's own `id`
//! in custom-ID repositories). Declared indexes and expiry settings are kept
//! in a catalog partition; unique indexes are enforced on every write and
//! expired items disappear from reads.
//!
//! Register the `fjall` backend type with a manager through [`register`], or
//! open a backend directly with [`FjallModule`].

mod config;
mod module;
mod provision;
mod repository;
mod store;
mod translator;
mod wrapper;

pub use config::*;
pub use module::*;
pub use provision::{IndexMeta, TableMeta, TtlMeta};
pub use repository::{new_uuid_key, KvRepository, KV_IDENTITY, KV_KEY_LEN};
pub use store::{FjallConnection, CATALOG_PARTITION};
pub use translator::{KvCondition, KvOperator, KvQuery, KvTranslator};
pub use wrapper::{KvError, KvResult};
