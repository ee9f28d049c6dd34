//! Canonical data model shared by every backend.

mod document;
mod record;
mod value;

pub use document::*;
pub use record::*;
pub use value::*;
