//! Storage backends bundled with the core crate.

pub mod document;
