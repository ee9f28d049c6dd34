#![recursion_limit = "128"]
//! # repobridge derive macros
//!
//! ## `Record`
//!
//! Derives `repobridge::common::Record` (and `FieldValue`, so records can be
//! nested) for structs with named fields, mapping each field to one key of
//! the canonical document.
//!
//! The document key of a field is, by priority:
//!
//! 1. `#[record(bson = "..")]`
//! 2. `#[serde(rename = "..")]` or `#[record(json = "..")]`
//! 3. the field name, lowercased
//!
//! Anything after the first `,` in a tag is dropped, so `"email,omitempty"`
//! names the key `email`. `#[record(skip)]` leaves a field out of the
//! document; it is restored with `Default::default()`.
//!
//! Every mapped field type must implement `FieldValue + Default`: missing or
//! null fields read back as the default.
//!
//! # Examples
//!
//! ```rust,ignore
//! use repobridge_derive::Record;
//!
//! #[derive(Record, Default)]
//! pub struct User {
//!     #[record(bson = "_id")]
//!     pub id: String,
//!     #[serde(rename = "userName")]
//!     pub name: String,
//!     pub email: String,
//!     #[record(skip)]
//!     pub session: Option<String>,
//! }
//! ```

extern crate proc_macro;
mod record;

use crate::record::generate_record_for_struct;
use proc_macro::TokenStream;
use syn::{Data, DeriveInput};

/// Derives `Record` and `FieldValue` for a struct with named fields.
///
/// # Attributes
///
/// - `#[record(bson = "key")]` - document key, highest priority
/// - `#[record(json = "key")]` / `#[serde(rename = "key")]` - document key
/// - `#[record(skip)]` - field is not persisted
///
/// # Errors
///
/// Returns a compile error for enums, unions, tuple structs and unit structs,
/// and for unknown `record` options.
#[proc_macro_derive(Record, attributes(record, serde))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as DeriveInput);

    match ast.data {
        Data::Struct(ref data) => match generate_record_for_struct(&ast, data) {
            Ok(token_stream) => token_stream,
            Err(e) => {
                let error = syn::Error::new(
                    e.span(),
                    format!(
                        "Failed to derive Record for struct '{}': {}.\n\
                         Make sure all fields implement FieldValue and Default.",
                        ast.ident, e
                    ),
                );
                error.to_compile_error().into()
            }
        },
        Data::Enum(_) => {
            let error = syn::Error::new_spanned(
                &ast,
                "Cannot derive Record for enums. Only structs with named fields are supported.",
            );
            error.to_compile_error().into()
        }
        Data::Union(_) => {
            let error = syn::Error::new_spanned(
                &ast,
                "Cannot derive Record for unions. Only structs with named fields are supported.",
            );
            error.to_compile_error().into()
        }
    }
}
