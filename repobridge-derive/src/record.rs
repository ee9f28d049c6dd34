use proc_macro::TokenStream;
use proc_macro2::Ident;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{DataStruct, DeriveInput, Expr, Field, Lit, LitStr, Meta, Result, Token};

/// Field options collected from `#[record(..)]` and `#[serde(..)]`.
#[derive(Default)]
struct FieldTags {
    bson: Option<String>,
    json: Option<String>,
    rename: Option<String>,
    skip: bool,
}

/// Drops everything after the first comma; an empty tag counts as absent.
fn tag_name(tag: &str) -> Option<String> {
    let name = tag.split(',').next().unwrap_or_default().trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn parse_tags(field: &Field) -> Result<FieldTags> {
    let mut tags = FieldTags::default();

    for attr in &field.attrs {
        if attr.path().is_ident("record") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    tags.skip = true;
                    Ok(())
                } else if meta.path.is_ident("bson") {
                    let s: LitStr = meta.value()?.parse()?;
                    tags.bson = tag_name(&s.value());
                    Ok(())
                } else if meta.path.is_ident("json") {
                    let s: LitStr = meta.value()?.parse()?;
                    tags.json = tag_name(&s.value());
                    Ok(())
                } else {
                    Err(meta.error("unsupported record option, expected `bson`, `json` or `skip`"))
                }
            })?;
        } else if attr.path().is_ident("serde") {
            // other serde options belong to serde itself
            let metas = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
            for meta in metas {
                if let Meta::NameValue(name_value) = meta {
                    if name_value.path.is_ident("rename") {
                        if let Expr::Lit(expr) = &name_value.value {
                            if let Lit::Str(s) = &expr.lit {
                                tags.rename = tag_name(&s.value());
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(tags)
}

/// The document key of a field, or `None` when the field is skipped.
fn document_key(field: &Field, ident: &Ident) -> Result<Option<String>> {
    let tags = parse_tags(field)?;
    if tags.skip {
        return Ok(None);
    }

    let key = tags
        .bson
        .or(tags.rename)
        .or(tags.json)
        .unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_lowercase());
    Ok(Some(key))
}

pub(crate) fn generate_record_for_struct(ast: &DeriveInput, data: &DataStruct) -> Result<TokenStream> {
    let fields: Vec<&Field> = match &data.fields {
        syn::Fields::Named(fields) => fields.named.iter().collect(),
        _ => {
            return Err(syn::Error::new_spanned(
                &ast.ident,
                "only structs with named fields are supported",
            ))
        }
    };

    let mut mapped_idents: Vec<&Ident> = Vec::with_capacity(fields.len());
    let mut mapped_keys: Vec<String> = Vec::with_capacity(fields.len());
    let mut initializers: Vec<proc_macro2::TokenStream> = Vec::with_capacity(fields.len());

    for field in &fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let ty = &field.ty;

        match document_key(field, ident)? {
            Some(key) => {
                if mapped_keys.contains(&key) {
                    return Err(syn::Error::new_spanned(
                        ident,
                        format!("document key '{}' is used by more than one field", key),
                    ));
                }
                initializers.push(quote! {
                    #ident: repobridge::common::read_field::<#ty>(document, #key)?
                });
                mapped_idents.push(ident);
                mapped_keys.push(key);
            }
            None => initializers.push(quote! { #ident: Default::default() }),
        }
    }

    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let gen = quote! {
        impl #impl_generics repobridge::common::Record for #name #ty_generics #where_clause {
            fn to_document(&self) -> repobridge::errors::RepoResult<repobridge::common::Document> {
                let mut document = repobridge::common::Document::new();
                #(document.put(#mapped_keys, repobridge::common::FieldValue::to_value(&self.#mapped_idents)?)?;)*
                Ok(document)
            }

            fn from_document(document: &repobridge::common::Document) -> repobridge::errors::RepoResult<Self> {
                Ok(#name {
                    #(#initializers,)*
                })
            }
        }

        impl #impl_generics repobridge::common::FieldValue for #name #ty_generics #where_clause {
            fn to_value(&self) -> repobridge::errors::RepoResult<repobridge::common::Value> {
                let document = repobridge::common::Record::to_document(self)?;
                Ok(repobridge::common::Value::Document(document))
            }

            fn from_value(value: &repobridge::common::Value) -> repobridge::errors::RepoResult<Self> {
                match value {
                    repobridge::common::Value::Document(document) => {
                        <Self as repobridge::common::Record>::from_document(document)
                    }
                    _ => Err(repobridge::errors::RepoError::invalid_input(&format!(
                        "value of type {} is not a document",
                        value.type_name()
                    ))),
                }
            }
        }
    };

    Ok(TokenStream::from(gen))
}
