use crate::errors::RepoResult;
use crate::filter::{Criterion, Filter, QueryTranslator};
use crate::store::document::codec::value_to_bson;
use bson::{doc, Bson};

/// Translates filters into BSON query documents.
///
/// - a pattern becomes `{"$regex": ...}`;
/// - a comma separated string or a list of several values becomes `{"$in": [...]}`;
/// - anything else is an exact match.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoTranslator;

impl QueryTranslator for MongoTranslator {
    type Query = bson::Document;

    fn translate(&self, filter: &Filter) -> RepoResult<bson::Document> {
        let mut query = bson::Document::new();
        for (field, criterion) in filter.criteria()? {
            let condition = match criterion {
                Criterion::Exact(value) => value_to_bson(&value),
                Criterion::AnyOf(values) => {
                    let values: Vec<Bson> = values.iter().map(value_to_bson).collect();
                    Bson::Document(doc! { "$in": values })
                }
                Criterion::Pattern(pattern) => Bson::Document(doc! { "$regex": pattern.to_regex_source() }),
            };
            query.insert(field, condition);
        }
        Ok(query)
    }
}
