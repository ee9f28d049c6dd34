use regex::Regex;
use repobridge::common::{Document, Value};
use repobridge::errors::RepoResult;
use repobridge::filter::{Criterion, Filter, PatternShape, QueryTranslator};

/// Comparison applied to one field of a stored item.
#[derive(Debug, Clone)]
pub enum KvOperator {
    Eq(Value),
    In(Vec<Value>),
    BeginsWith(String),
    EndsWith(String),
    Contains(String),
    Matches(Regex),
}

/// A condition on one (possibly dotted) field.
#[derive(Debug, Clone)]
pub struct KvCondition {
    pub field: String,
    pub operator: KvOperator,
}

impl KvCondition {
    /// Tests an item. A missing field equals null; an array field matches
    /// when the array itself or any of its elements does.
    pub fn matches(&self, item: &Document) -> bool {
        let field = item.get_path(&self.field).unwrap_or(&Value::Null);
        match field {
            Value::Array(elements) => {
                self.matches_value(field) || elements.iter().any(|element| self.matches_value(element))
            }
            _ => self.matches_value(field),
        }
    }

    fn matches_value(&self, value: &Value) -> bool {
        match &self.operator {
            KvOperator::Eq(expected) => value.loose_eq(expected),
            KvOperator::In(expected) => expected.iter().any(|candidate| value.loose_eq(candidate)),
            KvOperator::BeginsWith(prefix) => value.as_str().is_some_and(|s| s.starts_with(prefix.as_str())),
            KvOperator::EndsWith(suffix) => value.as_str().is_some_and(|s| s.ends_with(suffix.as_str())),
            KvOperator::Contains(text) => value.as_str().is_some_and(|s| s.contains(text.as_str())),
            KvOperator::Matches(regex) => value.as_str().is_some_and(|s| regex.is_match(s)),
        }
    }
}

/// Conjunction of conditions; the empty query matches every item.
#[derive(Debug, Clone, Default)]
pub struct KvQuery {
    conditions: Vec<KvCondition>,
}

impl KvQuery {
    pub fn conditions(&self) -> &[KvCondition] {
        &self.conditions
    }

    pub fn matches(&self, item: &Document) -> bool {
        self.conditions.iter().all(|condition| condition.matches(item))
    }

    /// The only identities an item can have to satisfy the query, when a
    /// condition pins `key_field` to one value or a list of values. Lets the
    /// repository use point reads instead of a scan.
    pub fn key_candidates(&self, key_field: &str) -> Option<Vec<&Value>> {
        self.conditions
            .iter()
            .filter(|condition| condition.field == key_field)
            .find_map(|condition| match &condition.operator {
                KvOperator::Eq(value) if !value.is_null() && value.as_array().is_none() => Some(vec![value]),
                KvOperator::In(values) => Some(values.iter().collect()),
                _ => None,
            })
    }
}

/// Translates filters into [`KvQuery`] conditions. Simple wildcard shapes
/// become prefix, suffix or substring tests; only complex patterns compile a
/// regular expression.
#[derive(Debug, Clone, Copy, Default)]
pub struct KvTranslator;

impl QueryTranslator for KvTranslator {
    type Query = KvQuery;

    fn translate(&self, filter: &Filter) -> RepoResult<KvQuery> {
        let mut conditions = Vec::with_capacity(filter.len());
        for (field, criterion) in filter.criteria()? {
            let operator = match criterion {
                Criterion::Exact(value) => KvOperator::Eq(value),
                Criterion::AnyOf(values) => KvOperator::In(values),
                Criterion::Pattern(pattern) => match pattern.shape() {
                    PatternShape::Exact(text) => KvOperator::Eq(Value::String(text)),
                    PatternShape::Prefix(text) => KvOperator::BeginsWith(text),
                    PatternShape::Suffix(text) => KvOperator::EndsWith(text),
                    PatternShape::Contains(text) => KvOperator::Contains(text),
                    PatternShape::Any => KvOperator::BeginsWith(String::new()),
                    PatternShape::Complex => KvOperator::Matches(pattern.compile()?),
                },
            };
            conditions.push(KvCondition { field, operator });
        }
        Ok(KvQuery { conditions })
    }
}
