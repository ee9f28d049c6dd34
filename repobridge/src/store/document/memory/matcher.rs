use crate::store::document::driver::{DriverError, DriverResult};
use bson::Bson;
use regex::Regex;
use std::cmp::Ordering;

/// Resolves a dotted field path inside a document.
pub(crate) fn lookup<'a>(document: &'a bson::Document, path: &str) -> Option<&'a Bson> {
    if let Some(value) = document.get(path) {
        return Some(value);
    }

    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(doc) => doc.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(i) => Some(*i as i64),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

/// Value equality, with numbers compared across widths.
pub(crate) fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (as_i64(a), as_i64(b)) {
        (Some(x), Some(y)) => return x == y,
        _ => {}
    }
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => return x == y,
        (Some(_), None) | (None, Some(_)) => return false,
        _ => {}
    }

    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(p, q)| bson_eq(p, q)),
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|((k1, v1), (k2, v2))| k1 == k2 && bson_eq(v1, v2))
        }
        _ => a == b,
    }
}

/// Equality as a query sees it: a missing field equals null, and an array
/// field matches when it equals the value or contains it.
fn field_equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) => {
            bson_eq(&Bson::Array(items.clone()), expected) || items.iter().any(|item| bson_eq(item, expected))
        }
        Some(actual) => bson_eq(actual, expected),
    }
}

fn is_operator_document(document: &bson::Document) -> bool {
    !document.is_empty() && document.keys().all(|key| key.starts_with('$'))
}

fn compile_regex(condition: &Bson) -> DriverResult<Regex> {
    let (pattern, options) = match condition {
        Bson::String(pattern) => (pattern.as_str(), ""),
        Bson::RegularExpression(regex) => (regex.pattern.as_str(), regex.options.as_str()),
        other => return Err(DriverError::BadQuery(format!("$regex has to be a string, found {:?}", other))),
    };

    let pattern = if options.contains('i') {
        format!("(?i){}", pattern)
    } else {
        pattern.to_string()
    };
    Regex::new(&pattern).map_err(|err| DriverError::BadQuery(format!("invalid $regex: {}", err)))
}

fn regex_matches(value: Option<&Bson>, regex: &Regex) -> bool {
    match value {
        Some(Bson::String(s)) => regex.is_match(s),
        Some(Bson::Array(items)) => items.iter().any(|item| matches!(item, Bson::String(s) if regex.is_match(s))),
        _ => false,
    }
}

fn matches_condition(value: Option<&Bson>, condition: &Bson) -> DriverResult<bool> {
    let operators = match condition {
        Bson::Document(doc) if is_operator_document(doc) => doc,
        _ => return Ok(field_equals(value, condition)),
    };

    for (operator, argument) in operators {
        let matched = match operator.as_str() {
            "$eq" => field_equals(value, argument),
            "$ne" => !field_equals(value, argument),
            "$in" => match argument {
                Bson::Array(candidates) => candidates.iter().any(|candidate| field_equals(value, candidate)),
                _ => return Err(DriverError::BadQuery("$in needs an array".to_string())),
            },
            "$regex" => regex_matches(value, &compile_regex(argument)?),
            "$exists" => {
                let wanted = !matches!(argument, Bson::Boolean(false) | Bson::Int32(0) | Bson::Int64(0));
                value.is_some() == wanted
            }
            other => return Err(DriverError::BadQuery(format!("unknown operator: {}", other))),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Tests a stored document against a query document.
pub(crate) fn matches(document: &bson::Document, filter: &bson::Document) -> DriverResult<bool> {
    for (field, condition) in filter {
        if !matches_condition(lookup(document, field), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => 1,
        Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) | Some(Bson::Decimal128(_)) => 2,
        Some(Bson::String(_)) | Some(Bson::Symbol(_)) => 3,
        Some(Bson::Document(_)) => 4,
        Some(Bson::Array(_)) => 5,
        Some(Bson::Binary(_)) => 6,
        Some(Bson::ObjectId(_)) => 7,
        Some(Bson::Boolean(_)) => 8,
        Some(Bson::DateTime(_)) => 9,
        Some(Bson::Timestamp(_)) => 10,
        Some(Bson::RegularExpression(_)) => 11,
        Some(_) => 12,
    }
}

/// Sort order of two field values, missing fields sorting with nulls.
pub(crate) fn compare(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Some(x), Some(y)) => match (as_i64(x), as_i64(y)) {
            (Some(p), Some(q)) => p.cmp(&q),
            _ => match (as_f64(x), as_f64(y)) {
                (Some(p), Some(q)) => p.partial_cmp(&q).unwrap_or(Ordering::Equal),
                _ => match (x, y) {
                    (Bson::String(p), Bson::String(q)) => p.cmp(q),
                    (Bson::ObjectId(p), Bson::ObjectId(q)) => p.bytes().cmp(&q.bytes()),
                    (Bson::Boolean(p), Bson::Boolean(q)) => p.cmp(q),
                    (Bson::DateTime(p), Bson::DateTime(q)) => p.cmp(q),
                    (Bson::Binary(p), Bson::Binary(q)) => p.bytes.cmp(&q.bytes),
                    (Bson::Array(p), Bson::Array(q)) => {
                        for (m, n) in p.iter().zip(q) {
                            let ord = compare(Some(m), Some(n));
                            if ord != Ordering::Equal {
                                return ord;
                            }
                        }
                        p.len().cmp(&q.len())
                    }
                    _ => Ordering::Equal,
                },
            },
        },
        _ => Ordering::Equal,
    }
}

fn set_path(document: &mut bson::Document, path: &str, value: Bson) -> DriverResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let entry = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(bson::Document::new()));
            match entry {
                Bson::Document(child) => set_path(child, rest, value),
                _ => Err(DriverError::BadQuery(format!(
                    "cannot create field '{}' in element {{{}: ...}}",
                    rest, head
                ))),
            }
        }
    }
}

fn unset_path(document: &mut bson::Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                unset_path(child, rest);
            }
        }
    }
}

/// Applies a `$set`/`$unset` update document.
pub(crate) fn apply_update(document: &mut bson::Document, update: &bson::Document) -> DriverResult<()> {
    if !is_operator_document(update) {
        return Err(DriverError::BadQuery("update document requires atomic operators".to_string()));
    }

    for (operator, argument) in update {
        let fields = match argument {
            Bson::Document(fields) => fields,
            _ => return Err(DriverError::BadQuery(format!("{} needs a document", operator))),
        };
        match operator.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone())?;
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(document, path);
                }
            }
            other => return Err(DriverError::BadQuery(format!("unknown update operator: {}", other))),
        }
    }
    Ok(())
}
