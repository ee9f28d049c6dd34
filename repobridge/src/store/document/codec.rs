use crate::common::{Document, RecordKey, Value};
use crate::errors::{RepoError, RepoResult};
use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson};

/// Length of an object identifier.
pub const OBJECT_ID_LEN: usize = 12;

pub fn new_object_id_key() -> RecordKey {
    RecordKey::from_bytes(ObjectId::new().bytes().to_vec())
}

pub fn key_to_bson(key: &RecordKey) -> Bson {
    match <[u8; OBJECT_ID_LEN]>::try_from(key.as_bytes()) {
        Ok(bytes) => Bson::ObjectId(ObjectId::from_bytes(bytes)),
        Err(_) => Bson::Binary(Binary {
            subtype: BinarySubtype::UserDefined(0x80),
            bytes: key.as_bytes().to_vec(),
        }),
    }
}

pub fn value_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::I32(i) => Bson::Int32(*i),
        Value::I64(i) => Bson::Int64(*i),
        Value::F64(f) => Bson::Double(*f),
        Value::String(s) => Bson::String(s.clone()),
        Value::DateTime(dt) => Bson::DateTime(bson::DateTime::from_chrono(*dt)),
        Value::Bytes(bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.clone(),
        }),
        Value::Key(key) => key_to_bson(key),
        Value::Array(items) => Bson::Array(items.iter().map(value_to_bson).collect()),
        Value::Document(doc) => Bson::Document(document_to_bson(doc)),
    }
}

pub fn document_to_bson(document: &Document) -> bson::Document {
    let mut result = bson::Document::new();
    for (key, value) in document.iter() {
        result.insert(key.clone(), value_to_bson(value));
    }
    result
}

pub fn bson_to_value(bson: &Bson) -> RepoResult<Value> {
    Ok(match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::I32(*i),
        Bson::Int64(i) => Value::I64(*i),
        Bson::Double(f) => Value::F64(*f),
        Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => Value::String(s.clone()),
        Bson::DateTime(dt) => Value::DateTime(dt.to_chrono()),
        Bson::ObjectId(oid) => Value::Key(RecordKey::from_bytes(oid.bytes().to_vec())),
        Bson::Binary(binary) => match binary.subtype {
            BinarySubtype::UserDefined(0x80) => Value::Key(RecordKey::from_bytes(binary.bytes.clone())),
            _ => Value::Bytes(binary.bytes.clone()),
        },
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_value).collect::<RepoResult<Vec<_>>>()?),
        Bson::Document(doc) => Value::Document(bson_to_document(doc)?),
        Bson::Timestamp(ts) => Value::I64(((ts.time as i64) << 32) | ts.increment as i64),
        Bson::Decimal128(d) => Value::String(format!("{:?}", d)),
        Bson::RegularExpression(regex) => Value::String(regex.pattern.clone()),
        other => {
            log::error!("Unsupported bson value {:?}", other);
            return Err(RepoError::internal(&format!(
                "unsupported bson type {:?}",
                other.element_type()
            )));
        }
    })
}

pub fn bson_to_document(document: &bson::Document) -> RepoResult<Document> {
    let mut result = Document::new();
    for (key, value) in document.iter() {
        result.insert(key.clone(), bson_to_value(value)?);
    }
    Ok(result)
}
