//! JSON document helpers shared by the change tracker and the SQL layer.

use repokit_domain::{entity_name, DomainError, Entity};
use serde_json::{Map, Value};

use super::ResultExt;

/// Serialize an entity into its stored document; the result is always an object.
pub(crate) fn to_document<T: Entity>(entity: &T) -> Result<Value, DomainError> {
    let value = serde_json::to_value(entity)
        .map_repo_error(&format!("Serialize {}", entity_name::<T>()))?;
    if !value.is_object() {
        return Err(DomainError::Serialization(format!(
            "{} must serialize to a JSON object",
            entity_name::<T>()
        )));
    }
    Ok(value)
}

pub(crate) fn from_document<T: Entity>(value: Value) -> Result<T, DomainError> {
    serde_json::from_value(value).map_repo_error(&format!("Deserialize {}", entity_name::<T>()))
}

pub(crate) fn parse_document<T: Entity>(body: &str) -> Result<T, DomainError> {
    serde_json::from_str(body).map_repo_error(&format!("Decode {}", entity_name::<T>()))
}

/// Value at a dotted field path
pub(crate) fn field<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| current.get(segment))
}

/// Write `value` at a dotted field path, creating intermediate objects.
pub(crate) fn set_field(doc: &mut Value, path: &str, value: Value) {
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    let Value::Object(map) = doc else {
        return;
    };
    match path.split_once('.') {
        Some((head, rest)) => {
            set_field(map.entry(head.to_string()).or_insert(Value::Null), rest, value)
        }
        None => {
            map.insert(path.to_string(), value);
        }
    }
}

/// A missing, null or integer-zero key is assigned by the store.
pub(crate) fn is_generated_key(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Number(n)) => n.as_i64() == Some(0) || n.as_u64() == Some(0),
        Some(_) => false,
    }
}

/// Canonical key text of a document, or `None` when the store generates it.
pub(crate) fn key_of(doc: &Value, key_field: &str) -> Option<String> {
    let value = field(doc, key_field);
    if is_generated_key(value) {
        return None;
    }
    value.map(Value::to_string)
}

/// Explicit positive integer keys double as the row sequence.
pub(crate) fn integer_key(doc: &Value, key_field: &str) -> Option<i64> {
    field(doc, key_field)
        .and_then(Value::as_i64)
        .filter(|key| *key > 0)
}
