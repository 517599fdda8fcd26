//! Permission normalization.
//!
//! Endpoints disagree on how permissions are shaped: a list of names, a list
//! of `{id, name}` objects, or a single bare name. Everything is funnelled
//! through [`normalize_permissions`] so call sites only ever see
//! [`Permission`] values.

use serde_json::{Map, Value};

use crate::models::identity::Permission;

/// Coerce a raw permission claim into `(id, name)` pairs.
///
/// Absent or falsy input yields an empty list. Shapes that match none of
/// the known forms are coerced element by element.
pub fn normalize_permissions(raw: &Value) -> Vec<Permission> {
    if is_falsy(raw) {
        return Vec::new();
    }
    match raw {
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .map(Permission::named)
            .collect(),
        Value::String(name) => vec![Permission::named(name.as_str())],
        Value::Array(items) if items.iter().all(Value::is_object) => items
            .iter()
            .filter_map(Value::as_object)
            .map(from_object)
            .collect(),
        Value::Array(items) => items.iter().map(coerce).collect(),
        other => vec![coerce(other)],
    }
}

fn from_object(obj: &Map<String, Value>) -> Permission {
    let fallback = || stringify(&Value::Object(obj.clone()));
    let name = field(obj, "name");
    let id = field(obj, "id")
        .or_else(|| name.clone())
        .unwrap_or_else(fallback);
    Permission {
        id,
        name: name.unwrap_or_else(fallback),
    }
}

fn coerce(value: &Value) -> Permission {
    match value {
        Value::String(name) => Permission::named(name.as_str()),
        Value::Object(obj) => {
            let name = field(obj, "name");
            Permission {
                id: field(obj, "id")
                    .or_else(|| name.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
                name: name.unwrap_or_else(|| stringify(value)),
            }
        }
        other => Permission::new("unknown", stringify(other)),
    }
}

fn field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).filter(|v| !v.is_null()).map(stringify)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(_) | Value::Object(_) => false,
    }
}
