use serde_json::{json, Map, Value};

use super::StoreError;

/// Key of the sentinel object the store replaces with its own clock
const SERVER_VALUE_KEY: &str = ".sv";
const SERVER_VALUE_TIMESTAMP: &str = "timestamp";

/// Characters that may not appear in a path segment
const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']'];

/// Placeholder for "the store's current time in milliseconds"
pub fn server_timestamp() -> Value {
    json!({ SERVER_VALUE_KEY: SERVER_VALUE_TIMESTAMP })
}

fn is_server_timestamp(value: &Value) -> bool {
    match value.as_object() {
        Some(map) => {
            map.len() == 1
                && map.get(SERVER_VALUE_KEY).and_then(Value::as_str) == Some(SERVER_VALUE_TIMESTAMP)
        }
        None => false,
    }
}

/// Replace every server timestamp sentinel in `value` with `now_ms`
pub fn resolve_server_values(value: Value, now_ms: i64) -> Value {
    if is_server_timestamp(&value) {
        return Value::from(now_ms);
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, resolve_server_values(v, now_ms)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| resolve_server_values(v, now_ms))
                .collect(),
        ),
        other => other,
    }
}

/// Split a `/`-separated path into segments
///
/// Leading and trailing slashes are ignored, so `""` and `"/"` are the root.
pub fn parse_path(path: &str) -> Result<Vec<String>, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split('/')
        .map(|segment| {
            if segment.is_empty() {
                Err(StoreError::InvalidPath(
                    path.to_string(),
                    "empty segment".to_string(),
                ))
            } else if segment.contains(FORBIDDEN) {
                Err(StoreError::InvalidPath(
                    path.to_string(),
                    format!("segment '{}' contains one of . # $ [ ]", segment),
                ))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

/// Whether a write at one path can change the value seen at the other
pub fn is_related(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// A JSON document addressed by paths, with realtime-database semantics:
/// writing null deletes, empty objects do not exist, and intermediate
/// objects are created on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonTree {
    root: Value,
}

impl JsonTree {
    pub fn new(root: Value) -> Self {
        let mut tree = Self::default();
        tree.set(&[], root);
        tree
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn get(&self, path: &[String]) -> Option<&Value> {
        let mut node = &self.root;
        for segment in path {
            node = node.as_object()?.get(segment)?;
        }
        if is_empty(node) {
            None
        } else {
            Some(node)
        }
    }

    pub fn set(&mut self, path: &[String], value: Value) {
        set_at(&mut self.root, path, prune(value));
        if is_empty(&self.root) {
            self.root = Value::Null;
        }
    }
}

fn set_at(node: &mut Value, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *node = prune(value);
        return;
    };

    if is_empty(&value) {
        if let Value::Object(map) = node {
            if let Some(child) = map.get_mut(head) {
                set_at(child, rest, Value::Null);
                if is_empty(child) {
                    map.remove(head);
                }
            }
        }
        return;
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        set_at(child, rest, value);
    }
}

/// Drop nulls and empty objects nested inside a written value
fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}
