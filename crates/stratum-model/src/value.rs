//! JSON value operations for the merge and bind stages.
//!
//! Merge semantics:
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Structural conflict hit while merging or setting a field path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot merge {patch_type} into {base_type} at '{path}'")]
pub struct PathConflict {
    /// Dotted field path of the conflicting value.
    pub path: String,
    /// JSON type already present at the path.
    pub base_type: &'static str,
    /// JSON type the incoming value has.
    pub patch_type: &'static str,
}

/// JSON type name of a value, for diagnostics.
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Deep merge a patch onto a base value.
///
/// - Objects: deep-merge by key (recursive)
/// - Arrays: REPLACE (patch wins entirely)
/// - Scalars: override (patch wins)
/// - Null: a null base accepts any patch value; a null patch overrides
///
/// Merging an object into a non-object (or the reverse) is a
/// [`PathConflict`] naming the offending field path, never a silent
/// replace.
pub fn merge_strict(base: Value, patch: Value, path: &str) -> Result<Value, PathConflict> {
    match (base, patch) {
        (Value::Null, patch) => Ok(patch),
        (_, Value::Null) => Ok(Value::Null),

        (Value::Object(mut base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                let child_path = join_path(path, &key);
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge_strict(base_value, patch_value, &child_path)?,
                    None => patch_value,
                };
                base_map.insert(key, merged);
            }
            Ok(Value::Object(base_map))
        }

        (base @ Value::Object(_), patch) => Err(PathConflict {
            path: path.to_string(),
            base_type: json_type(&base),
            patch_type: json_type(&patch),
        }),
        (base, patch @ Value::Object(_)) => Err(PathConflict {
            path: path.to_string(),
            base_type: json_type(&base),
            patch_type: json_type(&patch),
        }),

        (_, patch) => Ok(patch),
    }
}

/// Get a value by dot-separated field path.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Set a value at a dot-separated field path, creating intermediate
/// objects as needed. Fails if the path descends through a non-object
/// value already present.
pub fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), PathConflict> {
    set_path_inner(root, path, path, value)
}

fn set_path_inner(
    node: &mut Value,
    full: &str,
    rest: &str,
    value: Value,
) -> Result<(), PathConflict> {
    if node.is_null() {
        *node = Value::Object(serde_json::Map::new());
    }
    let map = match node {
        Value::Object(map) => map,
        other => {
            // The segments consumed so far name the value in the way.
            let consumed = full.len() - rest.len();
            let parent = full[..consumed].trim_end_matches('.');
            return Err(PathConflict {
                path: parent.to_string(),
                base_type: json_type(other),
                patch_type: "object",
            });
        }
    };
    match rest.split_once('.') {
        None => {
            map.insert(rest.to_string(), value);
            Ok(())
        }
        Some((head, tail)) => {
            let child = map.entry(head.to_string()).or_insert(Value::Null);
            set_path_inner(child, full, tail, value)
        }
    }
}

/// Dotted paths of every leaf in `value` (non-object values; empty
/// objects count as leaves), paired with clones of the leaf values.
pub fn leaf_paths(value: &Value) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    collect_leaves(value, String::new(), &mut out);
    out
}

fn collect_leaves(value: &Value, path: String, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                collect_leaves(child, join_path(&path, key), out);
            }
        }
        other => {
            if !path.is_empty() {
                out.push((path, other.clone()));
            }
        }
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}
