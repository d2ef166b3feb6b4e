//! Dotted-path operations on configuration trees

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::error::{ConfigError, Result};

/// A fully parsed configuration tree. The root is always a mapping.
pub type ConfigSnapshot = Value;

/// Split `a.b.c` into its segments, rejecting empty keys and empty segments
pub fn split_key(key: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = key.split('.').collect();
    if key.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::InvalidKey(key.to_string()));
    }
    Ok(segments)
}

/// Walk `key` through the tree.
///
/// Returns `None` on the first missing segment or when a non-mapping value
/// sits in the middle of the path.
pub fn lookup<'a>(tree: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = tree;
    for segment in key.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Assign `value` at `key`, creating intermediate mappings as needed.
///
/// Any intermediate value that is not a mapping is replaced by an empty one.
pub fn assign(tree: &mut Value, key: &str, value: Value) -> Result<()> {
    let segments = split_key(key)?;
    let (leaf, parents) = segments
        .split_last()
        .ok_or_else(|| ConfigError::InvalidKey(key.to_string()))?;

    let mut current = tree;
    for segment in parents {
        current = ensure_mapping(current)
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_mapping(current).insert(leaf.to_string(), value);
    Ok(())
}

fn ensure_mapping(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by a mapping"),
    }
}

/// Dotted paths of every leaf that differs between two trees, sorted.
///
/// A mapping replaced by a scalar (or the reverse) reports the path itself.
pub fn changed_keys(old: &Value, new: &Value) -> Vec<String> {
    let mut out = BTreeSet::new();
    diff_into(old, new, "", &mut out);
    out.into_iter().collect()
}

fn diff_into(old: &Value, new: &Value, prefix: &str, out: &mut BTreeSet<String>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (k, va) in a {
                let path = join(prefix, k);
                match b.get(k) {
                    Some(vb) => diff_into(va, vb, &path, out),
                    None => collect_leaves(va, &path, out),
                }
            }
            for (k, vb) in b {
                if !a.contains_key(k) {
                    collect_leaves(vb, &join(prefix, k), out);
                }
            }
        }
        (a, b) if a != b => {
            out.insert(prefix.to_string());
        }
        _ => {}
    }
}

fn collect_leaves(value: &Value, prefix: &str, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                collect_leaves(v, &join(prefix, k), out);
            }
        }
        _ => {
            out.insert(prefix.to_string());
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}
