//! OC-003: Value-tree utilities — structural equality, merging, path lookup.
//!
//! Rendered documents are plain `serde_json::Value` trees. Map key order is
//! never significant; sequence order always is.

use serde_json::{Map, Value};

/// Deep equality over value trees.
///
/// Map keys compare as sets, sequences element-wise, and numbers by value so
/// that `10` parsed from YAML equals `10.0` produced by arithmetic.
pub fn structurally_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| structurally_equal(v, w)))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(v, w)| structurally_equal(v, w))
        }
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(i), Some(j)) = (x.as_i64(), y.as_i64()) {
                return i == j;
            }
            if let (Some(i), Some(j)) = (x.as_u64(), y.as_u64()) {
                return i == j;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(i), Some(j)) => i == j,
                _ => false,
            }
        }
        _ => a == b,
    }
}

/// Recursively merge `patch` into `base`. Maps merge key by key; any other
/// patch value replaces the base value.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(b), Value::Object(p)) => {
            for (k, v) in p {
                match b.get_mut(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        b.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (b, p) => *b = p.clone(),
    }
}

/// Replace each top-level key of `patch` in `base` wholesale.
pub fn replace_keys(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(b), Value::Object(p)) => {
            for (k, v) in p {
                b.insert(k.clone(), v.clone());
            }
        }
        (b, p) => *b = p.clone(),
    }
}

/// RFC 7386 JSON merge patch: `null` deletes, maps recurse, anything else replaces.
pub fn json_merge_patch(base: &mut Value, patch: &Value) {
    let Value::Object(p) = patch else {
        *base = patch.clone();
        return;
    };
    if !base.is_object() {
        *base = Value::Object(Map::new());
    }
    if let Value::Object(b) = base {
        for (k, v) in p {
            if v.is_null() {
                b.remove(k);
            } else {
                json_merge_patch(b.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

/// Look up a dotted path. Numeric segments index sequences.
pub fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Get (creating empty maps as needed) the map at `path`. Non-map values on
/// the way are replaced.
pub fn object_at<'a>(root: &'a mut Value, path: &[&str]) -> &'a mut Map<String, Value> {
    let mut current = root;
    for segment in path {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => unreachable!("coerced to object above"),
        };
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => map,
        _ => unreachable!("coerced to object above"),
    }
}

/// Read a string field at `path`, treating missing and empty alike.
pub fn non_empty_str<'a>(root: &'a Value, path: &[&str]) -> Option<&'a str> {
    lookup(root, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
