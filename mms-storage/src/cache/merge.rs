//! Deep merge of JSON values.

use serde_json::Value;

/// Merge `source` into `target` in place.
///
/// Objects are merged key by key, recursively. Any other source value
/// (scalars, arrays, null) replaces the target value at that position.
/// Arrays are replaced wholesale so that a shortened server list does not
/// leave stale trailing items in the cache.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}
