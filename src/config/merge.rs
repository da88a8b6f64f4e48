//! Layer merging for decoded configuration files.
//!
//! Each file is decoded into a value tree and laid over the tree built so far,
//! which reproduces "decode into an already-populated record" semantics: keys the
//! file names are overwritten, keys it omits keep their earlier value.

use serde_json::Value;

/// Lay `overlay` over `base`, with `overlay` taking precedence.
///
/// - Objects are merged recursively, key by key
/// - Sequences and scalars are replaced entirely
/// - A `null` overlay leaves the base untouched
///
/// # Example
/// ```
/// use serde_json::json;
/// use configor::config::deep_merge;
///
/// let base = json!({
///     "db": { "name": "app", "port": 3306 },
///     "hosts": ["a", "b"]
/// });
/// let overlay = json!({
///     "db": { "port": 5432 },
///     "hosts": ["c"]
/// });
/// let merged = deep_merge(base, overlay);
/// assert_eq!(merged, json!({
///     "db": { "name": "app", "port": 5432 },
///     "hosts": ["c"]
/// }));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge `overlay` into `target` in place.
pub fn merge_into(target: &mut Value, overlay: Value) {
    let base = std::mem::take(target);
    *target = deep_merge(base, overlay);
}
