//! Field maps and reserved path screening

use std::collections::BTreeMap;

use serde_json::Value;

/// Map from dotted field path to JSON value. Ordered so serialized
/// submissions and delivery payloads are deterministic.
pub type FieldMap = BTreeMap<String, Value>;

/// Path segments that may never appear in user field paths. Language
/// neutral: even without prototype chains, internal namespaces keyed
/// with `__` must not collide with user data.
pub const RESERVED_SEGMENTS: [&str; 3] = ["constructor", "prototype", "__proto__"];

/// True when a dotted field path is empty, reserved, or reaches into an
/// internal namespace.
pub fn is_reserved_path(path: &str) -> bool {
    if path.is_empty() {
        return true;
    }
    path.split('.')
        .any(|segment| segment.is_empty() || RESERVED_SEGMENTS.contains(&segment) || segment.starts_with("__"))
}

/// All reserved paths in a candidate map, in map order.
pub fn reserved_paths(fields: &FieldMap) -> Vec<String> {
    fields
        .keys()
        .filter(|path| is_reserved_path(path))
        .cloned()
        .collect()
}
