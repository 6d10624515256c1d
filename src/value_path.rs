//! Dotted-path navigation over form values.
//!
//! Field keys address nested values with dots: `"address.city"`,
//! `"items.0.endDate"`. A `$` segment is a placeholder for "every index of
//! the enclosing array" and only appears in derivation entry keys, never in
//! concrete override keys.

use serde_json::Value;

use crate::types::ARRAY_PLACEHOLDER;

/// Look up a dotted path in a value. Numeric segments index into arrays.
/// Returns `None` if any segment is missing or of the wrong shape.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Split an array-placeholder key (`"items.$.endDate"`) into the array path
/// and the per-item remainder. Returns `None` for keys without a placeholder.
pub fn split_placeholder(key: &str) -> Option<(&str, &str)> {
    let marker = format!(".{ARRAY_PLACEHOLDER}.");
    let pos = key.find(&marker)?;
    Some((&key[..pos], &key[pos + marker.len()..]))
}

/// Replace the `$` segment with a concrete index:
/// `"items.$.endDate"` + 1 → `"items.1.endDate"`.
pub fn with_index(array_path: &str, index: usize, item_path: &str) -> String {
    format!("{array_path}.{index}.{item_path}")
}

/// Whether a key carries the array placeholder segment.
pub fn has_placeholder(key: &str) -> bool {
    key.split('.').any(|segment| segment == ARRAY_PLACEHOLDER)
}

/// The first segment of a dotted path (the top-level field key).
pub fn root_segment(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

// =============================================================================
// Tests
// =============================================================================
