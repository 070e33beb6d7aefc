//! Helpers for reading and writing nested attribute paths inside a record's
//! fields. Paths come from association declarations, one segment per
//! nesting level.

use crate::storage::Fields;
use serde_json::Value;

/// Value at `path`, or `None` when any segment is missing or not an object.
pub(crate) fn get_path<'a>(fields: &'a Fields, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = fields.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects as needed.
pub(crate) fn set_path(fields: &mut Fields, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = fields;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(serde_json::Map::new());
        }
        current = entry.as_object_mut().expect("just ensured object");
    }
    current.insert(last.clone(), value);
}
