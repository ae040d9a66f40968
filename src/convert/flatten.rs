use crate::convert::types::FlatRecord;
use serde_json::{Map, Value};

/// Flatten a nested record into dotted-path keys
///
/// Nested objects are inlined recursively (`{"a": {"b": 1}}` becomes
/// `{"a.b": 1}`). Arrays and scalars are leaves and are kept as-is.
pub fn flatten(record: Map<String, Value>) -> FlatRecord {
    let mut out = FlatRecord::new();
    flatten_into(record, "", &mut out);
    out
}

/// Flatten `record` under `prefix`, writing every leaf into `out`
///
/// An empty prefix means the record's keys are used unqualified. Keys that
/// collide with an earlier path overwrite its value in place.
pub fn flatten_into(record: Map<String, Value>, prefix: &str, out: &mut FlatRecord) {
    for (key, value) in record {
        let path = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            Value::Object(nested) => flatten_into(nested, &path, out),
            leaf => {
                out.insert(path, leaf);
            }
        }
    }
}
