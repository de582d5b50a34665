//! Flattening of nested sample records into dotted-path scalar maps.

use crate::decode::{self, Value, STAT_CANDIDATES};

/// Flat record: dotted key path -> decoded scalar, in traversal order.
pub type FlatRecord = Vec<(String, Value)>;

/// Flatten a JSON-shaped value into `(path, scalar)` pairs.
///
/// Mapping keys join with `.`; sequence elements use their index as the path
/// segment. A bare scalar with no prefix maps to the key `NONE`. String
/// leaves are re-decoded (int, float, decimal suffix) so numeric fields
/// reported as unit-suffixed strings normalize to numbers.
pub fn flatten(value: &serde_json::Value) -> FlatRecord {
    let mut out = FlatRecord::new();
    walk(value, None, &mut out);
    out
}

fn walk(value: &serde_json::Value, prefix: Option<&str>, out: &mut FlatRecord) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                walk(v, Some(&join(prefix, k)), out);
            }
        }
        serde_json::Value::Array(seq) => {
            for (i, v) in seq.iter().enumerate() {
                walk(v, Some(&join(prefix, &i.to_string())), out);
            }
        }
        leaf => {
            let key = prefix.unwrap_or("NONE").to_string();
            out.push((key, decode_leaf(leaf)));
        }
    }
}

fn join(prefix: Option<&str>, segment: &str) -> String {
    match prefix {
        Some(p) => format!("{}.{}", p, segment),
        None => segment.to_string(),
    }
}

fn decode_leaf(leaf: &serde_json::Value) -> Value {
    match leaf {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => decode::decode(s, STAT_CANDIDATES),
        // Object/Array handled above.
        _ => unreachable!(),
    }
}

/// Look up a key in a flat record.
pub fn get<'a>(record: &'a FlatRecord, key: &str) -> Option<&'a Value> {
    record.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// The `time` field of a flat record, in whole seconds.
pub fn record_time(record: &FlatRecord) -> Option<i64> {
    get(record, "time").and_then(Value::as_i64)
}
