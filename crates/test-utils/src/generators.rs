//! Test data generators for engine results.
//!
//! These generators build raw results in the engine's wire shape
//! (`"List(a,b)" -> number`) from plain tuples.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Encode a tuple the way the engine does.
///
/// # Example
///
/// ```
/// use test_utils::list_key;
///
/// assert_eq!(list_key(&[41, 2]), "List(41,2)");
/// assert_eq!(list_key(&[]), "List()");
/// ```
pub fn list_key(values: &[i64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("List({})", parts.join(","))
}

/// Build a raw result from `(tuple, value)` pairs.
///
/// # Example
///
/// ```
/// use test_utils::raw_result;
///
/// let raw = raw_result(&[([41], 10.0), ([82], 5.0)]);
/// assert_eq!(raw["List(41)"], 10.0);
/// ```
pub fn raw_result<K: AsRef<[i64]>>(pairs: &[(K, f64)]) -> BTreeMap<String, f64> {
    pairs
        .iter()
        .map(|(key, value)| (list_key(key.as_ref()), *value))
        .collect()
}

/// A `/multi` response answering every shape with the same per-label
/// results.
pub fn multi_response(shape_ids: &[&str], per_area: &Value) -> Value {
    let mut out = Map::new();
    for id in shape_ids {
        out.insert(id.to_string(), per_area.clone());
    }
    Value::Object(out)
}

/// A constant daily series of `days` values.
pub fn constant_series(days: usize, value: f64) -> Vec<f64> {
    vec![value; days]
}
