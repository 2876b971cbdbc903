//! Engine result keys.
//!
//! Grouped operations come back keyed by the tuple of raster values each
//! group was formed from, serialized as `"List(a,b,...)"`. This module is
//! the only place that knows that encoding.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use geop_common::{GeopError, GeopResult};

use crate::engine::RawResult;

const OPEN: &str = "List(";
const CLOSE: char = ')';

/// A decoded `List(...)` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey(pub Vec<i64>);

impl CompositeKey {
    pub fn values(&self) -> &[i64] {
        &self.0
    }

    /// First element, the grouping value of single-raster operations.
    pub fn first(&self) -> Option<i64> {
        self.0.first().copied()
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        self.0.get(index).copied()
    }
}

impl FromStr for CompositeKey {
    type Err = GeopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix(OPEN)
            .and_then(|rest| rest.strip_suffix(CLOSE))
            .ok_or_else(|| GeopError::MalformedResult(format!("bad composite key '{}'", s)))?;

        if inner.trim().is_empty() {
            return Ok(CompositeKey(Vec::new()));
        }

        inner
            .split(',')
            .map(|part| {
                part.trim().parse::<i64>().map_err(|_| {
                    GeopError::MalformedResult(format!("bad element '{}' in key '{}'", part, s))
                })
            })
            .collect::<GeopResult<Vec<_>>>()
            .map(CompositeKey)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(OPEN)?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "{}", CLOSE)
    }
}

/// A grouped result with decoded keys.
pub type ParsedResult = BTreeMap<CompositeKey, f64>;

/// Decode every key of a raw engine result.
///
/// A single malformed key fails the whole result.
pub fn parse(raw: &RawResult) -> GeopResult<ParsedResult> {
    raw.iter()
        .map(|(key, value)| -> GeopResult<(CompositeKey, f64)> {
            Ok((key.parse::<CompositeKey>()?, *value))
        })
        .collect()
}

/// Encode a parsed result back to the engine's wire form.
pub fn encode(parsed: &ParsedResult) -> RawResult {
    parsed
        .iter()
        .map(|(key, value)| (key.to_string(), *value))
        .collect()
}

/// Collapse a parsed result onto one element of its keys, summing values.
pub fn sum_by(parsed: &ParsedResult, index: usize) -> BTreeMap<i64, f64> {
    let mut out = BTreeMap::new();
    for (key, value) in parsed {
        if let Some(v) = key.get(index) {
            *out.entry(v).or_insert(0.0) += value;
        }
    }
    out
}
