//! Cache keys for operation results.
//!
//! Format: `geop_{areaId}__{operation}__{layer}__{layer}...[__{suffix}]`,
//! with one layer value per token in token order. Dataset ids are part of
//! the key, so changing a default or an override never reuses a stale
//! entry.

use std::fmt;

use geop_common::AreaId;

use crate::layers::LayerConfig;

const PREFIX: &str = "geop_";
const SEPARATOR: &str = "__";

/// A deterministic cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for `operation` (a catalog name, a multi label, or an explicit
    /// override key) over `area` with the given layers.
    ///
    /// Returns `None` for areas that must not be cached.
    pub fn for_area(area: &AreaId, operation: &str, layers: &LayerConfig) -> Option<CacheKey> {
        Self::with_suffix(area, operation, layers, None)
    }

    /// Same as [`CacheKey::for_area`], with a parameter suffix appended.
    pub fn with_suffix(
        area: &AreaId,
        operation: &str,
        layers: &LayerConfig,
        suffix: Option<&str>,
    ) -> Option<CacheKey> {
        if !area.is_cacheable() {
            return None;
        }

        let mut key = format!("{}{}{}{}", PREFIX, area, SEPARATOR, operation);
        for dataset in layers.values() {
            key.push_str(SEPARATOR);
            key.push_str(dataset);
        }
        if let Some(suffix) = suffix {
            key.push_str(SEPARATOR);
            key.push_str(suffix);
        }

        Some(CacheKey(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
