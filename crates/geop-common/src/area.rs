//! Area identifiers and descriptors.
//!
//! A well-known area is a stable `{table}__{rowid}` pair (e.g. `huc12__55174`)
//! whose results may be cached. Anything else is tagged with the `nocache`
//! sentinel and always recomputed.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::GeopError;
use crate::geometry::Geometry;

/// Sentinel id for areas that must never be cached.
pub const NOCACHE: &str = "nocache";

/// Identifier of an area of interest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AreaId {
    WellKnown { table: String, row_id: String },
    NoCache,
}

impl AreaId {
    pub fn well_known(table: impl Into<String>, row_id: impl Into<String>) -> Self {
        AreaId::WellKnown {
            table: table.into(),
            row_id: row_id.into(),
        }
    }

    /// Whether results for this area may be read from or written to the cache.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, AreaId::WellKnown { .. })
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AreaId::WellKnown { table, row_id } => write!(f, "{}__{}", table, row_id),
            AreaId::NoCache => f.write_str(NOCACHE),
        }
    }
}

impl FromStr for AreaId {
    type Err = GeopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == NOCACHE {
            return Ok(AreaId::NoCache);
        }

        match s.split_once("__") {
            Some((table, row_id))
                if !table.is_empty() && !row_id.is_empty() && !row_id.contains("__") =>
            {
                Ok(AreaId::well_known(table, row_id))
            }
            _ => Err(GeopError::Config(format!(
                "area id '{}' is neither a well-known id nor '{}'",
                s, NOCACHE
            ))),
        }
    }
}

impl TryFrom<String> for AreaId {
    type Error = GeopError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AreaId> for String {
    fn from(id: AreaId) -> Self {
        id.to_string()
    }
}

/// One shape submitted for geoprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaDescriptor {
    pub id: AreaId,
    /// GeoJSON polygon or multipolygon, passed through to the engine as-is.
    #[serde(rename = "shape")]
    pub geometry: serde_json::Value,
    /// Set when the area is a sub-basin of a larger watershed request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watershed_member_id: Option<String>,
}

impl AreaDescriptor {
    pub fn new(id: AreaId, geometry: serde_json::Value) -> Self {
        Self {
            id,
            geometry,
            watershed_member_id: None,
        }
    }

    /// A user-drawn shape that is never cached.
    pub fn uncached(geometry: serde_json::Value) -> Self {
        Self::new(AreaId::NoCache, geometry)
    }

    pub fn with_member_id(mut self, member_id: impl Into<String>) -> Self {
        self.watershed_member_id = Some(member_id.into());
        self
    }

    /// Key used for this area in multi-shape requests and responses.
    ///
    /// Sub-basins are keyed by their member id so that several uncached
    /// shapes in one batch stay distinguishable.
    pub fn result_key(&self) -> String {
        match &self.watershed_member_id {
            Some(member) if !self.id.is_cacheable() => member.clone(),
            _ => self.id.to_string(),
        }
    }

    pub fn parsed_geometry(&self) -> Result<Geometry, GeopError> {
        Geometry::from_geojson(&self.geometry)
            .map_err(|e| GeopError::InvalidGeometry(e.to_string()))
    }
}

/// Reject a batch in which two areas share a result key.
///
/// Uncached areas without a member id all key as `nocache`, so two of them
/// can never go into one multi-shape request.
pub fn ensure_distinct_keys(areas: &[AreaDescriptor]) -> Result<(), GeopError> {
    let mut seen = HashSet::with_capacity(areas.len());
    for area in areas {
        let key = area.result_key();
        if !seen.insert(key.clone()) {
            return Err(GeopError::Config(format!(
                "two areas share the result key '{}'; uncached sub-basins need distinct member ids",
                key
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_well_known() {
        let id: AreaId = "huc12__55174".parse().unwrap();
        assert_eq!(id, AreaId::well_known("huc12", "55174"));
        assert!(id.is_cacheable());
        assert_eq!(id.to_string(), "huc12__55174");
    }

    #[test]
    fn test_parse_sentinel() {
        let id: AreaId = "nocache".parse().unwrap();
        assert_eq!(id, AreaId::NoCache);
        assert!(!id.is_cacheable());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("huc12".parse::<AreaId>().is_err());
        assert!("__55174".parse::<AreaId>().is_err());
        assert!("huc12__".parse::<AreaId>().is_err());
        assert!("a__b__c".parse::<AreaId>().is_err());
    }

    #[test]
    fn test_descriptor_wire_format() {
        let area = AreaDescriptor::new(
            AreaId::well_known("huc12", "1"),
            json!({"type": "Polygon", "coordinates": []}),
        );
        let value = serde_json::to_value(&area).unwrap();
        assert_eq!(value["id"], "huc12__1");
        assert_eq!(value["shape"]["type"], "Polygon");
        assert!(value.get("watershed_member_id").is_none());
    }

    #[test]
    fn test_result_key_for_uncached_subbasin() {
        let area = AreaDescriptor::uncached(json!({})).with_member_id("020402030408");
        assert_eq!(area.result_key(), "020402030408");

        let known = AreaDescriptor::new(AreaId::well_known("huc12", "9"), json!({}))
            .with_member_id("020402030408");
        assert_eq!(known.result_key(), "huc12__9");
    }

    #[test]
    fn test_distinct_keys() {
        let a = AreaDescriptor::uncached(json!({})).with_member_id("a");
        let b = AreaDescriptor::uncached(json!({})).with_member_id("b");
        assert!(ensure_distinct_keys(&[a, b]).is_ok());

        let err = ensure_distinct_keys(&[
            AreaDescriptor::uncached(json!({})),
            AreaDescriptor::uncached(json!({})),
        ])
        .unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("nocache"));
    }
}
