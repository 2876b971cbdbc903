//! Common test fixtures for geoprocessing tests.
//!
//! This module provides pre-defined shapes and engine payloads that
//! represent common scenarios in watershed analysis.

use serde_json::{json, Value};

/// Well-known area identifiers used across tests.
pub mod areas {
    /// A HUC-12 sub-watershed in the Delaware River Basin.
    pub const HUC12: &str = "huc12__55174";

    /// A neighbouring HUC-12.
    pub const HUC12_NEIGHBOUR: &str = "huc12__55175";

    /// A HUC-10 containing several HUC-12s.
    pub const HUC10: &str = "huc10__1953";
}

/// Axis-aligned square polygon with its south-west corner at
/// `(lon, lat)` and sides of `size` degrees.
pub fn square(lon: f64, lat: f64, size: f64) -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [lon, lat],
            [lon + size, lat],
            [lon + size, lat + size],
            [lon, lat + size],
            [lon, lat]
        ]]
    })
}

/// A small square in south-eastern Pennsylvania (~0.01 degree sides).
pub fn pa_square() -> Value {
    square(-75.2, 39.95, 0.01)
}

/// `/run` response for the NLCD histogram over [`pa_square`].
///
/// Mostly forest and pasture with some low intensity development.
pub fn nlcd_result() -> Value {
    json!({
        "result": {
            "List(11)": 10.0,
            "List(21)": 60.0,
            "List(22)": 40.0,
            "List(41)": 400.0,
            "List(81)": 300.0,
            "List(82)": 190.0
        }
    })
}

/// `/run` response for the hydrologic soil group histogram.
pub fn soil_result() -> Value {
    json!({
        "result": {
            "List(1)": 100.0,
            "List(2)": 500.0,
            "List(3)": 300.0,
            "List(4)": 50.0,
            "List(6)": 50.0
        }
    })
}

/// Per-label raw results for one area of the MapShed operation set.
pub fn mapshed_area_results() -> Value {
    json!({
        "nlcd_soil": {
            "List(41,2)": 300.0,
            "List(41,3)": 100.0,
            "List(81,2)": 200.0,
            "List(81,3)": 100.0,
            "List(82,1)": 100.0,
            "List(82,4)": 90.0,
            "List(21,2)": 60.0,
            "List(22,3)": 40.0,
            "List(11,2)": 10.0
        },
        "nlcd_streams": {
            "List(41)": 1200.0,
            "List(81)": 800.0,
            "List(82)": 600.0,
            "List(22)": 150.0
        },
        "gwn": {
            "List(1)": 500.0,
            "List(3)": 300.0,
            "List(5)": 200.0
        },
        "avg_awc": {"List()": 12.5},
        "nlcd_slope": {
            "List(41,1)": 250.0,
            "List(41,0)": 150.0,
            "List(81,0)": 280.0,
            "List(81,1)": 20.0,
            "List(82,0)": 170.0,
            "List(82,1)": 20.0,
            "List(22,0)": 40.0,
            "List(21,0)": 60.0
        },
        "slope": {"List()": 4.2},
        "nlcd_kfactor": {
            "List(41)": 0.25,
            "List(81)": 0.3,
            "List(82)": 0.32,
            "List(21)": 0.28,
            "List(22)": 0.29
        },
        "soiln": {"List()": 1100.0},
        "soilp": {"List()": 450.0},
        "recess_coef": {"List()": 0.07}
    })
}
