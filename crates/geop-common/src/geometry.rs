//! Minimal GeoJSON polygon handling.
//!
//! Only what the pipeline needs from a shape: its area on the sphere and a
//! representative centroid for latitude-dependent calculations.

use serde_json::Value;
use thiserror::Error;

/// Equatorial radius used for spherical area, in meters.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("unsupported geometry type: {0}")]
    UnsupportedType(String),
    #[error("missing or malformed coordinates")]
    BadCoordinates,
    #[error("geometry has no polygons")]
    Empty,
}

type Ring = Vec<[f64; 2]>;

/// A polygon or multipolygon in EPSG:4326, as lists of rings.
///
/// The first ring of every polygon is its exterior; the rest are holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    polygons: Vec<Vec<Ring>>,
}

impl Geometry {
    /// Parse a GeoJSON `Polygon`, `MultiPolygon` or `Feature` wrapping one.
    pub fn from_geojson(value: &Value) -> Result<Self, GeometryError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(GeometryError::BadCoordinates)?;

        let polygons = match kind {
            "Feature" => {
                let geometry = value.get("geometry").ok_or(GeometryError::BadCoordinates)?;
                return Self::from_geojson(geometry);
            }
            "Polygon" => vec![parse_polygon(coordinates(value)?)?],
            "MultiPolygon" => coordinates(value)?
                .as_array()
                .ok_or(GeometryError::BadCoordinates)?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>, _>>()?,
            other => return Err(GeometryError::UnsupportedType(other.to_string())),
        };

        if polygons.is_empty() {
            return Err(GeometryError::Empty);
        }

        Ok(Self { polygons })
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// Area in square meters, holes subtracted.
    ///
    /// Computed on a sphere of the WGS84 equatorial radius. This stands in
    /// for reprojecting to an equal-area CRS; at mid latitudes the two agree
    /// to within a few tenths of a percent.
    pub fn area_sq_m(&self) -> f64 {
        self.polygons
            .iter()
            .map(|rings| {
                let mut rings = rings.iter();
                let outer = rings.next().map(ring_area).unwrap_or(0.0);
                let holes: f64 = rings.map(ring_area).sum();
                (outer - holes).max(0.0)
            })
            .sum()
    }

    pub fn area_sq_km(&self) -> f64 {
        self.area_sq_m() / 1_000_000.0
    }

    /// Planar area-weighted centroid of the exterior rings, as `(lon, lat)`.
    pub fn centroid(&self) -> (f64, f64) {
        let mut weight = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;

        for rings in &self.polygons {
            let Some(ring) = rings.first() else { continue };
            let (a, x, y) = planar_moments(ring);
            weight += a;
            cx += x;
            cy += y;
        }

        if weight.abs() > f64::EPSILON {
            return (cx / (3.0 * weight), cy / (3.0 * weight));
        }

        // Degenerate rings: fall back to the vertex mean
        let points: Vec<&[f64; 2]> = self.polygons.iter().flatten().flatten().collect();
        let n = points.len().max(1) as f64;
        (
            points.iter().map(|p| p[0]).sum::<f64>() / n,
            points.iter().map(|p| p[1]).sum::<f64>() / n,
        )
    }
}

fn coordinates(value: &Value) -> Result<&Value, GeometryError> {
    value.get("coordinates").ok_or(GeometryError::BadCoordinates)
}

fn parse_polygon(value: &Value) -> Result<Vec<Ring>, GeometryError> {
    value
        .as_array()
        .ok_or(GeometryError::BadCoordinates)?
        .iter()
        .map(parse_ring)
        .collect()
}

fn parse_ring(value: &Value) -> Result<Ring, GeometryError> {
    value
        .as_array()
        .ok_or(GeometryError::BadCoordinates)?
        .iter()
        .map(|point| match point.as_array().map(Vec::as_slice) {
            Some([x, y, ..]) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Ok([x, y]),
                _ => Err(GeometryError::BadCoordinates),
            },
            _ => Err(GeometryError::BadCoordinates),
        })
        .collect()
}

fn ring_area(ring: &Ring) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }

    let mut total = 0.0;
    for (i, p1) in ring.iter().enumerate() {
        let p2 = &ring[(i + 1) % ring.len()];
        total += (p2[0] - p1[0]).to_radians()
            * (2.0 + p1[1].to_radians().sin() + p2[1].to_radians().sin());
    }

    (total * EARTH_RADIUS_M * EARTH_RADIUS_M / 2.0).abs()
}

/// Signed shoelace area and first moments, oriented so the exterior is positive.
fn planar_moments(ring: &Ring) -> (f64, f64, f64) {
    let mut a = 0.0;
    let mut x = 0.0;
    let mut y = 0.0;

    for (i, p1) in ring.iter().enumerate() {
        let p2 = &ring[(i + 1) % ring.len()];
        let cross = p1[0] * p2[1] - p2[0] * p1[1];
        a += cross;
        x += (p1[0] + p2[0]) * cross;
        y += (p1[1] + p2[1]) * cross;
    }

    (a / 2.0, x / 2.0, y / 2.0)
}
