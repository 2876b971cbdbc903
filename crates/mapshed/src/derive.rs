//! Per-layer derivation: raw engine results for one area into typed
//! layer statistics.

use std::collections::BTreeMap;

use geoprocessing::engine::RawResult;
use geoprocessing::parse::{self, CompositeKey};
use geoprocessing::PartialResultSet;
use geop_common::GeopError;

use crate::error::{AssemblyError, AssemblyResult};

/// Labels of the MapShed operation set, as keyed in engine responses.
pub mod labels {
    pub const NLCD_SOIL: &str = "nlcd_soil";
    pub const NLCD_STREAMS: &str = "nlcd_streams";
    pub const GWN: &str = "gwn";
    pub const AVG_AWC: &str = "avg_awc";
    pub const NLCD_SLOPE: &str = "nlcd_slope";
    pub const SLOPE: &str = "slope";
    pub const NLCD_KFACTOR: &str = "nlcd_kfactor";
    pub const SOILN: &str = "soiln";
    pub const SOILP: &str = "soilp";
    pub const RECESS_COEF: &str = "recess_coef";
}

/// Layer statistics for one area, ready for assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerStats {
    /// Cell counts by (NLCD class, soil group).
    pub nlcd_soil: BTreeMap<(i64, i64), f64>,
    /// Stream length (m) by NLCD class.
    pub nlcd_streams: BTreeMap<i64, f64>,
    /// Cell counts by groundwater nitrogen class.
    pub gwn: BTreeMap<i64, f64>,
    /// Cell counts by (NLCD class, steep flag). Non-zero flags mark cells
    /// above 3% slope.
    pub nlcd_slope: BTreeMap<(i64, i64), f64>,
    /// Mean K factor by NLCD class.
    pub nlcd_kfactor: BTreeMap<i64, f64>,
    pub avg_awc: f64,
    /// Mean slope (%).
    pub avg_slope: f64,
    pub soil_n: f64,
    pub soil_p: f64,
    pub recess_coef: f64,
}

impl LayerStats {
    /// Derive statistics from one area's per-label results.
    pub fn from_results(results: &BTreeMap<String, RawResult>) -> AssemblyResult<Self> {
        let layer = |label: &str| {
            results
                .get(label)
                .ok_or_else(|| AssemblyError::MissingLayer(label.to_string()))
        };

        Ok(Self {
            nlcd_soil: pairs(layer(labels::NLCD_SOIL)?)?,
            nlcd_streams: histogram(layer(labels::NLCD_STREAMS)?)?,
            gwn: histogram(layer(labels::GWN)?)?,
            nlcd_slope: pairs(layer(labels::NLCD_SLOPE)?)?,
            nlcd_kfactor: histogram(layer(labels::NLCD_KFACTOR)?)?,
            avg_awc: average(layer(labels::AVG_AWC)?)?,
            avg_slope: average(layer(labels::SLOPE)?)?,
            soil_n: average(layer(labels::SOILN)?)?,
            soil_p: average(layer(labels::SOILP)?)?,
            recess_coef: average(layer(labels::RECESS_COEF)?)?,
        })
    }

    /// Cell counts by NLCD class, water included.
    pub fn nlcd_counts(&self) -> BTreeMap<i64, f64> {
        let mut out = BTreeMap::new();
        for (&(nlcd, _), &cells) in &self.nlcd_soil {
            *out.entry(nlcd).or_insert(0.0) += cells;
        }
        out
    }

    pub fn total_cells(&self) -> f64 {
        self.nlcd_soil.values().sum()
    }

    /// Combine sub-basin statistics into watershed statistics.
    ///
    /// Histograms are summed. Averages are weighted by cell count, and the
    /// per-class K factor by the cells of that class.
    pub fn combine<'a>(parts: impl IntoIterator<Item = &'a LayerStats>) -> LayerStats {
        let mut out = LayerStats::default();
        let mut weight = 0.0;
        let mut kfactor: BTreeMap<i64, (f64, f64)> = BTreeMap::new();

        for part in parts {
            add_all(&mut out.nlcd_soil, &part.nlcd_soil);
            add_all(&mut out.nlcd_streams, &part.nlcd_streams);
            add_all(&mut out.gwn, &part.gwn);
            add_all(&mut out.nlcd_slope, &part.nlcd_slope);

            let cells = part.total_cells();
            weight += cells;
            out.avg_awc += part.avg_awc * cells;
            out.avg_slope += part.avg_slope * cells;
            out.soil_n += part.soil_n * cells;
            out.soil_p += part.soil_p * cells;
            out.recess_coef += part.recess_coef * cells;

            let counts = part.nlcd_counts();
            for (nlcd, k) in &part.nlcd_kfactor {
                let cells = counts.get(nlcd).copied().unwrap_or(0.0);
                let entry = kfactor.entry(*nlcd).or_insert((0.0, 0.0));
                entry.0 += k * cells;
                entry.1 += cells;
            }
        }

        if weight > 0.0 {
            out.avg_awc /= weight;
            out.avg_slope /= weight;
            out.soil_n /= weight;
            out.soil_p /= weight;
            out.recess_coef /= weight;
        }

        out.nlcd_kfactor = kfactor
            .into_iter()
            .filter(|(_, (_, cells))| *cells > 0.0)
            .map(|(nlcd, (sum, cells))| (nlcd, sum / cells))
            .collect();

        out
    }
}

/// Layer statistics of every area in a joined result set, keyed the same
/// way.
pub type ParsedLayers = BTreeMap<String, LayerStats>;

/// Parse every area of a joined result set. One bad area fails the set.
pub fn parse_results(results: &PartialResultSet) -> AssemblyResult<ParsedLayers> {
    results
        .iter()
        .map(|(area, per_label)| -> AssemblyResult<(String, LayerStats)> {
            Ok((area.clone(), LayerStats::from_results(per_label)?))
        })
        .collect()
}

fn add_all<K: Ord + Copy>(into: &mut BTreeMap<K, f64>, from: &BTreeMap<K, f64>) {
    for (key, value) in from {
        *into.entry(*key).or_insert(0.0) += value;
    }
}

fn element(key: &CompositeKey, index: usize, arity: usize) -> AssemblyResult<i64> {
    if key.values().len() != arity {
        return Err(GeopError::MalformedResult(format!(
            "expected {} elements in key {}",
            arity, key
        ))
        .into());
    }
    key.get(index)
        .ok_or_else(|| GeopError::MalformedResult(format!("no element {} in key {}", index, key)).into())
}

/// Single-raster histogram keyed by `List(a)`.
fn histogram(raw: &RawResult) -> AssemblyResult<BTreeMap<i64, f64>> {
    let mut out = BTreeMap::new();
    for (key, value) in parse::parse(raw)? {
        *out.entry(element(&key, 0, 1)?).or_insert(0.0) += value;
    }
    Ok(out)
}

/// Two-raster histogram keyed by `List(a,b)`.
fn pairs(raw: &RawResult) -> AssemblyResult<BTreeMap<(i64, i64), f64>> {
    let mut out = BTreeMap::new();
    for (key, value) in parse::parse(raw)? {
        let pair = (element(&key, 0, 2)?, element(&key, 1, 2)?);
        *out.entry(pair).or_insert(0.0) += value;
    }
    Ok(out)
}

/// Mean of an ungrouped average. Empty results (no data under the shape)
/// average to zero.
fn average(raw: &RawResult) -> AssemblyResult<f64> {
    let parsed = parse::parse(raw)?;
    if parsed.is_empty() {
        return Ok(0.0);
    }
    Ok(parsed.values().sum::<f64>() / parsed.len() as f64)
}
