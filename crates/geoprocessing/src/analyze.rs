//! Area analyses: categorized summaries of one shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;

use geop_common::{AreaDescriptor, GeopError, GeopResult};

use crate::catalog::Operation;
use crate::engine::RawResult;
use crate::parse;
use crate::runner::{Runner, SingleRequest};

/// NLCD land cover classes: code, key, display name.
pub const NLCD_CLASSES: [(i64, &str, &str); 16] = [
    (11, "open_water", "Open Water"),
    (12, "perennial_ice", "Perennial Ice/Snow"),
    (21, "developed_open", "Developed, Open Space"),
    (22, "developed_low", "Developed, Low Intensity"),
    (23, "developed_med", "Developed, Medium Intensity"),
    (24, "developed_high", "Developed, High Intensity"),
    (31, "barren_land", "Barren Land (Rock/Sand/Clay)"),
    (41, "deciduous_forest", "Deciduous Forest"),
    (42, "evergreen_forest", "Evergreen Forest"),
    (43, "mixed_forest", "Mixed Forest"),
    (52, "shrub", "Shrub/Scrub"),
    (71, "grassland", "Grassland/Herbaceous"),
    (81, "pasture", "Pasture/Hay"),
    (82, "cultivated_crops", "Cultivated Crops"),
    (90, "woody_wetlands", "Woody Wetlands"),
    (95, "herbaceous_wetlands", "Emergent Herbaceous Wetlands"),
];

/// Hydrologic soil groups: raster value, key, display name.
pub const SOIL_GROUPS: [(i64, &str, &str); 7] = [
    (1, "a", "A - High Infiltration"),
    (2, "b", "B - Moderate Infiltration"),
    (3, "c", "C - Slow Infiltration"),
    (4, "d", "D - Very Slow Infiltration"),
    (5, "ad", "A/D - High/Very Slow Infiltration"),
    (6, "bd", "B/D - Medium/Very Slow Infiltration"),
    (7, "cd", "C/D - Medium/Very Slow Infiltration"),
];

/// One category of a survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub code: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    /// Area in square meters.
    pub area: f64,
    /// Fraction of the shape, 0 to 1.
    pub coverage: f64,
    pub cells: f64,
}

/// A categorized summary of one layer over one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub name: String,
    pub categories: Vec<Category>,
}

impl Survey {
    pub fn category(&self, kind: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.kind == kind)
    }

    pub fn total_area(&self) -> f64 {
        self.categories.iter().map(|c| c.area).sum()
    }
}

/// Slope statistics in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlopeSummary {
    pub mean: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// Build a survey from per-code cell counts.
///
/// Every listed class appears, with zero area if absent. Cell area is the
/// shape's area divided by the total number of cells.
pub fn categorize(
    name: &str,
    counts: &BTreeMap<i64, f64>,
    classes: &[(i64, &str, &str)],
    area_sq_m: f64,
) -> Survey {
    let total_cells: f64 = counts.values().sum();
    let cell_area = if total_cells > 0.0 {
        area_sq_m / total_cells
    } else {
        0.0
    };

    let categories = classes
        .iter()
        .map(|(code, kind, display)| {
            let cells = counts.get(code).copied().unwrap_or(0.0);
            Category {
                code: *code,
                kind: kind.to_string(),
                name: display.to_string(),
                area: cells * cell_area,
                coverage: if total_cells > 0.0 {
                    cells / total_cells
                } else {
                    0.0
                },
                cells,
            }
        })
        .collect();

    Survey {
        name: name.to_string(),
        categories,
    }
}

fn request_for(
    operation: Operation,
    area: &AreaDescriptor,
    overrides: &BTreeMap<String, String>,
) -> SingleRequest {
    let request = SingleRequest::for_geometry(operation.name(), &area.geometry)
        .with_overrides(overrides.clone());

    if area.id.is_cacheable() {
        request.with_area(area.id.clone())
    } else {
        request
    }
}

async fn survey(
    runner: &Runner,
    operation: Operation,
    name: &str,
    classes: &[(i64, &str, &str)],
    area: &AreaDescriptor,
    overrides: &BTreeMap<String, String>,
) -> GeopResult<Survey> {
    let area_sq_m = area.parsed_geometry()?.area_sq_m();
    let parsed = runner
        .run_parsed(&request_for(operation, area, overrides))
        .await?;
    let counts = parse::sum_by(&parsed, 0);

    Ok(categorize(name, &counts, classes, area_sq_m))
}

/// Land cover survey from the NLCD histogram.
#[instrument(skip_all, fields(area = %area.id))]
pub async fn analyze_land(
    runner: &Runner,
    area: &AreaDescriptor,
    overrides: &BTreeMap<String, String>,
) -> GeopResult<Survey> {
    survey(runner, Operation::Nlcd, "land", &NLCD_CLASSES, area, overrides).await
}

/// Hydrologic soil group survey.
#[instrument(skip_all, fields(area = %area.id))]
pub async fn analyze_soil(
    runner: &Runner,
    area: &AreaDescriptor,
    overrides: &BTreeMap<String, String>,
) -> GeopResult<Survey> {
    survey(runner, Operation::Soil, "soil", &SOIL_GROUPS, area, overrides).await
}

/// Slope statistics from the summary operation.
#[instrument(skip_all, fields(area = %area.id))]
pub async fn analyze_slope(
    runner: &Runner,
    area: &AreaDescriptor,
    overrides: &BTreeMap<String, String>,
) -> GeopResult<SlopeSummary> {
    let raw = runner
        .run(&request_for(Operation::SlopeSummary, area, overrides))
        .await?;
    slope_summary(&raw)
}

fn slope_summary(raw: &RawResult) -> GeopResult<SlopeSummary> {
    let mean = raw
        .get("mean")
        .copied()
        .ok_or_else(|| GeopError::MalformedResult("slope summary has no mean".to_string()))?;

    Ok(SlopeSummary {
        mean,
        min: raw.get("min").copied(),
        max: raw.get("max").copied(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_fills_missing_classes() {
        let counts = BTreeMap::from([(41, 30.0), (82, 10.0)]);
        let survey = categorize("land", &counts, &NLCD_CLASSES, 4_000.0);

        assert_eq!(survey.categories.len(), NLCD_CLASSES.len());
        let forest = survey.category("deciduous_forest").unwrap();
        assert_eq!(forest.area, 3_000.0);
        assert_eq!(forest.coverage, 0.75);
        assert_eq!(survey.category("open_water").unwrap().area, 0.0);
        assert_eq!(survey.total_area(), 4_000.0);
    }

    #[test]
    fn test_categorize_empty_histogram() {
        let survey = categorize("soil", &BTreeMap::new(), &SOIL_GROUPS, 1_000.0);
        assert!(survey.categories.iter().all(|c| c.coverage == 0.0));
    }

    #[test]
    fn test_slope_summary_requires_mean() {
        let raw = BTreeMap::from([("mean".to_string(), 4.5), ("max".to_string(), 30.0)]);
        let summary = slope_summary(&raw).unwrap();
        assert_eq!(summary.mean, 4.5);
        assert_eq!(summary.max, Some(30.0));
        assert_eq!(summary.min, None);

        assert!(slope_summary(&RawResult::new()).is_err());
    }
}
