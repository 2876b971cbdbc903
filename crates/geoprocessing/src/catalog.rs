//! Operation catalog.
//!
//! Every geoprocessing request names an [`Operation`]. The set is closed:
//! an unknown name fails validation before any work is scheduled.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use geop_common::{GeopError, GeopResult};

use crate::layers::{AWC, GWN, KFACTOR, LAND, RECESS, SLOPE, SOIL, SOILN, SOILP};

/// Engine operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Cell counts grouped by the values of one or more rasters.
    RasterGroupedCount,
    /// Average of a target raster grouped by the values of other rasters.
    RasterGroupedAverage,
    /// Vector line length joined against raster values.
    RasterLinesJoin,
    /// Summary statistics of a target raster.
    RasterSummary,
}

impl OperationKind {
    /// Name the engine expects in `operationType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RasterGroupedCount => "RasterGroupedCount",
            Self::RasterGroupedAverage => "RasterGroupedAverage",
            Self::RasterLinesJoin => "RasterLinesJoin",
            Self::RasterSummary => "RasterSummary",
        }
    }
}

/// Declarative description of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub name: &'static str,
    pub kind: OperationKind,
    pub raster_tokens: &'static [&'static str],
    pub target_raster_token: Option<&'static str>,
    pub pixel_is_area: bool,
}

impl OperationSpec {
    fn new(
        name: &'static str,
        kind: OperationKind,
        raster_tokens: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            kind,
            raster_tokens,
            target_raster_token: None,
            pixel_is_area: false,
        }
    }

    fn target(mut self, token: &'static str) -> Self {
        self.target_raster_token = Some(token);
        self
    }

    fn pixel_is_area(mut self) -> Self {
        self.pixel_is_area = true;
        self
    }

    /// Every token the operation reads, rasters first then the target.
    pub fn tokens(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.raster_tokens
            .iter()
            .copied()
            .chain(self.target_raster_token)
    }
}

/// A catalog operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Nlcd,
    Soil,
    NlcdSoil,
    NlcdStreams,
    NlcdKfactor,
    NlcdSlope,
    Slope,
    SlopeSummary,
    Gwn,
    AvgAwc,
    #[serde(rename = "soiln")]
    SoilN,
    #[serde(rename = "soilp")]
    SoilP,
    RecessCoef,
}

impl Operation {
    pub const ALL: [Operation; 13] = [
        Operation::Nlcd,
        Operation::Soil,
        Operation::NlcdSoil,
        Operation::NlcdStreams,
        Operation::NlcdKfactor,
        Operation::NlcdSlope,
        Operation::Slope,
        Operation::SlopeSummary,
        Operation::Gwn,
        Operation::AvgAwc,
        Operation::SoilN,
        Operation::SoilP,
        Operation::RecessCoef,
    ];

    /// The operation's declarative spec.
    pub fn spec(&self) -> OperationSpec {
        use OperationKind::*;

        match self {
            Operation::Nlcd => OperationSpec::new("nlcd", RasterGroupedCount, &[LAND]),
            Operation::Soil => {
                OperationSpec::new("soil", RasterGroupedCount, &[SOIL]).pixel_is_area()
            }
            Operation::NlcdSoil => OperationSpec::new("nlcd_soil", RasterGroupedCount, &[LAND, SOIL]),
            Operation::NlcdStreams => OperationSpec::new("nlcd_streams", RasterLinesJoin, &[LAND]),
            Operation::NlcdKfactor => {
                OperationSpec::new("nlcd_kfactor", RasterGroupedAverage, &[LAND]).target(KFACTOR)
            }
            Operation::NlcdSlope => {
                OperationSpec::new("nlcd_slope", RasterGroupedCount, &[LAND, SLOPE])
            }
            Operation::Slope => OperationSpec::new("slope", RasterGroupedAverage, &[]).target(SLOPE),
            Operation::SlopeSummary => {
                OperationSpec::new("slope_summary", RasterSummary, &[]).target(SLOPE)
            }
            Operation::Gwn => OperationSpec::new("gwn", RasterGroupedCount, &[GWN]),
            Operation::AvgAwc => OperationSpec::new("avg_awc", RasterGroupedAverage, &[]).target(AWC),
            Operation::SoilN => OperationSpec::new("soiln", RasterGroupedAverage, &[]).target(SOILN),
            Operation::SoilP => OperationSpec::new("soilp", RasterGroupedAverage, &[]).target(SOILP),
            Operation::RecessCoef => {
                OperationSpec::new("recess_coef", RasterGroupedAverage, &[]).target(RECESS)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    /// Look up an operation by its catalog name.
    pub fn from_name(name: &str) -> GeopResult<Operation> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name() == name)
            .ok_or_else(|| GeopError::UnknownOperation(name.to_string()))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = GeopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::from_name(s)
    }
}

/// A named group of operations submitted together to the multi endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationSet {
    /// Everything a MapShed data model needs from the engine.
    MapshedCore,
}

impl OperationSet {
    /// `(label, operation)` pairs. Labels key the engine response.
    pub fn members(&self) -> &'static [(&'static str, Operation)] {
        match self {
            OperationSet::MapshedCore => &[
                ("nlcd_soil", Operation::NlcdSoil),
                ("nlcd_streams", Operation::NlcdStreams),
                ("gwn", Operation::Gwn),
                ("avg_awc", Operation::AvgAwc),
                ("nlcd_slope", Operation::NlcdSlope),
                ("slope", Operation::Slope),
                ("nlcd_kfactor", Operation::NlcdKfactor),
                ("soiln", Operation::SoilN),
                ("soilp", Operation::SoilP),
                ("recess_coef", Operation::RecessCoef),
            ],
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &'static str> {
        self.members().iter().map(|(label, _)| *label)
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperationSet::MapshedCore => "mapshed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerConfig;

    #[test]
    fn test_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.name()).unwrap(), op);
            assert_eq!(op.to_string(), op.name());
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        let err = Operation::from_name("nlcd_everything").unwrap_err();
        assert_eq!(err, GeopError::UnknownOperation("nlcd_everything".into()));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_serde_name_matches_catalog_name() {
        for op in Operation::ALL {
            let json = serde_json::to_value(op).unwrap();
            assert_eq!(json, serde_json::Value::String(op.name().to_string()));
        }
    }

    #[test]
    fn test_every_token_resolves_against_defaults() {
        let layers = LayerConfig::default();
        for op in Operation::ALL {
            for token in op.spec().tokens() {
                assert!(layers.contains(token), "{} uses unknown {}", op, token);
            }
        }
    }

    #[test]
    fn test_soil_spec() {
        let spec = Operation::Soil.spec();
        assert_eq!(spec.kind, OperationKind::RasterGroupedCount);
        assert_eq!(spec.raster_tokens, &[SOIL]);
        assert!(spec.pixel_is_area);
        assert_eq!(Operation::Slope.spec().target_raster_token, Some(SLOPE));
    }

    #[test]
    fn test_mapshed_labels_are_unique() {
        let mut labels: Vec<_> = OperationSet::MapshedCore.labels().collect();
        let total = labels.len();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), total);
    }
}
