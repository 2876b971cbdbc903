//! Layer resolution: symbolic raster tokens to concrete dataset ids.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use geop_common::{GeopError, GeopResult};

pub const LAND: &str = "__LAND__";
pub const SOIL: &str = "__SOIL__";
pub const SLOPE: &str = "__SLOPE__";
pub const KFACTOR: &str = "__KFACTOR__";
pub const GWN: &str = "__GWN__";
pub const AWC: &str = "__AWC__";
pub const SOILN: &str = "__SOILN__";
pub const SOILP: &str = "__SOILP__";
pub const RECESS: &str = "__RECESS__";

/// Every token the operation catalog refers to.
pub const ALL_TOKENS: [&str; 9] = [LAND, SOIL, SLOPE, KFACTOR, GWN, AWC, SOILN, SOILP, RECESS];

/// Mapping from layer token to dataset id.
///
/// Backed by a `BTreeMap` so iteration (and therefore the cache key) is in a
/// fixed token order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerConfig(BTreeMap<String, String>);

impl LayerConfig {
    pub fn new(layers: BTreeMap<String, String>) -> Self {
        Self(layers)
    }

    /// Overlay per-request overrides onto these defaults.
    ///
    /// Overriding a token that has no default is rejected.
    pub fn resolve(&self, overrides: &BTreeMap<String, String>) -> GeopResult<LayerConfig> {
        let mut resolved = self.0.clone();

        for (token, dataset) in overrides {
            match resolved.get_mut(token) {
                Some(slot) => *slot = dataset.clone(),
                None => {
                    return Err(GeopError::InvalidLayerOverride {
                        token: token.clone(),
                    })
                }
            }
        }

        Ok(LayerConfig(resolved))
    }

    /// Entries of `other` win; tokens it lacks keep this map's values.
    pub fn merge(mut self, other: LayerConfig) -> LayerConfig {
        self.0.extend(other.0);
        self
    }

    /// Dataset id for a token.
    pub fn dataset(&self, token: &str) -> GeopResult<&str> {
        self.0
            .get(token)
            .map(String::as_str)
            .ok_or_else(|| GeopError::Config(format!("no dataset configured for {}", token)))
    }

    /// Substitute each token with its dataset id.
    pub fn substitute(&self, tokens: &[&str]) -> GeopResult<Vec<String>> {
        tokens
            .iter()
            .map(|t| self.dataset(t).map(str::to_string))
            .collect()
    }

    /// Dataset ids in token order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains_key(token)
    }
}

impl Default for LayerConfig {
    fn default() -> Self {
        let layers = [
            (LAND, "nlcd-2019-30m-epsg5070-512-byte"),
            (SOIL, "ssurgo-hydro-groups-30m-epsg5070-512-int8"),
            (SLOPE, "us-percent-slope-30m-epsg5070-512"),
            (KFACTOR, "us-ssugro-kfactor-30m-epsg5070-512"),
            (GWN, "us-groundwater-nitrogen-30m-epsg5070-512"),
            (AWC, "us-ssurgo-aws100-30m-epsg5070-512"),
            (SOILN, "soiln-epsg5070"),
            (SOILP, "soilpallland2-epsg5070"),
            (RECESS, "recess_coef-epsg5070"),
        ];

        Self(
            layers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}
