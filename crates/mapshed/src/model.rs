//! The assembled data model ("z"), the simulation input for one area.
//!
//! Field names follow the GWLF-E input names so the record can be handed to
//! the simulation as-is.

use serde::{Deserialize, Serialize};

use crate::landuse::{NLU, NRUR, NURB};

/// Hydrology model input for one area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataModel {
    #[serde(rename = "NRur")]
    pub n_rural: usize,
    #[serde(rename = "NUrb")]
    pub n_urban: usize,
    #[serde(rename = "NLU")]
    pub n_land_uses: usize,

    /// Area of each land use (ha).
    #[serde(rename = "Area")]
    pub area: [f64; NLU],
    /// Total land-use area (ha).
    #[serde(rename = "TotArea")]
    pub total_area: f64,
    #[serde(rename = "RurAreaTotal")]
    pub rural_area: f64,
    #[serde(rename = "UrbAreaTotal")]
    pub urban_area: f64,

    #[serde(rename = "CN")]
    pub curve_number: [f64; NLU],
    #[serde(rename = "KF")]
    pub k_factor: [f64; NLU],
    #[serde(rename = "LS")]
    pub ls_factor: [f64; NLU],
    #[serde(rename = "C")]
    pub c_factor: [f64; NLU],
    #[serde(rename = "P")]
    pub p_factor: [f64; NLU],

    #[serde(rename = "SedDelivRatio")]
    pub sed_deliv_ratio: f64,

    /// Monthly ET cover coefficients.
    #[serde(rename = "KV")]
    pub kv: [f64; 12],
    /// Monthly hours of daylight.
    #[serde(rename = "DayHrs")]
    pub day_hours: [f64; 12],
    #[serde(rename = "Grow")]
    pub growing: [bool; 12],

    #[serde(rename = "GrNitrConc")]
    pub gr_nitr_conc: f64,
    #[serde(rename = "GrPhosConc")]
    pub gr_phos_conc: f64,
    /// Soil nitrogen (mg/kg).
    #[serde(rename = "SedNitr")]
    pub sed_nitr: f64,
    /// Soil phosphorus (mg/kg).
    #[serde(rename = "SedPhos")]
    pub sed_phos: f64,
    /// Available water capacity (cm).
    #[serde(rename = "MaxWaterCap")]
    pub max_water_cap: f64,
    #[serde(rename = "RecessionCoef")]
    pub recession_coef: f64,

    /// Stream lengths (km).
    #[serde(rename = "StreamLength")]
    pub stream_length: f64,
    #[serde(rename = "AgLength")]
    pub ag_length: f64,
    #[serde(rename = "UrbLength")]
    pub urban_length: f64,
    /// Fraction of stream length through agricultural land.
    #[serde(rename = "AgStreamPct")]
    pub ag_stream_pct: f64,
    /// Agricultural land steeper than 3% (ha).
    #[serde(rename = "AgSlope3")]
    pub ag_slope3: f64,

    /// Animal units.
    #[serde(rename = "GRAU")]
    pub grazing_animal_units: f64,
    #[serde(rename = "NGAU")]
    pub non_grazing_animal_units: f64,

    #[serde(rename = "NumPointSources")]
    pub num_point_sources: usize,
    /// Monthly point-source nitrogen load (kg).
    #[serde(rename = "PointNitr")]
    pub point_nitr: [f64; 12],
    /// Monthly point-source phosphorus load (kg).
    #[serde(rename = "PointPhos")]
    pub point_phos: [f64; 12],
    /// Monthly point-source discharge (cm over the area).
    #[serde(rename = "PointFlow")]
    pub point_flow: [f64; 12],

    #[serde(rename = "WxYrBeg")]
    pub weather_first_year: i32,
    #[serde(rename = "WxYrEnd")]
    pub weather_last_year: i32,
    #[serde(rename = "WxYrs")]
    pub weather_years: usize,
    /// Daily precipitation (cm), averaged across stations.
    #[serde(rename = "Prec")]
    pub precipitation: Vec<f64>,
    /// Daily mean temperature (°C), averaged across stations.
    #[serde(rename = "Temp")]
    pub temperature: Vec<f64>,
}

impl Default for DataModel {
    fn default() -> Self {
        Self {
            n_rural: NRUR,
            n_urban: NURB,
            n_land_uses: NLU,
            area: [0.0; NLU],
            total_area: 0.0,
            rural_area: 0.0,
            urban_area: 0.0,
            curve_number: [0.0; NLU],
            k_factor: [0.0; NLU],
            ls_factor: [0.0; NLU],
            c_factor: [0.0; NLU],
            p_factor: [0.0; NLU],
            sed_deliv_ratio: 0.0,
            kv: [0.0; 12],
            day_hours: [0.0; 12],
            growing: [false; 12],
            gr_nitr_conc: 0.0,
            gr_phos_conc: 0.0,
            sed_nitr: 0.0,
            sed_phos: 0.0,
            max_water_cap: 0.0,
            recession_coef: 0.0,
            stream_length: 0.0,
            ag_length: 0.0,
            urban_length: 0.0,
            ag_stream_pct: 0.0,
            ag_slope3: 0.0,
            grazing_animal_units: 0.0,
            non_grazing_animal_units: 0.0,
            num_point_sources: 0,
            point_nitr: [0.0; 12],
            point_phos: [0.0; 12],
            point_flow: [0.0; 12],
            weather_first_year: 0,
            weather_last_year: 0,
            weather_years: 0,
            precipitation: Vec::new(),
            temperature: Vec::new(),
        }
    }
}
