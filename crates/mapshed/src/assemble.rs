//! Model assembly: layer statistics and ancillary data into a
//! [`DataModel`].

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use geop_common::{AreaDescriptor, Geometry};

use crate::ancillary::{average_weather, point_loads, Ancillary};
use crate::calcs::{self, DEFAULT_GROWING_SEASON};
use crate::derive::{LayerStats, ParsedLayers};
use crate::error::{AssemblyError, AssemblyResult};
use crate::landuse::{LandUse, NLU};
use crate::model::DataModel;

const SQ_M_PER_HA: f64 = 10_000.0;

/// Assemble the data model of one area.
///
/// Fails with [`AssemblyError::NoLandCover`] when no cell falls in any
/// land use.
pub fn assemble(
    stats: &LayerStats,
    geometry: &Geometry,
    ancillary: &Ancillary,
) -> AssemblyResult<DataModel> {
    let nlcd_counts = stats.nlcd_counts();
    let total_cells = stats.total_cells();
    let area_m2 = geometry.area_sq_m();

    let cell_m2 = if total_cells > 0.0 {
        area_m2 / total_cells
    } else {
        0.0
    };

    let lu_cells = calcs::land_use_totals(&nlcd_counts);
    let mut z = DataModel::default();
    for lu in LandUse::ALL {
        z.area[lu.index()] = lu_cells[lu.index()] * cell_m2 / SQ_M_PER_HA;
    }
    z.total_area = z.area.iter().sum();
    if z.total_area <= 0.0 {
        return Err(AssemblyError::NoLandCover);
    }
    z.rural_area = LandUse::ALL
        .iter()
        .filter(|lu| !lu.is_urban())
        .map(|lu| z.area[lu.index()])
        .sum();
    z.urban_area = z.total_area - z.rural_area;

    z.curve_number = calcs::curve_numbers(&stats.nlcd_soil);
    z.k_factor = k_factors(&stats.nlcd_kfactor, &nlcd_counts);
    for lu in LandUse::ALL {
        z.c_factor[lu.index()] = lu.c_factor();
        z.p_factor[lu.index()] = lu.p_factor();
    }

    // Streams
    let lu_streams = calcs::land_use_totals(&stats.nlcd_streams);
    let stream_m: f64 = stats.nlcd_streams.values().sum();
    let ag_m = lu_streams[LandUse::HayPasture.index()] + lu_streams[LandUse::Cropland.index()];
    let urban_m: f64 = LandUse::ALL
        .iter()
        .filter(|lu| lu.is_urban())
        .map(|lu| lu_streams[lu.index()])
        .sum();
    z.stream_length = stream_m / 1000.0;
    z.ag_length = ag_m / 1000.0;
    z.urban_length = urban_m / 1000.0;
    z.ag_stream_pct = if stream_m > 0.0 { ag_m / stream_m } else { 0.0 };

    z.ls_factor = ls_factors(stats.avg_slope, &z.area, &lu_streams, area_m2, stream_m);
    z.ag_slope3 = ag_steep_area(&stats.nlcd_slope, cell_m2);
    z.sed_deliv_ratio = calcs::sediment_delivery_ratio(geometry.area_sq_km());

    let avg_gwn = calcs::weighted_average(&stats.gwn);
    z.gr_nitr_conc = calcs::groundwater_nitrogen_conc(avg_gwn);
    z.gr_phos_conc = calcs::groundwater_phosphorus_conc(avg_gwn);
    z.sed_nitr = stats.soil_n;
    z.sed_phos = stats.soil_p;
    z.max_water_cap = stats.avg_awc;
    z.recession_coef = stats.recess_coef;

    let (_, lat) = geometry.centroid();
    z.day_hours = calcs::day_lengths(lat);

    match average_weather(&ancillary.weather)? {
        Some(weather) => {
            z.growing = calcs::growing_season(&weather.monthly_temperature);
            z.weather_first_year = weather.first_year;
            z.weather_last_year = weather.last_year;
            z.weather_years = weather.years();
            z.precipitation = weather.precipitation;
            z.temperature = weather.temperature;
        }
        None => z.growing = DEFAULT_GROWING_SEASON,
    }
    z.kv = calcs::kv_coefficients(&z.area, &z.growing);

    let (grazing, non_grazing) = ancillary.animals.animal_units();
    z.grazing_animal_units = grazing;
    z.non_grazing_animal_units = non_grazing;

    let loads = point_loads(&ancillary.point_sources, area_m2);
    z.num_point_sources = loads.count;
    z.point_nitr = loads.nitrogen;
    z.point_phos = loads.phosphorus;
    z.point_flow = loads.flow;

    debug!(
        total_area_ha = z.total_area,
        stream_km = z.stream_length,
        weather_years = z.weather_years,
        "Assembled data model"
    );

    Ok(z)
}

/// Cell-weighted K factor of each land use over its NLCD classes.
fn k_factors(kfactor: &BTreeMap<i64, f64>, nlcd_counts: &BTreeMap<i64, f64>) -> [f64; NLU] {
    let mut sums = [0.0; NLU];
    let mut cells = [0.0; NLU];
    for (nlcd, k) in kfactor {
        let (Some(lu), Some(count)) = (LandUse::from_nlcd(*nlcd), nlcd_counts.get(nlcd)) else {
            continue;
        };
        sums[lu.index()] += k * count;
        cells[lu.index()] += count;
    }

    let mut out = [0.0; NLU];
    for i in 0..NLU {
        if cells[i] > 0.0 {
            out[i] = sums[i] / cells[i];
        }
    }
    out
}

/// LS factor of each rural land use. Land uses without streams of their
/// own take the basin-wide slope length.
fn ls_factors(
    avg_slope: f64,
    area_ha: &[f64; NLU],
    lu_streams: &[f64; NLU],
    basin_m2: f64,
    basin_stream_m: f64,
) -> [f64; NLU] {
    let basin_length = calcs::slope_length(basin_m2, basin_stream_m);
    let mut out = [0.0; NLU];

    for lu in LandUse::ALL.iter().filter(|lu| !lu.is_urban()) {
        let i = lu.index();
        if area_ha[i] <= 0.0 {
            continue;
        }
        let length = if lu_streams[i] > 0.0 {
            calcs::slope_length(area_ha[i] * SQ_M_PER_HA, lu_streams[i])
        } else {
            basin_length
        };
        out[i] = calcs::ls_factor(avg_slope, length);
    }
    out
}

/// Agricultural area (ha) steeper than 3%.
fn ag_steep_area(nlcd_slope: &BTreeMap<(i64, i64), f64>, cell_m2: f64) -> f64 {
    nlcd_slope
        .iter()
        .filter(|((nlcd, steep), _)| {
            *steep != 0 && LandUse::from_nlcd(*nlcd).is_some_and(|lu| lu.is_agricultural())
        })
        .map(|(_, cells)| cells * cell_m2 / SQ_M_PER_HA)
        .sum()
}

/// Data models of a watershed and each of its sub-basins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatershedModels {
    #[serde(rename = "Watershed")]
    pub watershed: DataModel,
    #[serde(rename = "SubBasins")]
    pub sub_basins: BTreeMap<String, DataModel>,
}

/// One area to assemble, with its ancillary data.
#[derive(Debug, Clone)]
pub struct AreaInput {
    pub area: AreaDescriptor,
    pub ancillary: Ancillary,
}

impl AreaInput {
    fn stats<'a>(&self, parsed: &'a ParsedLayers) -> AssemblyResult<&'a LayerStats> {
        let key = self.area.result_key();
        parsed
            .get(&key)
            .ok_or_else(|| AssemblyError::MissingLayer(format!("all layers of {}", key)))
    }

    /// Name of the sub-basin in the output.
    fn name(&self) -> String {
        self.area
            .watershed_member_id
            .clone()
            .unwrap_or_else(|| self.area.id.to_string())
    }
}

/// Assemble one model for a single area from its parsed layers.
#[instrument(skip_all, fields(area = %input.area.id))]
pub fn assemble_area(input: &AreaInput, parsed: &ParsedLayers) -> AssemblyResult<DataModel> {
    let geometry = input.area.parsed_geometry()?;
    assemble(input.stats(parsed)?, &geometry, &input.ancillary)
}

/// Assemble every sub-basin, then the whole watershed from the combined
/// sub-basin statistics.
#[instrument(skip_all, fields(watershed = %watershed.area.id, sub_basins = sub_basins.len()))]
pub fn assemble_watershed(
    watershed: &AreaInput,
    sub_basins: &[AreaInput],
    parsed: &ParsedLayers,
) -> AssemblyResult<WatershedModels> {
    if sub_basins.is_empty() {
        return Err(AssemblyError::InvalidInput(
            "watershed has no sub-basins".to_string(),
        ));
    }

    let mut all_stats = Vec::with_capacity(sub_basins.len());
    let mut models = BTreeMap::new();

    for input in sub_basins {
        let stats = input.stats(parsed)?;
        let geometry = input.area.parsed_geometry()?;
        models.insert(input.name(), assemble(stats, &geometry, &input.ancillary)?);
        all_stats.push(stats);
    }

    let combined = LayerStats::combine(all_stats);
    let geometry = watershed.area.parsed_geometry()?;
    let whole = assemble(&combined, &geometry, &watershed.ancillary)?;

    info!(
        sub_basins = models.len(),
        total_area_ha = whole.total_area,
        "Assembled watershed"
    );

    Ok(WatershedModels {
        watershed: whole,
        sub_basins: models,
    })
}
