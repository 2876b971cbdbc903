//! Derived-value formulas for the data model.
//!
//! Everything here is pure: histograms and scalars in, model values out.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::landuse::{curve_number_table, simple_soil_group, LandUse, NLU};

/// Scaling applied to the monthly ET cover coefficients.
pub const KV_FACTOR: f64 = 1.16;

/// Floor on groundwater nitrogen concentration (mg/l).
pub const MIN_GR_NITR_CONC: f64 = 0.27;

/// Mean monthly temperature (°C) above which a month counts as growing.
pub const GROWING_TEMP_C: f64 = 10.0;

/// Growing months used when no weather is available: April to September.
pub const DEFAULT_GROWING_SEASON: [bool; 12] = [
    false, false, false, true, true, true, true, true, true, false, false, false,
];

/// Day of year at the middle of each month.
const MID_MONTH_DOY: [f64; 12] = [
    15.0, 46.0, 74.0, 105.0, 135.0, 166.0, 196.0, 227.0, 258.0, 288.0, 319.0, 349.0,
];

/// Per-land-use sums of an NLCD-keyed histogram.
pub fn land_use_totals(by_nlcd: &BTreeMap<i64, f64>) -> [f64; NLU] {
    let mut totals = [0.0; NLU];
    for (code, value) in by_nlcd {
        if let Some(lu) = LandUse::from_nlcd(*code) {
            totals[lu.index()] += value;
        }
    }
    totals
}

/// Curve number per land use from an (NLCD, soil group) cell histogram.
///
/// For each NLCD class the cell-weighted mean soil group is rounded to the
/// nearest group and looked up in the curve number table. A land use takes
/// the plain mean over its NLCD classes that have a non-zero curve number.
pub fn curve_numbers(nlcd_soil: &BTreeMap<(i64, i64), f64>) -> [f64; NLU] {
    // NLCD class -> (sum of group * cells, cells)
    let mut weighted: BTreeMap<i64, (f64, f64)> = BTreeMap::new();
    for (&(nlcd, soil), &cells) in nlcd_soil {
        if let Some(group) = simple_soil_group(soil) {
            let entry = weighted.entry(nlcd).or_insert((0.0, 0.0));
            entry.0 += group as f64 * cells;
            entry.1 += cells;
        }
    }

    let mut sums = [0.0; NLU];
    let mut counts = [0usize; NLU];
    for (nlcd, (group_sum, cells)) in weighted {
        if cells <= 0.0 {
            continue;
        }
        let (Some(lu), Some(table)) = (LandUse::from_nlcd(nlcd), curve_number_table(nlcd)) else {
            continue;
        };

        let group = (group_sum / cells).round().clamp(1.0, 4.0) as usize;
        let cn = table[group - 1];
        if cn > 0.0 {
            sums[lu.index()] += cn;
            counts[lu.index()] += 1;
        }
    }

    let mut out = [0.0; NLU];
    for i in 0..NLU {
        if counts[i] > 0 {
            out[i] = sums[i] / counts[i] as f64;
        }
    }
    out
}

/// Sediment delivery ratio for a basin of `area_sq_km`.
pub fn sediment_delivery_ratio(area_sq_km: f64) -> f64 {
    if area_sq_km < 50.0 {
        0.000005 * area_sq_km.powi(2) - 0.0014 * area_sq_km + 0.198
    } else {
        0.451 * area_sq_km.powf(-0.298)
    }
}

/// Monthly ET cover coefficients.
///
/// Each month is the area-weighted sum of the land uses' growing or dormant
/// coefficient, averaged with the previous month's raw value (January
/// stands alone), then scaled by [`KV_FACTOR`].
pub fn kv_coefficients(areas: &[f64; NLU], growing: &[bool; 12]) -> [f64; 12] {
    let total: f64 = areas.iter().sum();
    let mut raw = [0.0; 12];

    if total > 0.0 {
        for (month, is_growing) in growing.iter().enumerate() {
            raw[month] = LandUse::ALL
                .iter()
                .map(|lu| {
                    let (grow, dormant) = lu.et_coefficients();
                    let coef = if *is_growing { grow } else { dormant };
                    coef * areas[lu.index()] / total
                })
                .sum();
        }
    }

    let mut kv = [0.0; 12];
    for month in 0..12 {
        let smoothed = if month == 0 {
            raw[0]
        } else {
            (raw[month] + raw[month - 1]) / 2.0
        };
        kv[month] = smoothed * KV_FACTOR;
    }
    kv
}

/// Cell-count-weighted mean of a value histogram.
pub fn weighted_average(histogram: &BTreeMap<i64, f64>) -> f64 {
    let cells: f64 = histogram.values().sum();
    if cells <= 0.0 {
        return 0.0;
    }
    histogram.iter().map(|(v, c)| *v as f64 * c).sum::<f64>() / cells
}

/// Groundwater nitrogen concentration (mg/l) from the mean groundwater
/// nitrogen raster value.
pub fn groundwater_nitrogen_conc(avg_gwn: f64) -> f64 {
    (0.7973 * avg_gwn - 0.692).max(MIN_GR_NITR_CONC)
}

/// Groundwater phosphorus concentration (mg/l).
pub fn groundwater_phosphorus_conc(avg_gwn: f64) -> f64 {
    0.0049 * avg_gwn + 0.0089
}

/// Hours of daylight at the middle of each month at `lat_deg`.
pub fn day_lengths(lat_deg: f64) -> [f64; 12] {
    let phi = lat_deg.to_radians();
    let mut hours = [0.0; 12];

    for (month, doy) in MID_MONTH_DOY.iter().enumerate() {
        let declination = 0.4093 * (2.0 * PI * doy / 365.0 - 1.405).sin();
        let x = (-phi.tan() * declination.tan()).clamp(-1.0, 1.0);
        hours[month] = 24.0 / PI * x.acos();
    }
    hours
}

/// Growing months from mean monthly temperatures.
pub fn growing_season(monthly_temp_c: &[f64; 12]) -> [bool; 12] {
    let mut grow = [false; 12];
    for (month, temp) in monthly_temp_c.iter().enumerate() {
        grow[month] = *temp > GROWING_TEMP_C;
    }
    grow
}

/// Universal Soil Loss Equation LS factor.
///
/// `slope_pct` is the average slope in percent and `slope_length_m` the
/// overland flow length.
pub fn ls_factor(slope_pct: f64, slope_length_m: f64) -> f64 {
    if slope_pct <= 0.0 || slope_length_m <= 0.0 {
        return 0.0;
    }

    let theta = (slope_pct / 100.0).atan();
    let m = if slope_pct >= 5.0 {
        0.5
    } else if slope_pct >= 3.5 {
        0.4
    } else if slope_pct >= 1.0 {
        0.3
    } else {
        0.2
    };

    (slope_length_m / 22.13).powf(m)
        * (65.41 * theta.sin().powi(2) + 4.56 * theta.sin() + 0.065)
}

/// Overland flow length (m) from drained area and stream length, half the
/// mean distance between streams, bounded to a plausible range.
pub fn slope_length(area_m2: f64, stream_length_m: f64) -> f64 {
    const DEFAULT: f64 = 100.0;
    if stream_length_m <= 0.0 || area_m2 <= 0.0 {
        return DEFAULT;
    }
    (area_m2 / (2.0 * stream_length_m)).clamp(10.0, 300.0)
}

/// Days in each month of `year`.
pub fn days_in_months(year: i32) -> [u32; 12] {
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    [
        31,
        if leap { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ]
}
