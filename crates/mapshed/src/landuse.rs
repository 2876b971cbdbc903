//! MapShed land-use buckets and the per-land-use coefficient tables.

use serde::{Deserialize, Serialize};

/// Number of land uses in a data model.
pub const NLU: usize = 16;
/// Rural land uses come first.
pub const NRUR: usize = 10;
pub const NURB: usize = NLU - NRUR;

/// NLCD code of open water, which belongs to no land use.
pub const NLCD_WATER: i64 = 11;

/// The 16 GWLF-E land uses, in model order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LandUse {
    HayPasture,
    Cropland,
    Forest,
    Wetland,
    Disturbed,
    Turfgrass,
    OpenLand,
    BareRock,
    SandyAreas,
    UnpavedRoads,
    LdMixed,
    MdMixed,
    HdMixed,
    LdResidential,
    MdResidential,
    HdResidential,
}

impl LandUse {
    pub const ALL: [LandUse; NLU] = [
        LandUse::HayPasture,
        LandUse::Cropland,
        LandUse::Forest,
        LandUse::Wetland,
        LandUse::Disturbed,
        LandUse::Turfgrass,
        LandUse::OpenLand,
        LandUse::BareRock,
        LandUse::SandyAreas,
        LandUse::UnpavedRoads,
        LandUse::LdMixed,
        LandUse::MdMixed,
        LandUse::HdMixed,
        LandUse::LdResidential,
        LandUse::MdResidential,
        LandUse::HdResidential,
    ];

    /// Position in model arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_urban(self) -> bool {
        self.index() >= NRUR
    }

    pub fn is_agricultural(self) -> bool {
        matches!(self, LandUse::HayPasture | LandUse::Cropland)
    }

    /// Bucket an NLCD class. Open water and unknown codes have none.
    pub fn from_nlcd(code: i64) -> Option<LandUse> {
        match code {
            81 => Some(LandUse::HayPasture),
            82 => Some(LandUse::Cropland),
            41 | 42 | 43 | 52 => Some(LandUse::Forest),
            90 | 95 => Some(LandUse::Wetland),
            21 | 71 => Some(LandUse::OpenLand),
            12 | 31 => Some(LandUse::BareRock),
            22 => Some(LandUse::LdMixed),
            23 => Some(LandUse::MdMixed),
            24 => Some(LandUse::HdMixed),
            _ => None,
        }
    }

    /// NLCD classes that land in this bucket.
    pub fn nlcd_codes(self) -> &'static [i64] {
        match self {
            LandUse::HayPasture => &[81],
            LandUse::Cropland => &[82],
            LandUse::Forest => &[41, 42, 43, 52],
            LandUse::Wetland => &[90, 95],
            LandUse::OpenLand => &[21, 71],
            LandUse::BareRock => &[12, 31],
            LandUse::LdMixed => &[22],
            LandUse::MdMixed => &[23],
            LandUse::HdMixed => &[24],
            _ => &[],
        }
    }

    /// Cover-management (C) factor.
    pub fn c_factor(self) -> f64 {
        match self {
            LandUse::HayPasture => 0.03,
            LandUse::Cropland => 0.42,
            LandUse::Forest => 0.002,
            LandUse::Wetland => 0.01,
            LandUse::Disturbed => 0.08,
            LandUse::Turfgrass => 0.02,
            LandUse::OpenLand => 0.04,
            LandUse::BareRock => 0.0,
            LandUse::SandyAreas => 0.04,
            LandUse::UnpavedRoads => 0.08,
            _ => 0.0,
        }
    }

    /// Support-practice (P) factor.
    pub fn p_factor(self) -> f64 {
        match self {
            LandUse::Cropland => 0.53,
            LandUse::HayPasture => 0.74,
            _ if self.is_urban() => 0.0,
            _ => 1.0,
        }
    }

    /// Evapotranspiration cover coefficients, `(growing, dormant)`.
    pub fn et_coefficients(self) -> (f64, f64) {
        match self {
            LandUse::BareRock | LandUse::SandyAreas | LandUse::UnpavedRoads => (0.3, 0.3),
            LandUse::LdMixed | LandUse::LdResidential => (0.8, 0.3),
            LandUse::MdMixed | LandUse::MdResidential => (0.5, 0.2),
            LandUse::HdMixed | LandUse::HdResidential => (0.2, 0.1),
            _ => (1.0, 0.3),
        }
    }
}

/// TR-55 curve numbers for an NLCD class by hydrologic soil group A-D.
pub fn curve_number_table(nlcd: i64) -> Option<[f64; 4]> {
    match nlcd {
        12 | 31 => Some([77.0, 86.0, 91.0, 94.0]),
        21 => Some([49.0, 69.0, 79.0, 84.0]),
        22 => Some([57.0, 72.0, 81.0, 86.0]),
        23 => Some([61.0, 75.0, 83.0, 87.0]),
        24 => Some([89.0, 92.0, 94.0, 95.0]),
        41 | 42 | 43 => Some([30.0, 55.0, 70.0, 77.0]),
        52 => Some([35.0, 56.0, 70.0, 77.0]),
        71 => Some([30.0, 58.0, 71.0, 78.0]),
        81 => Some([39.0, 61.0, 74.0, 80.0]),
        82 => Some([67.0, 78.0, 85.0, 89.0]),
        90 | 95 => Some([55.0, 70.0, 80.0, 85.0]),
        _ => None,
    }
}

/// Collapse a soil raster value to a single group 1-4 (A-D).
///
/// Dual groups (A/D, B/D, C/D) are treated as D. Anything else is no data.
pub fn simple_soil_group(value: i64) -> Option<i64> {
    match value {
        1..=4 => Some(value),
        5..=7 => Some(4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_split() {
        assert_eq!(LandUse::ALL.len(), NLU);
        for (i, lu) in LandUse::ALL.iter().enumerate() {
            assert_eq!(lu.index(), i);
        }
        assert_eq!(LandUse::ALL.iter().filter(|l| l.is_urban()).count(), NURB);
        assert!(!LandUse::UnpavedRoads.is_urban());
        assert!(LandUse::LdMixed.is_urban());
    }

    #[test]
    fn test_nlcd_buckets_are_consistent() {
        for lu in LandUse::ALL {
            for code in lu.nlcd_codes() {
                assert_eq!(LandUse::from_nlcd(*code), Some(lu));
                assert!(curve_number_table(*code).is_some());
            }
        }
        assert_eq!(LandUse::from_nlcd(NLCD_WATER), None);
    }

    #[test]
    fn test_soil_groups() {
        assert_eq!(simple_soil_group(2), Some(2));
        assert_eq!(simple_soil_group(6), Some(4));
        assert_eq!(simple_soil_group(0), None);
        assert_eq!(simple_soil_group(9), None);
    }
}
