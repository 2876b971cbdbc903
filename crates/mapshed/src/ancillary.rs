//! Ancillary inputs looked up from the geometry database: weather
//! stations, animal populations and point-source discharges.

use async_trait::async_trait;
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use geop_common::{AreaDescriptor, GeopResult};

use crate::calcs::days_in_months;
use crate::error::{AssemblyError, AssemblyResult};

/// Number of nearest weather stations averaged per area.
pub const DEFAULT_STATION_COUNT: usize = 2;

/// Cubic meters per million gallons.
const M3_PER_MG: f64 = 3785.41178;

/// Daily series recorded at one weather station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationWeather {
    pub station: String,
    /// Date of the first value in each series.
    pub start: NaiveDate,
    /// Daily precipitation (cm).
    pub precipitation: Vec<f64>,
    /// Daily mean temperature (°C).
    pub temperature: Vec<f64>,
}

impl StationWeather {
    fn days(&self) -> usize {
        self.precipitation.len().min(self.temperature.len())
    }

    /// First and last complete calendar years covered.
    fn full_years(&self) -> Option<(i32, i32)> {
        let days = self.days() as u64;
        if days == 0 {
            return None;
        }
        let end = self.start.checked_add_days(Days::new(days - 1))?;

        let first = if self.start.ordinal() == 1 {
            self.start.year()
        } else {
            self.start.year() + 1
        };
        let last = if end.month() == 12 && end.day() == 31 {
            end.year()
        } else {
            end.year() - 1
        };

        (first <= last).then_some((first, last))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Animal {
    Beef,
    Dairy,
    Broilers,
    Layers,
    Hogs,
    Sheep,
    Horses,
    Turkeys,
}

impl Animal {
    /// Live weight (lb) of one animal.
    pub fn live_weight_lb(self) -> f64 {
        match self {
            Animal::Beef => 1000.0,
            Animal::Dairy => 1400.0,
            Animal::Broilers => 2.0,
            Animal::Layers => 4.0,
            Animal::Hogs => 200.0,
            Animal::Sheep => 100.0,
            Animal::Horses => 1000.0,
            Animal::Turkeys => 12.0,
        }
    }

    pub fn is_grazing(self) -> bool {
        matches!(
            self,
            Animal::Beef | Animal::Dairy | Animal::Sheep | Animal::Horses
        )
    }
}

/// Head counts by animal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnimalPopulation(pub BTreeMap<Animal, f64>);

impl AnimalPopulation {
    /// Animal units (1000 lb of live weight) of grazing animals, then of
    /// the rest.
    pub fn animal_units(&self) -> (f64, f64) {
        let mut grazing = 0.0;
        let mut non_grazing = 0.0;
        for (animal, count) in &self.0 {
            let units = count * animal.live_weight_lb() / 1000.0;
            if animal.is_grazing() {
                grazing += units;
            } else {
                non_grazing += units;
            }
        }
        (grazing, non_grazing)
    }
}

/// A permitted discharge inside the area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSource {
    pub npdes_id: String,
    /// Nitrogen load (kg/yr).
    pub kgn_yr: f64,
    /// Phosphorus load (kg/yr).
    pub kgp_yr: f64,
    /// Discharge (million gallons per day).
    pub mgd: f64,
}

/// Monthly point-source loads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLoads {
    pub count: usize,
    pub nitrogen: [f64; 12],
    pub phosphorus: [f64; 12],
    /// Discharge as depth over the area (cm).
    pub flow: [f64; 12],
}

/// Spread annual point-source loads over the months. Flow is converted to
/// a depth over `area_m2`.
pub fn point_loads(sources: &[PointSource], area_m2: f64) -> PointLoads {
    // Any non-leap year.
    let month_days = days_in_months(2001);
    let kgn: f64 = sources.iter().map(|s| s.kgn_yr).sum();
    let kgp: f64 = sources.iter().map(|s| s.kgp_yr).sum();
    let mgd: f64 = sources.iter().map(|s| s.mgd).sum();

    let mut loads = PointLoads {
        count: sources.len(),
        nitrogen: [kgn / 12.0; 12],
        phosphorus: [kgp / 12.0; 12],
        flow: [0.0; 12],
    };
    if area_m2 > 0.0 {
        for (month, days) in month_days.iter().enumerate() {
            loads.flow[month] = mgd * M3_PER_MG * f64::from(*days) / area_m2 * 100.0;
        }
    }
    loads
}

/// Station series averaged over the years every station covers in full.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSeries {
    pub first_year: i32,
    pub last_year: i32,
    pub precipitation: Vec<f64>,
    pub temperature: Vec<f64>,
    /// Mean temperature (°C) of each calendar month.
    pub monthly_temperature: [f64; 12],
}

impl WeatherSeries {
    pub fn years(&self) -> usize {
        (self.last_year - self.first_year + 1) as usize
    }
}

/// Average stations day by day over their common full years.
///
/// Returns `None` when there are no stations.
pub fn average_weather(stations: &[StationWeather]) -> AssemblyResult<Option<WeatherSeries>> {
    if stations.is_empty() {
        return Ok(None);
    }

    let mut first_year = i32::MIN;
    let mut last_year = i32::MAX;
    for station in stations {
        let (first, last) = station.full_years().ok_or_else(|| {
            AssemblyError::InvalidInput(format!(
                "station {} has no complete year of weather",
                station.station
            ))
        })?;
        first_year = first_year.max(first);
        last_year = last_year.min(last);
    }
    if first_year > last_year {
        return Err(AssemblyError::InvalidInput(
            "weather stations share no complete year".to_string(),
        ));
    }

    let from = year_start(first_year)?;
    let days = (year_start(last_year + 1)? - from).num_days() as usize;

    let mut precipitation = vec![0.0; days];
    let mut temperature = vec![0.0; days];
    for station in stations {
        let offset = (from - station.start).num_days() as usize;
        for day in 0..days {
            precipitation[day] += station.precipitation[offset + day];
            temperature[day] += station.temperature[offset + day];
        }
    }
    let n = stations.len() as f64;
    precipitation.iter_mut().for_each(|v| *v /= n);
    temperature.iter_mut().for_each(|v| *v /= n);

    let mut sums = [0.0; 12];
    let mut counts = [0usize; 12];
    for (date, temp) in from.iter_days().zip(&temperature) {
        let month = date.month0() as usize;
        sums[month] += temp;
        counts[month] += 1;
    }
    let mut monthly_temperature = [0.0; 12];
    for month in 0..12 {
        if counts[month] > 0 {
            monthly_temperature[month] = sums[month] / counts[month] as f64;
        }
    }

    debug!(
        stations = stations.len(),
        first_year, last_year, "Averaged weather stations"
    );

    Ok(Some(WeatherSeries {
        first_year,
        last_year,
        precipitation,
        temperature,
        monthly_temperature,
    }))
}

fn year_start(year: i32) -> AssemblyResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| AssemblyError::InvalidInput(format!("year {} out of range", year)))
}

/// Everything besides geoprocessing results that assembly needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ancillary {
    pub weather: Vec<StationWeather>,
    pub animals: AnimalPopulation,
    pub point_sources: Vec<PointSource>,
}

/// Read access to the geometry database.
#[async_trait]
pub trait AncillarySource: Send + Sync {
    /// The `limit` stations nearest the shape, with their series.
    async fn weather_stations(&self, geometry: &Value, limit: usize)
        -> GeopResult<Vec<StationWeather>>;

    async fn animals(&self, geometry: &Value) -> GeopResult<AnimalPopulation>;

    async fn point_sources(&self, geometry: &Value) -> GeopResult<Vec<PointSource>>;
}

/// Look up all ancillary inputs for one area.
pub async fn gather_ancillary(
    source: &dyn AncillarySource,
    area: &AreaDescriptor,
    stations: usize,
) -> GeopResult<Ancillary> {
    let (weather, animals, point_sources) = futures::try_join!(
        source.weather_stations(&area.geometry, stations),
        source.animals(&area.geometry),
        source.point_sources(&area.geometry),
    )?;

    if weather.is_empty() {
        warn!(area = %area.id, "No weather stations found; using the default growing season");
    }

    Ok(Ancillary {
        weather,
        animals,
        point_sources,
    })
}

/// A fixed set of ancillary data returned for every shape.
///
/// Used for single-process runs and tests, where no geometry database is
/// available.
#[derive(Debug, Clone, Default)]
pub struct StaticAncillary {
    data: Ancillary,
}

impl StaticAncillary {
    pub fn new(data: Ancillary) -> Self {
        Self { data }
    }
}

#[async_trait]
impl AncillarySource for StaticAncillary {
    async fn weather_stations(
        &self,
        _geometry: &Value,
        limit: usize,
    ) -> GeopResult<Vec<StationWeather>> {
        Ok(self.data.weather.iter().take(limit).cloned().collect())
    }

    async fn animals(&self, _geometry: &Value) -> GeopResult<AnimalPopulation> {
        Ok(self.data.animals.clone())
    }

    async fn point_sources(&self, _geometry: &Value) -> GeopResult<Vec<PointSource>> {
        Ok(self.data.point_sources.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{assert_approx_eq, constant_series};

    fn station(name: &str, start: (i32, u32, u32), days: usize, prec: f64, temp: f64) -> StationWeather {
        StationWeather {
            station: name.to_string(),
            start: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            precipitation: constant_series(days, prec),
            temperature: constant_series(days, temp),
        }
    }

    #[test]
    fn test_full_years() {
        assert_eq!(station("a", (2000, 1, 1), 366, 0.0, 0.0).full_years(), Some((2000, 2000)));
        assert_eq!(station("b", (2000, 1, 2), 366, 0.0, 0.0).full_years(), None);
        assert_eq!(station("c", (1999, 7, 1), 1000, 0.0, 0.0).full_years(), Some((2000, 2001)));
    }

    #[test]
    fn test_average_over_common_years() {
        // 2000-2002 and 2001-2003 overlap on 2001-2002.
        let a = station("a", (2000, 1, 1), 366 + 365 + 365, 1.0, 10.0);
        let b = station("b", (2001, 1, 1), 365 * 3, 3.0, 20.0);

        let series = average_weather(&[a, b]).unwrap().unwrap();

        assert_eq!((series.first_year, series.last_year), (2001, 2002));
        assert_eq!(series.years(), 2);
        assert_eq!(series.precipitation.len(), 730);
        assert!(series.precipitation.iter().all(|p| *p == 2.0));
        assert_approx_eq!(series.monthly_temperature[6], 15.0, 1e-12);
    }

    #[test]
    fn test_no_stations() {
        assert_eq!(average_weather(&[]).unwrap(), None);
    }

    #[test]
    fn test_disjoint_stations() {
        let a = station("a", (2000, 1, 1), 366, 1.0, 1.0);
        let b = station("b", (2005, 1, 1), 365, 1.0, 1.0);
        assert!(matches!(
            average_weather(&[a, b]),
            Err(AssemblyError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_animal_units() {
        let population = AnimalPopulation(BTreeMap::from([
            (Animal::Dairy, 100.0),
            (Animal::Sheep, 50.0),
            (Animal::Broilers, 10_000.0),
        ]));
        let (grazing, non_grazing) = population.animal_units();
        assert_approx_eq!(grazing, 140.0 + 5.0, 1e-12);
        assert_approx_eq!(non_grazing, 20.0, 1e-12);
    }

    #[test]
    fn test_point_loads() {
        let sources = vec![
            PointSource {
                npdes_id: "PA0000001".into(),
                kgn_yr: 1200.0,
                kgp_yr: 120.0,
                mgd: 1.0,
            },
            PointSource {
                npdes_id: "PA0000002".into(),
                kgn_yr: 0.0,
                kgp_yr: 0.0,
                mgd: 1.0,
            },
        ];
        let loads = point_loads(&sources, 1.0e6);

        assert_eq!(loads.count, 2);
        assert_eq!(loads.nitrogen[0], 100.0);
        assert_eq!(loads.phosphorus[11], 10.0);
        assert_approx_eq!(loads.flow[0], 2.0 * M3_PER_MG * 31.0 / 1.0e6 * 100.0, 1e-9);
        assert!(loads.flow[1] < loads.flow[0]);
    }

    #[tokio::test]
    async fn test_static_source_limits_stations() {
        let source = StaticAncillary::new(Ancillary {
            weather: vec![
                station("a", (2000, 1, 1), 366, 0.0, 0.0),
                station("b", (2000, 1, 1), 366, 0.0, 0.0),
                station("c", (2000, 1, 1), 366, 0.0, 0.0),
            ],
            ..Default::default()
        });
        let area = AreaDescriptor::uncached(test_utils::pa_square());

        let ancillary = gather_ancillary(&source, &area, DEFAULT_STATION_COUNT)
            .await
            .unwrap();
        assert_eq!(ancillary.weather.len(), 2);
    }
}
