//! MapShed model assembly.
//!
//! Turns the joined geoprocessing results of an area (or of every
//! sub-basin of a watershed) into the GWLF-E data model:
//!
//! ```text
//! PartialResultSet ─► parse_results ─► ParsedLayers ─┐
//!                                                     ├─► assemble ─► DataModel
//! AncillarySource ─► gather_ancillary ───────────────┘
//! ```

pub mod ancillary;
pub mod assemble;
pub mod calcs;
pub mod derive;
pub mod error;
pub mod landuse;
pub mod model;

pub use ancillary::{
    gather_ancillary, Ancillary, AncillarySource, Animal, AnimalPopulation, PointSource,
    StaticAncillary, StationWeather,
};
pub use assemble::{assemble, assemble_area, assemble_watershed, AreaInput, WatershedModels};
pub use derive::{parse_results, LayerStats, ParsedLayers};
pub use error::{AssemblyError, AssemblyResult};
pub use landuse::LandUse;
pub use model::DataModel;
