//! Common types and utilities shared across the geoprocessing and MapShed crates.

pub mod area;
pub mod error;
pub mod geometry;

pub use area::{ensure_distinct_keys, AreaDescriptor, AreaId};
pub use error::{ErrorEnvelope, GeopError, GeopResult};
pub use geometry::{Geometry, GeometryError};
