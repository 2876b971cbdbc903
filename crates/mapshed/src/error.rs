//! Error types for model assembly.

use thiserror::Error;

use geop_common::GeopError;

/// Result type alias using AssemblyError.
pub type AssemblyResult<T> = Result<T, AssemblyError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    /// Total land-use area is zero; nothing meaningful can be simulated.
    #[error("No land cover data found in the area of interest")]
    NoLandCover,

    #[error("Missing geoprocessing result for '{0}'")]
    MissingLayer(String),

    #[error("Invalid assembly input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Geoprocessing(#[from] GeopError),
}

impl From<AssemblyError> for GeopError {
    fn from(err: AssemblyError) -> Self {
        match err {
            AssemblyError::NoLandCover => GeopError::NoLandCover,
            AssemblyError::Geoprocessing(e) => e,
            other => GeopError::Assembly(other.to_string()),
        }
    }
}
