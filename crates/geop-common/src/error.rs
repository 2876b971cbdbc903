//! Error types for geoprocessing and model assembly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using GeopError.
pub type GeopResult<T> = Result<T, GeopError>;

/// Primary error type for the geoprocessing pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeopError {
    // === Engine Errors ===
    #[error("service unreachable")]
    ServiceUnreachable,

    #[error("Geoprocessing Error. Details: {0}")]
    Engine(String),

    #[error("Malformed geoprocessing result: {0}")]
    MalformedResult(String),

    // === Configuration Errors ===
    #[error("Unknown geoprocessing operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid layer override '{token}': not a known layer token")]
    InvalidLayerOverride { token: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    // === Domain Errors ===
    #[error("No land cover data found in the area of interest")]
    NoLandCover,

    #[error("Model assembly failed: {0}")]
    Assembly(String),

    // === Infrastructure Errors ===
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Job store error: {0}")]
    JobStore(String),

    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GeopError {
    /// Stable, machine-readable kind for logs and job records.
    pub fn kind(&self) -> &'static str {
        match self {
            GeopError::ServiceUnreachable => "service_unreachable",
            GeopError::Engine(_) => "engine",
            GeopError::MalformedResult(_) => "malformed_result",
            GeopError::UnknownOperation(_) => "unknown_operation",
            GeopError::InvalidLayerOverride { .. } => "invalid_layer_override",
            GeopError::Config(_) => "config",
            GeopError::InvalidGeometry(_) => "invalid_geometry",
            GeopError::NoLandCover => "no_land_cover",
            GeopError::Assembly(_) => "assembly",
            GeopError::Cache(_) => "cache",
            GeopError::JobStore(_) => "job_store",
            GeopError::Simulation(_) => "simulation",
            GeopError::Internal(_) => "internal",
        }
    }

    /// Whether the failure is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GeopError::ServiceUnreachable)
    }

    /// Programmer or configuration errors that must never be retried.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            GeopError::UnknownOperation(_)
                | GeopError::InvalidLayerOverride { .. }
                | GeopError::Config(_)
        )
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::from(self)
    }
}

impl From<serde_json::Error> for GeopError {
    fn from(err: serde_json::Error) -> Self {
        GeopError::MalformedResult(format!("JSON error: {}", err))
    }
}

/// The `{"error": "..."}` form an error takes once it leaves the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: None,
        }
    }
}

impl From<&GeopError> for ErrorEnvelope {
    fn from(err: &GeopError) -> Self {
        Self {
            error: err.to_string(),
            kind: Some(err.kind().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_message() {
        let err = GeopError::ServiceUnreachable;
        assert_eq!(err.to_string(), "service unreachable");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_no_land_cover_is_distinct() {
        let err = GeopError::NoLandCover;
        assert_eq!(err.kind(), "no_land_cover");
        assert!(!err.is_retryable());
        assert_ne!(err.kind(), GeopError::Engine("boom".into()).kind());
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = GeopError::UnknownOperation("bogus".into()).to_envelope();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"], "Unknown geoprocessing operation: bogus");
        assert_eq!(json["kind"], "unknown_operation");

        let bare: ErrorEnvelope = serde_json::from_str(r#"{"error": "x"}"#).unwrap();
        assert_eq!(bare, ErrorEnvelope::new("x"));
    }

    #[test]
    fn test_config_errors() {
        assert!(GeopError::InvalidLayerOverride { token: "__X__".into() }.is_config_error());
        assert!(!GeopError::ServiceUnreachable.is_config_error());
    }
}
