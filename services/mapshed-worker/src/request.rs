//! Job submissions accepted from the queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use geop_common::AreaDescriptor;

/// A MapShed run over one area, or over a watershed and its sub-basins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapshedJob {
    Area {
        area: AreaDescriptor,
        #[serde(flatten)]
        options: JobOptions,
    },
    Watershed {
        watershed: AreaDescriptor,
        sub_basins: Vec<AreaDescriptor>,
        #[serde(flatten)]
        options: JobOptions,
    },
}

/// Settings shared by both request shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Layer token overrides, e.g. `{"__SOIL__": "alt-dataset"}`.
    #[serde(default)]
    pub layer_overrides: BTreeMap<String, String>,
    /// Stream lines (GeoJSON) sent with the multi request.
    #[serde(default)]
    pub stream_lines: Vec<Value>,
    /// Run the simulation on the assembled model.
    #[serde(default)]
    pub simulate: bool,
}

impl MapshedJob {
    pub fn area(area: AreaDescriptor) -> Self {
        MapshedJob::Area {
            area,
            options: JobOptions::default(),
        }
    }

    pub fn watershed(watershed: AreaDescriptor, sub_basins: Vec<AreaDescriptor>) -> Self {
        MapshedJob::Watershed {
            watershed,
            sub_basins,
            options: JobOptions::default(),
        }
    }

    pub fn options(&self) -> &JobOptions {
        match self {
            MapshedJob::Area { options, .. } | MapshedJob::Watershed { options, .. } => options,
        }
    }

    pub fn options_mut(&mut self) -> &mut JobOptions {
        match self {
            MapshedJob::Area { options, .. } | MapshedJob::Watershed { options, .. } => options,
        }
    }

    pub fn with_overrides(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.options_mut().layer_overrides = overrides;
        self
    }

    pub fn with_simulation(mut self) -> Self {
        self.options_mut().simulate = true;
        self
    }

    /// Areas whose layers are geoprocessed.
    pub fn geoprocessed_areas(&self) -> &[AreaDescriptor] {
        match self {
            MapshedJob::Area { area, .. } => std::slice::from_ref(area),
            MapshedJob::Watershed { sub_basins, .. } => sub_basins,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MapshedJob::Area { .. } => "area",
            MapshedJob::Watershed { .. } => "watershed",
        }
    }
}
