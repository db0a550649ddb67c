//! Untrusted operation candidates.
//!
//! A candidate is the not-yet-validated shape produced by either inbound
//! path: deserialized from a structured request, or parsed out of planner
//! output. Unknown fields are dropped at deserialization; nothing in a
//! candidate is trusted until the registry validates it.

use serde::Deserialize;

use crate::errors::{GovError, GovResult};
use crate::types::{GeoJson, QueryRequest};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationCandidate {
    pub operation: Option<String>,
    pub geometry: Option<GeoJson>,
    pub geometry_b: Option<GeoJson>,
    /// Candidate set reference for nearest-neighbors. `table` accepted as
    /// the legacy spelling.
    #[serde(alias = "table")]
    pub dataset: Option<String>,
    pub limit: Option<i64>,
    pub distance: Option<f64>,
    pub units: Option<String>,
    pub srid: Option<i32>,
    pub from_epsg: Option<i32>,
    pub to_epsg: Option<i32>,
}

impl OperationCandidate {
    /// Deserialize a candidate from a raw JSON value. Type mismatches
    /// surface as validation errors specific enough to fix the input.
    pub fn from_value(value: serde_json::Value) -> GovResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| GovError::Validation(format!("malformed operation object: {}", e)))
    }

    /// Build a candidate from the structured fields of an inbound request.
    pub fn from_request(request: &QueryRequest) -> Self {
        Self {
            operation: request.operation.clone(),
            geometry: request.geometry.clone(),
            geometry_b: request.geometry_b.clone(),
            dataset: request.dataset.clone(),
            limit: request.limit,
            distance: request.distance,
            units: request.units.clone(),
            srid: request.srid,
            from_epsg: request.from_epsg,
            to_epsg: request.to_epsg,
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        match name {
            "geometry" => self.geometry.is_some(),
            "geometry_b" => self.geometry_b.is_some(),
            "dataset" => self.dataset.is_some(),
            "limit" => self.limit.is_some(),
            "distance" => self.distance.is_some(),
            "units" => self.units.is_some(),
            "from_epsg" => self.from_epsg.is_some(),
            "to_epsg" => self.to_epsg.is_some(),
            _ => false,
        }
    }
}
