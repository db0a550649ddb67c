//! The closed spatial-operation table.
//!
//! Every operation the pipeline can execute is declared here, with its
//! required parameters and unit class. Both inbound paths funnel their
//! candidates through [`OperationRegistry::validate`]; the resulting
//! [`SpatialOperationRequest`] cannot be constructed any other way, which is
//! what enforces the central invariant that nothing executes unvalidated.
//!
//! Handlers are pure dispatch plus validation: the geometric math itself is
//! always delegated to the engine.

pub mod candidate;
pub mod crs;
pub mod geometry;
pub mod units;

use std::collections::HashMap;
use std::time::Instant;

pub use candidate::OperationCandidate;
pub use crs::{CrsRegistry, WGS84};

use crate::engine::SpatialEngine;
use crate::errors::{GovError, GovResult};
use crate::types::{GeoJson, OperationName, OperationResult, ResultValue, SensitivityTag};

/// Which path produced a request. Natural-language requests carry
/// model-derived parameters and are capped at `Unverified` provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    Structured,
    NaturalLanguage,
}

/// Declarative schema entry for one operation.
#[derive(Debug, Clone, Copy)]
pub struct OperationSpec {
    pub name: OperationName,
    pub required: &'static [&'static str],
    pub summary: &'static str,
}

/// A fully validated, executable operation. Constructible only through
/// [`OperationRegistry::validate`]; the private `_sealed` field keeps struct
/// literals out of other modules.
#[derive(Debug, Clone)]
pub struct SpatialOperationRequest {
    pub operation: OperationName,
    pub geometry: GeoJson,
    pub geometry_b: Option<GeoJson>,
    pub dataset: Option<String>,
    pub limit: Option<i64>,
    /// Distance converted to meters for the engine.
    pub distance_meters: Option<f64>,
    /// Normalized unit the caller asked results in.
    pub unit: Option<String>,
    pub srid: i32,
    pub from_epsg: Option<i32>,
    pub to_epsg: Option<i32>,
    pub sensitivity: SensitivityTag,
    pub origin: RequestOrigin,
    _sealed: (),
}

/// Maximum candidates a nearest-neighbors query may request.
const MAX_NEIGHBOR_LIMIT: i64 = 100;
const DEFAULT_NEIGHBOR_LIMIT: i64 = 5;

pub struct OperationRegistry {
    specs: HashMap<OperationName, OperationSpec>,
    crs: CrsRegistry,
    max_neighbor_limit: i64,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new(CrsRegistry::default())
    }
}

impl OperationRegistry {
    pub fn new(crs: CrsRegistry) -> Self {
        let entries = [
            OperationSpec {
                name: OperationName::Buffer,
                required: &["geometry", "distance"],
                summary: "geodesic buffer around a geometry",
            },
            OperationSpec {
                name: OperationName::Area,
                required: &["geometry"],
                summary: "geodesic area of a geometry",
            },
            OperationSpec {
                name: OperationName::Intersection,
                required: &["geometry", "geometry_b"],
                summary: "set intersection of two geometries",
            },
            OperationSpec {
                name: OperationName::NearestNeighbors,
                required: &["geometry", "dataset"],
                summary: "nearest features ranked by true distance",
            },
            OperationSpec {
                name: OperationName::TransformCrs,
                required: &["geometry", "from_epsg", "to_epsg"],
                summary: "reprojection between registered CRS codes",
            },
        ];
        Self {
            specs: entries.into_iter().map(|s| (s.name, s)).collect(),
            crs,
            max_neighbor_limit: MAX_NEIGHBOR_LIMIT,
        }
    }

    pub fn spec(&self, name: OperationName) -> &OperationSpec {
        // The table is total over the closed enum by construction.
        &self.specs[&name]
    }

    pub fn crs(&self) -> &CrsRegistry {
        &self.crs
    }

    /// Validate an untrusted candidate into an executable request. This is
    /// the single gate for both the structured and natural-language paths.
    pub fn validate(
        &self,
        candidate: OperationCandidate,
        origin: RequestOrigin,
        sensitivity: SensitivityTag,
    ) -> GovResult<SpatialOperationRequest> {
        let raw_operation = candidate
            .operation
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GovError::Validation("missing 'operation'".to_string()))?;

        let operation = OperationName::parse(raw_operation).ok_or_else(|| {
            let allowed: Vec<&str> = OperationName::ALL.iter().map(|o| o.as_str()).collect();
            GovError::Validation(format!(
                "unsupported operation '{}'; allowed: {}",
                raw_operation,
                allowed.join(", ")
            ))
        })?;

        let spec = self.spec(operation);
        for field in spec.required {
            if !candidate.has_field(field) {
                return Err(GovError::Validation(format!(
                    "{} requires '{}'",
                    operation, field
                )));
            }
        }

        let srid = candidate.srid.unwrap_or(WGS84);
        self.crs.ensure_known(srid)?;

        let geometry = candidate
            .geometry
            .ok_or_else(|| GovError::Validation(format!("{} requires 'geometry'", operation)))?;
        geometry::validate_geometry(&geometry)?;

        let mut request = SpatialOperationRequest {
            operation,
            geometry,
            geometry_b: None,
            dataset: None,
            limit: None,
            distance_meters: None,
            unit: None,
            srid,
            from_epsg: None,
            to_epsg: None,
            sensitivity,
            origin,
            _sealed: (),
        };

        match operation {
            OperationName::Buffer => {
                let distance = candidate.distance.ok_or_else(|| {
                    GovError::Validation("buffer requires 'distance'".to_string())
                })?;
                let unit = normalize_unit(candidate.units, units::DEFAULT_DISTANCE_UNIT);
                request.distance_meters = Some(units::distance_to_meters(distance, &unit)?);
                request.unit = Some(unit);
            }
            OperationName::Area => {
                let unit = normalize_unit(candidate.units, units::DEFAULT_AREA_UNIT);
                if !units::is_area_unit(&unit) {
                    return Err(GovError::UnsupportedUnit(unit));
                }
                request.unit = Some(unit);
            }
            OperationName::Intersection => {
                let geometry_b = candidate.geometry_b.ok_or_else(|| {
                    GovError::Validation("intersection requires 'geometry_b'".to_string())
                })?;
                geometry::validate_geometry(&geometry_b)?;
                request.geometry_b = Some(geometry_b);
            }
            OperationName::NearestNeighbors => {
                let dataset = candidate
                    .dataset
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| {
                        GovError::Validation(
                            "nearest-neighbors requires 'dataset'".to_string(),
                        )
                    })?;
                validate_dataset_name(dataset)?;
                let limit = candidate.limit.unwrap_or(DEFAULT_NEIGHBOR_LIMIT);
                if limit < 1 || limit > self.max_neighbor_limit {
                    return Err(GovError::Validation(format!(
                        "limit must be between 1 and {}",
                        self.max_neighbor_limit
                    )));
                }
                request.dataset = Some(dataset.to_string());
                request.limit = Some(limit);
                request.unit = Some(units::DEFAULT_DISTANCE_UNIT.to_string());
            }
            OperationName::TransformCrs => {
                let from_epsg = candidate.from_epsg.ok_or_else(|| {
                    GovError::Validation("transform-crs requires 'from_epsg'".to_string())
                })?;
                let to_epsg = candidate.to_epsg.ok_or_else(|| {
                    GovError::Validation("transform-crs requires 'to_epsg'".to_string())
                })?;
                self.crs.ensure_known(from_epsg)?;
                self.crs.ensure_known(to_epsg)?;
                request.from_epsg = Some(from_epsg);
                request.to_epsg = Some(to_epsg);
            }
        }

        Ok(request)
    }

    /// Dispatch a validated request to the engine and shape the result.
    pub async fn execute(
        &self,
        request: &SpatialOperationRequest,
        engine: &mut dyn SpatialEngine,
    ) -> GovResult<OperationResult> {
        let started = Instant::now();
        let result = match request.operation {
            OperationName::Buffer => {
                let meters = request
                    .distance_meters
                    .ok_or_else(|| GovError::Internal("buffer without distance".to_string()))?;
                let buffered = engine.buffer(&request.geometry, meters, request.srid).await?;
                OperationResult {
                    value: ResultValue::Geometry(buffered),
                    unit: request.unit.clone(),
                    crs_used: request.srid,
                    engine_latency_ms: 0,
                }
            }
            OperationName::Area => {
                let unit = request
                    .unit
                    .as_deref()
                    .unwrap_or(units::DEFAULT_AREA_UNIT);
                let square_meters = engine
                    .area_square_meters(&request.geometry, request.srid)
                    .await?;
                OperationResult {
                    value: ResultValue::Scalar(units::area_from_square_meters(
                        square_meters,
                        unit,
                    )?),
                    unit: request.unit.clone(),
                    crs_used: request.srid,
                    engine_latency_ms: 0,
                }
            }
            OperationName::Intersection => {
                let other = request
                    .geometry_b
                    .as_ref()
                    .ok_or_else(|| GovError::Internal("intersection without geometry_b".to_string()))?;
                let overlap = engine
                    .intersection(&request.geometry, other, request.srid)
                    .await?;
                OperationResult {
                    value: ResultValue::Geometry(overlap.unwrap_or(serde_json::Value::Null)),
                    unit: None,
                    crs_used: request.srid,
                    engine_latency_ms: 0,
                }
            }
            OperationName::NearestNeighbors => {
                let dataset = request
                    .dataset
                    .as_deref()
                    .ok_or_else(|| GovError::Internal("nearest-neighbors without dataset".to_string()))?;
                let limit = request.limit.unwrap_or(DEFAULT_NEIGHBOR_LIMIT);
                let features = engine
                    .nearest_neighbors(&request.geometry, dataset, limit, request.srid)
                    .await?;
                OperationResult {
                    value: ResultValue::Features(features),
                    unit: request.unit.clone(),
                    // Ranking happens in the common CRS regardless of input.
                    crs_used: WGS84,
                    engine_latency_ms: 0,
                }
            }
            OperationName::TransformCrs => {
                let from_epsg = request
                    .from_epsg
                    .ok_or_else(|| GovError::Internal("transform without from_epsg".to_string()))?;
                let to_epsg = request
                    .to_epsg
                    .ok_or_else(|| GovError::Internal("transform without to_epsg".to_string()))?;
                let transformed = engine
                    .transform(&request.geometry, from_epsg, to_epsg)
                    .await?;
                OperationResult {
                    value: ResultValue::Geometry(transformed),
                    unit: None,
                    crs_used: to_epsg,
                    engine_latency_ms: 0,
                }
            }
        };
        Ok(result.with_latency(started.elapsed()))
    }
}

fn normalize_unit(unit: Option<String>, default: &str) -> String {
    unit.map(|u| u.trim().to_lowercase())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Dataset references must be plain or schema-qualified SQL identifiers;
/// anything else never reaches the engine.
fn validate_dataset_name(name: &str) -> GovResult<()> {
    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() > 2 {
        return Err(GovError::Validation(
            "dataset must be 'name' or 'schema.name'".to_string(),
        ));
    }
    for segment in segments {
        let mut chars = segment.chars();
        let valid_head = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        let valid_tail = segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_head || !valid_tail || segment.len() > 64 {
            return Err(GovError::Validation(format!(
                "invalid dataset reference '{}'",
                name
            )));
        }
    }
    Ok(())
}
