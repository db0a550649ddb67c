//! Core data model shared across the pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Geometries travel through the pipeline as GeoJSON values; geometric math
/// is always delegated to the external spatial engine.
pub type GeoJson = serde_json::Value;

/// Caller roles. Resolved from a credential fingerprint, never from the raw
/// credential itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Public,
    Member,
    Elevated,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Public => "public",
            Role::Member => "member",
            Role::Elevated => "elevated",
            Role::Admin => "admin",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "public" => Some(Role::Public),
            "member" => Some(Role::Member),
            "elevated" => Some(Role::Elevated),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The closed set of operations the pipeline will ever execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationName {
    Buffer,
    Area,
    Intersection,
    NearestNeighbors,
    TransformCrs,
}

impl OperationName {
    pub const ALL: [OperationName; 5] = [
        OperationName::Buffer,
        OperationName::Area,
        OperationName::Intersection,
        OperationName::NearestNeighbors,
        OperationName::TransformCrs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationName::Buffer => "buffer",
            OperationName::Area => "area",
            OperationName::Intersection => "intersection",
            OperationName::NearestNeighbors => "nearest-neighbors",
            OperationName::TransformCrs => "transform-crs",
        }
    }

    /// Parse an operation name. Accepts the canonical kebab-case names plus
    /// the underscore spellings used by older clients.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "buffer" => Some(OperationName::Buffer),
            "area" | "calculate_area" => Some(OperationName::Area),
            "intersection" | "find_intersections" => Some(OperationName::Intersection),
            "nearest-neighbors" | "nearest_neighbors" => Some(OperationName::NearestNeighbors),
            "transform-crs" | "transform_crs" => Some(OperationName::TransformCrs),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse sensitivity classification attached by the intent resolver.
/// Informational metadata only; no enforcement hangs off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityTag {
    Public,
    Sensitive,
    Sacred,
}

/// Whether a result's inputs and derivation were fully confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Verified,
    Unverified,
}

/// Provenance reference attached to results and audit records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Identifier of the engine that produced the result.
    pub engine: String,
    /// Dataset references consulted, if any.
    pub datasets: Vec<String>,
}

/// One ranked neighbor from a nearest-neighbors query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborFeature {
    pub id: String,
    pub geometry: Option<GeoJson>,
    pub distance_meters: Option<f64>,
}

/// Payload of a completed operation.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResultValue {
    Geometry(GeoJson),
    Scalar(f64),
    Features(Vec<NeighborFeature>),
}

/// Immutable outcome of one executed operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub value: ResultValue,
    pub unit: Option<String>,
    pub crs_used: i32,
    /// Engine round-trip latency in milliseconds.
    pub engine_latency_ms: u64,
}

impl OperationResult {
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.engine_latency_ms = latency.as_millis().min(u64::MAX as u128) as u64;
        self
    }
}

/// Inbound request, protocol-agnostic. Either `operation` (structured path)
/// or `prompt` (natural-language path) must be present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    pub prompt: Option<String>,
    pub operation: Option<String>,
    pub geometry: Option<GeoJson>,
    pub geometry_b: Option<GeoJson>,
    pub dataset: Option<String>,
    pub limit: Option<i64>,
    pub distance: Option<f64>,
    pub units: Option<String>,
    pub srid: Option<i32>,
    pub from_epsg: Option<i32>,
    pub to_epsg: Option<i32>,
    /// Opaque credential; fingerprinted on arrival, never stored.
    pub credential: Option<String>,
    /// Network origin, used as the rate-limit key for anonymous callers.
    pub origin: Option<String>,
}

/// Machine-readable error object on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

/// Response assembled by the kernel for every request.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub request_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<OperationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_status: Option<VerificationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Snapshot of kernel internals for liveness probes.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub pool_size: usize,
    pub pool_available: usize,
    pub rate_limit_enabled: bool,
    pub planner_enabled: bool,
}
