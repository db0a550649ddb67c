//! Boundary to the external spatial engine.
//!
//! The engine is a black box exposing geometry primitives over a
//! connection-oriented protocol; the pipeline never reimplements them. One
//! [`SpatialEngine`] value wraps one live connection and is never shared
//! between two in-flight handler calls; the bounded [`pool`] hands them out.

pub mod pool;
pub mod postgis;

use async_trait::async_trait;

use crate::errors::GovResult;
use crate::types::{GeoJson, NeighborFeature};

/// One live connection to the spatial engine.
#[async_trait]
pub trait SpatialEngine: Send {
    /// Geodesic buffer of `distance_meters` around the geometry, computed on
    /// the ellipsoidal surface. Result is in the input SRID.
    async fn buffer(
        &mut self,
        geometry: &GeoJson,
        distance_meters: f64,
        srid: i32,
    ) -> GovResult<GeoJson>;

    /// Geodesic area in square meters.
    async fn area_square_meters(&mut self, geometry: &GeoJson, srid: i32) -> GovResult<f64>;

    /// Set intersection of two geometries in a common CRS. `None` when the
    /// geometries do not overlap.
    async fn intersection(
        &mut self,
        geometry_a: &GeoJson,
        geometry_b: &GeoJson,
        srid: i32,
    ) -> GovResult<Option<GeoJson>>;

    /// Nearest features from `dataset`, ranked by true distance after both
    /// the query geometry and the candidates are brought into one common CRS.
    async fn nearest_neighbors(
        &mut self,
        geometry: &GeoJson,
        dataset: &str,
        limit: i64,
        srid: i32,
    ) -> GovResult<Vec<NeighborFeature>>;

    /// Explicit reprojection between two registered CRS codes.
    async fn transform(
        &mut self,
        geometry: &GeoJson,
        from_epsg: i32,
        to_epsg: i32,
    ) -> GovResult<GeoJson>;

    /// Stable identifier used in provenance evidence.
    fn engine_id(&self) -> &str;
}

/// Factory for engine connections, injected into the pool so tests can
/// supply fakes.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(&self) -> GovResult<Box<dyn SpatialEngine>>;
}

pub use pool::{EnginePool, PooledEngine};
pub use postgis::{PostgisConnector, PostgisEngine};
