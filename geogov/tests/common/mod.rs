//! Shared fixtures for kernel integration tests: a deterministic in-memory
//! spatial engine with instrumented connection accounting, plus kernel
//! construction helpers.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use geogov::audit::MemoryAuditSink;
use geogov::config::GeoGovConfig;
use geogov::engine::{EngineConnector, SpatialEngine};
use geogov::errors::{GovError, GovResult};
use geogov::intent::StubPlanner;
use geogov::kernel::GovernanceKernel;
use geogov::security::IdentityRegistry;
use geogov::types::{GeoJson, NeighborFeature, Role};

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;
const CIRCLE_SEGMENTS: usize = 64;

/// Instrumentation shared between the connector, its engines, and the test.
#[derive(Default)]
pub struct FakeStats {
    pub connects: AtomicUsize,
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    /// Artificial per-call latency in milliseconds.
    pub sleep_ms: AtomicU64,
}

impl FakeStats {
    fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    async fn simulate_latency(&self) {
        let sleep = self.sleep_ms.load(Ordering::SeqCst);
        if sleep > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(sleep)).await;
        }
    }
}

#[derive(Clone)]
struct FakeCandidate {
    id: String,
    lon: f64,
    lat: f64,
}

/// Deterministic spatial engine: geodesic-ish math over small extents, good
/// enough to check the pipeline's invariants without PostGIS.
pub struct FakeEngine {
    stats: Arc<FakeStats>,
    datasets: HashMap<String, Vec<FakeCandidate>>,
}

fn haversine_m(a_lon: f64, a_lat: f64, b_lon: f64, b_lat: f64) -> f64 {
    let d_lat = (b_lat - a_lat).to_radians();
    let d_lon = (b_lon - a_lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a_lat.to_radians().cos() * b_lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

fn meters_per_degree_lon(lat: f64) -> f64 {
    METERS_PER_DEGREE_LAT * lat.to_radians().cos()
}

fn ring_vertices(geometry: &GeoJson) -> Option<Vec<(f64, f64)>> {
    let ring = geometry.get("coordinates")?.as_array()?.first()?.as_array()?;
    let mut vertices = Vec::with_capacity(ring.len());
    for pair in ring {
        let pair = pair.as_array()?;
        vertices.push((pair.first()?.as_f64()?, pair.get(1)?.as_f64()?));
    }
    Some(vertices)
}

fn point_coordinates(geometry: &GeoJson) -> Option<(f64, f64)> {
    let pair = geometry.get("coordinates")?.as_array()?;
    Some((pair.first()?.as_f64()?, pair.get(1)?.as_f64()?))
}

/// Center and radius covering the input geometry: the point itself for
/// points, centroid plus max vertex distance for polygons.
fn enclosing_circle(geometry: &GeoJson) -> GovResult<(f64, f64, f64)> {
    match geometry.get("type").and_then(|t| t.as_str()) {
        Some("Point") => {
            let (lon, lat) = point_coordinates(geometry)
                .ok_or_else(|| GovError::InvalidGeometry("bad point".to_string()))?;
            Ok((lon, lat, 0.0))
        }
        Some("Polygon") => {
            let mut vertices = ring_vertices(geometry)
                .ok_or_else(|| GovError::InvalidGeometry("bad polygon".to_string()))?;
            if vertices.len() > 1 {
                vertices.pop(); // closing vertex
            }
            let n = vertices.len() as f64;
            let lon = vertices.iter().map(|v| v.0).sum::<f64>() / n;
            let lat = vertices.iter().map(|v| v.1).sum::<f64>() / n;
            let radius = vertices
                .iter()
                .map(|v| haversine_m(lon, lat, v.0, v.1))
                .fold(0.0, f64::max);
            Ok((lon, lat, radius))
        }
        other => Err(GovError::InvalidGeometry(format!(
            "fake engine cannot buffer {:?}",
            other
        ))),
    }
}

fn circle_polygon(lon: f64, lat: f64, radius_m: f64) -> GeoJson {
    let m_lon = meters_per_degree_lon(lat);
    let mut ring = Vec::with_capacity(CIRCLE_SEGMENTS + 1);
    for i in 0..=CIRCLE_SEGMENTS {
        let theta = 2.0 * PI * (i as f64) / (CIRCLE_SEGMENTS as f64);
        ring.push(json!([
            lon + radius_m * theta.cos() / m_lon,
            lat + radius_m * theta.sin() / METERS_PER_DEGREE_LAT,
        ]));
    }
    json!({"type": "Polygon", "coordinates": [ring]})
}

fn shoelace_area_m2(geometry: &GeoJson) -> GovResult<f64> {
    match geometry.get("type").and_then(|t| t.as_str()) {
        Some("Point") => Ok(0.0),
        Some("Polygon") => {
            let vertices = ring_vertices(geometry)
                .ok_or_else(|| GovError::InvalidGeometry("bad polygon".to_string()))?;
            let ref_lat = vertices
                .first()
                .map(|v| v.1)
                .ok_or_else(|| GovError::InvalidGeometry("empty ring".to_string()))?;
            let m_lon = meters_per_degree_lon(ref_lat);
            let planar: Vec<(f64, f64)> = vertices
                .iter()
                .map(|(lon, lat)| (lon * m_lon, lat * METERS_PER_DEGREE_LAT))
                .collect();
            let mut doubled = 0.0;
            for window in planar.windows(2) {
                doubled += window[0].0 * window[1].1 - window[1].0 * window[0].1;
            }
            Ok(doubled.abs() / 2.0)
        }
        other => Err(GovError::InvalidGeometry(format!(
            "fake engine cannot measure {:?}",
            other
        ))),
    }
}

fn web_mercator_forward(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon * 20_037_508.34 / 180.0;
    let y = ((90.0 + lat) * PI / 360.0).tan().ln() * 20_037_508.34 / PI;
    (x, y)
}

#[async_trait]
impl SpatialEngine for FakeEngine {
    async fn buffer(
        &mut self,
        geometry: &GeoJson,
        distance_meters: f64,
        _srid: i32,
    ) -> GovResult<GeoJson> {
        self.stats.enter();
        self.stats.simulate_latency().await;
        let result = enclosing_circle(geometry)
            .map(|(lon, lat, radius)| circle_polygon(lon, lat, radius + distance_meters));
        self.stats.exit();
        result
    }

    async fn area_square_meters(&mut self, geometry: &GeoJson, _srid: i32) -> GovResult<f64> {
        self.stats.enter();
        self.stats.simulate_latency().await;
        let result = shoelace_area_m2(geometry);
        self.stats.exit();
        result
    }

    async fn intersection(
        &mut self,
        geometry_a: &GeoJson,
        geometry_b: &GeoJson,
        _srid: i32,
    ) -> GovResult<Option<GeoJson>> {
        self.stats.enter();
        self.stats.simulate_latency().await;
        let result = if geometry_a == geometry_b {
            Some(geometry_a.clone())
        } else {
            None
        };
        self.stats.exit();
        Ok(result)
    }

    async fn nearest_neighbors(
        &mut self,
        geometry: &GeoJson,
        dataset: &str,
        limit: i64,
        _srid: i32,
    ) -> GovResult<Vec<NeighborFeature>> {
        self.stats.enter();
        self.stats.simulate_latency().await;
        let (lon, lat) = point_coordinates(geometry)
            .ok_or_else(|| GovError::InvalidGeometry("query must be a point".to_string()))?;
        let candidates = self
            .datasets
            .get(dataset)
            .ok_or_else(|| GovError::Internal(format!("unknown dataset '{}'", dataset)))?;

        // Ranking happens on true distance in the common CRS, exactly like
        // the production engine; the storage CRS never matters.
        let mut ranked: Vec<(f64, &FakeCandidate)> = candidates
            .iter()
            .map(|c| (haversine_m(lon, lat, c.lon, c.lat), c))
            .collect();
        ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let features = ranked
            .into_iter()
            .take(limit as usize)
            .map(|(distance, c)| NeighborFeature {
                id: c.id.clone(),
                geometry: Some(json!({"type": "Point", "coordinates": [c.lon, c.lat]})),
                distance_meters: Some(distance),
            })
            .collect();
        self.stats.exit();
        Ok(features)
    }

    async fn transform(
        &mut self,
        geometry: &GeoJson,
        from_epsg: i32,
        to_epsg: i32,
    ) -> GovResult<GeoJson> {
        self.stats.enter();
        self.stats.simulate_latency().await;
        let result = if from_epsg == 4326 && to_epsg == 3857 {
            let (lon, lat) = point_coordinates(geometry)
                .ok_or_else(|| GovError::InvalidGeometry("bad point".to_string()))?;
            let (x, y) = web_mercator_forward(lon, lat);
            json!({"type": "Point", "coordinates": [x, y]})
        } else {
            geometry.clone()
        };
        self.stats.exit();
        Ok(result)
    }

    fn engine_id(&self) -> &str {
        "fake:memory"
    }
}

pub struct FakeConnector {
    stats: Arc<FakeStats>,
    datasets: HashMap<String, Vec<FakeCandidate>>,
}

impl FakeConnector {
    pub fn new(stats: Arc<FakeStats>) -> Self {
        // Two datasets with identical true positions; the second pretends
        // to be stored in web mercator. Ordering must come out the same.
        let positions = [
            ("alpha", -122.419, 37.771),
            ("bravo", -122.425, 37.772),
            ("charlie", -122.410, 37.780),
            ("delta", -122.430, 37.760),
            ("echo", -122.400, 37.790),
            ("foxtrot", -122.450, 37.750),
        ];
        let candidates: Vec<FakeCandidate> = positions
            .iter()
            .map(|(id, lon, lat)| FakeCandidate {
                id: (*id).to_string(),
                lon: *lon,
                lat: *lat,
            })
            .collect();

        let mut datasets = HashMap::new();
        datasets.insert("data.features".to_string(), candidates.clone());
        datasets.insert("data.features_mercator".to_string(), candidates);
        Self { stats, datasets }
    }
}

#[async_trait]
impl EngineConnector for FakeConnector {
    async fn connect(&self) -> GovResult<Box<dyn SpatialEngine>> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEngine {
            stats: Arc::clone(&self.stats),
            datasets: self.datasets.clone(),
        }))
    }
}

/// Configuration tuned for tests: generous rate limit, tiny backoff, stub
/// planner semantics supplied separately.
pub fn test_config() -> GeoGovConfig {
    let mut config = GeoGovConfig::default();
    config.environment = "development".to_string();
    config.gateway.rate_limit_requests = 1_000;
    config.pool.max_connections = 4;
    config.pool.acquire_timeout_ms = 1_000;
    config.planner.max_retries = 0;
    config.planner.backoff_initial_ms = 1;
    config.request_deadline_ms = 10_000;
    config
        .provenance
        .attributed_datasets = vec!["data.features".to_string()];
    config
}

pub struct TestHarness {
    pub kernel: GovernanceKernel,
    pub audit: Arc<MemoryAuditSink>,
    pub stats: Arc<FakeStats>,
}

/// Build a kernel over the fake engine with a member and an admin
/// credential registered.
pub fn build_harness(config: GeoGovConfig) -> TestHarness {
    let stats = Arc::new(FakeStats::default());
    let audit = Arc::new(MemoryAuditSink::new(1_024));

    let mut identities = IdentityRegistry::new();
    identities.register_credential("member-key", Role::Member);
    identities.register_credential("admin-key", Role::Admin);

    let kernel = GovernanceKernel::new(
        config,
        Arc::new(FakeConnector::new(Arc::clone(&stats))),
        Some(Arc::new(StubPlanner::default())),
        audit.clone(),
        identities,
    );

    TestHarness {
        kernel,
        audit,
        stats,
    }
}
