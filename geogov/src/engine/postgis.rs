//! PostGIS adapter for the spatial-engine boundary.
//!
//! All geometric math happens in PostGIS; this module only carries GeoJSON
//! across the wire. Buffer and area cast through `geography` so distances
//! and areas are computed on the ellipsoidal surface rather than a planar
//! projection, and nearest-neighbors transforms both sides into EPSG:4326
//! geography before ranking so candidate storage SRID cannot skew the order.
//! Well-formed but topologically invalid inputs are repaired with
//! `ST_MakeValid` before computation; that repair is the documented policy,
//! not a silent fallback.

use async_trait::async_trait;
use sqlx::{Connection, PgConnection, Row};

use super::{EngineConnector, SpatialEngine};
use crate::config::EngineConfig;
use crate::errors::{GovError, GovResult};
use crate::types::{GeoJson, NeighborFeature};

const BUFFER_SQL: &str = r#"
SELECT ST_AsGeoJSON(
    ST_SetSRID(
        ST_Buffer(
            ST_MakeValid(ST_SetSRID(ST_GeomFromGeoJSON($1), $2))::geography,
            $3
        )::geometry,
        $2
    )
)
"#;

const AREA_SQL: &str = r#"
SELECT ST_Area(
    ST_MakeValid(ST_SetSRID(ST_GeomFromGeoJSON($1), $2))::geography
)
"#;

const INTERSECTION_SQL: &str = r#"
SELECT ST_AsGeoJSON(
    ST_Intersection(
        ST_MakeValid(ST_SetSRID(ST_GeomFromGeoJSON($1), $3)),
        ST_MakeValid(ST_SetSRID(ST_GeomFromGeoJSON($2), $3))
    )
)
"#;

const TRANSFORM_SQL: &str = r#"
SELECT ST_AsGeoJSON(
    ST_Transform(ST_SetSRID(ST_GeomFromGeoJSON($1), $2), $3)
)
"#;

pub struct PostgisEngine {
    conn: PgConnection,
    id: String,
}

pub struct PostgisConnector {
    dsn: String,
    label: String,
}

impl PostgisConnector {
    pub fn new(dsn: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            label: label.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            dsn: config.resolve_dsn(),
            label: format!("postgis:{}:{}/{}", config.host, config.port, config.dbname),
        }
    }
}

#[async_trait]
impl EngineConnector for PostgisConnector {
    async fn connect(&self) -> GovResult<Box<dyn SpatialEngine>> {
        let conn = PgConnection::connect(&self.dsn)
            .await
            .map_err(|e| GovError::Internal(format!("engine connect failed: {}", e)))?;
        Ok(Box::new(PostgisEngine {
            conn,
            id: self.label.clone(),
        }))
    }
}

fn geometry_json(geometry: &GeoJson) -> GovResult<String> {
    serde_json::to_string(geometry)
        .map_err(|e| GovError::Internal(format!("geometry serialization failed: {}", e)))
}

fn parse_geojson(raw: &str) -> GovResult<GeoJson> {
    serde_json::from_str(raw)
        .map_err(|e| GovError::Internal(format!("engine returned malformed GeoJSON: {}", e)))
}

/// Classify an engine-side failure. Geometry parse errors inside the engine
/// surface as `InvalidGeometry`; anything else is internal.
fn engine_error(err: sqlx::Error) -> GovError {
    if let sqlx::Error::Database(db) = &err {
        let message = db.message().to_lowercase();
        if message.contains("geojson") || message.contains("geometry") || message.contains("parse")
        {
            return GovError::InvalidGeometry(db.message().to_string());
        }
    }
    GovError::Internal(format!("engine call failed: {}", err))
}

/// An empty intersection comes back as an empty GeometryCollection.
fn is_empty_geometry(value: &GeoJson) -> bool {
    value
        .get("geometries")
        .and_then(|g| g.as_array())
        .map(|g| g.is_empty())
        .unwrap_or(false)
        && value.get("type").and_then(|t| t.as_str()) == Some("GeometryCollection")
}

/// Quote a validated dataset reference for interpolation. The registry has
/// already constrained it to plain identifier segments.
fn quote_dataset(dataset: &str) -> String {
    dataset
        .split('.')
        .map(|segment| format!("\"{}\"", segment))
        .collect::<Vec<_>>()
        .join(".")
}

#[async_trait]
impl SpatialEngine for PostgisEngine {
    async fn buffer(
        &mut self,
        geometry: &GeoJson,
        distance_meters: f64,
        srid: i32,
    ) -> GovResult<GeoJson> {
        let geom_json = geometry_json(geometry)?;
        let row: Option<String> = sqlx::query_scalar(BUFFER_SQL)
            .bind(&geom_json)
            .bind(srid)
            .bind(distance_meters)
            .fetch_one(&mut self.conn)
            .await
            .map_err(engine_error)?;
        let raw = row
            .ok_or_else(|| GovError::Internal("buffer returned no geometry".to_string()))?;
        parse_geojson(&raw)
    }

    async fn area_square_meters(&mut self, geometry: &GeoJson, srid: i32) -> GovResult<f64> {
        let geom_json = geometry_json(geometry)?;
        let area: Option<f64> = sqlx::query_scalar(AREA_SQL)
            .bind(&geom_json)
            .bind(srid)
            .fetch_one(&mut self.conn)
            .await
            .map_err(engine_error)?;
        area.ok_or_else(|| GovError::Internal("area returned no result".to_string()))
    }

    async fn intersection(
        &mut self,
        geometry_a: &GeoJson,
        geometry_b: &GeoJson,
        srid: i32,
    ) -> GovResult<Option<GeoJson>> {
        let a_json = geometry_json(geometry_a)?;
        let b_json = geometry_json(geometry_b)?;
        let row: Option<String> = sqlx::query_scalar(INTERSECTION_SQL)
            .bind(&a_json)
            .bind(&b_json)
            .bind(srid)
            .fetch_one(&mut self.conn)
            .await
            .map_err(engine_error)?;
        match row {
            None => Ok(None),
            Some(raw) => {
                let value = parse_geojson(&raw)?;
                if is_empty_geometry(&value) {
                    Ok(None)
                } else {
                    Ok(Some(value))
                }
            }
        }
    }

    async fn nearest_neighbors(
        &mut self,
        geometry: &GeoJson,
        dataset: &str,
        limit: i64,
        srid: i32,
    ) -> GovResult<Vec<NeighborFeature>> {
        let geom_json = geometry_json(geometry)?;
        // The dataset reference was validated by the registry; quoting keeps
        // it inert even so. All other inputs are bound parameters.
        let sql = format!(
            r#"
SELECT id::text,
       ST_AsGeoJSON(geom) AS geom_json,
       ST_Distance(
           ST_Transform(geom, 4326)::geography,
           ST_Transform(ST_SetSRID(ST_GeomFromGeoJSON($1), $2), 4326)::geography
       ) AS distance_m
FROM {}
ORDER BY ST_Transform(geom, 4326)::geography <->
         ST_Transform(ST_SetSRID(ST_GeomFromGeoJSON($1), $2), 4326)::geography
LIMIT $3
"#,
            quote_dataset(dataset)
        );

        let rows = sqlx::query(&sql)
            .bind(&geom_json)
            .bind(srid)
            .bind(limit)
            .fetch_all(&mut self.conn)
            .await
            .map_err(engine_error)?;

        let mut features = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row
                .try_get(0)
                .map_err(|e| GovError::Internal(format!("neighbor row missing id: {}", e)))?;
            let geom_raw: Option<String> = row
                .try_get(1)
                .map_err(|e| GovError::Internal(format!("neighbor row missing geometry: {}", e)))?;
            let distance_meters: Option<f64> = row
                .try_get(2)
                .map_err(|e| GovError::Internal(format!("neighbor row missing distance: {}", e)))?;
            let geometry = match geom_raw {
                Some(raw) => Some(parse_geojson(&raw)?),
                None => None,
            };
            features.push(NeighborFeature {
                id,
                geometry,
                distance_meters,
            });
        }
        Ok(features)
    }

    async fn transform(
        &mut self,
        geometry: &GeoJson,
        from_epsg: i32,
        to_epsg: i32,
    ) -> GovResult<GeoJson> {
        let geom_json = geometry_json(geometry)?;
        let row: Option<String> = sqlx::query_scalar(TRANSFORM_SQL)
            .bind(&geom_json)
            .bind(from_epsg)
            .bind(to_epsg)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|err| {
                if let sqlx::Error::Database(db) = &err {
                    let message = db.message().to_lowercase();
                    if message.contains("srid") || message.contains("spatial_ref") {
                        return GovError::UnsupportedCrs(to_epsg);
                    }
                }
                engine_error(err)
            })?;
        let raw = row
            .ok_or_else(|| GovError::Internal("transform returned no geometry".to_string()))?;
        parse_geojson(&raw)
    }

    fn engine_id(&self) -> &str {
        &self.id
    }
}
