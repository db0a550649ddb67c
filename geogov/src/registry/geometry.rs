//! Structural validation of inbound GeoJSON.
//!
//! Policy: structurally malformed geometry is rejected here, before any
//! engine call. Topologically invalid but well-formed shapes (for example a
//! self-intersecting polygon ring) pass through and are deterministically
//! repaired by the engine with `ST_MakeValid` before computation.

use serde_json::Value;

use crate::errors::{GovError, GovResult};

const GEOMETRY_TYPES: [&str; 6] = [
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
];

/// Validate that a value is a well-formed GeoJSON geometry object.
pub fn validate_geometry(value: &Value) -> GovResult<()> {
    validate_at_depth(value, 0)
}

fn validate_at_depth(value: &Value, depth: usize) -> GovResult<()> {
    // GeometryCollections may nest; one level is plenty for this pipeline.
    if depth > 1 {
        return Err(GovError::InvalidGeometry(
            "geometry collections may not nest".to_string(),
        ));
    }

    let object = value
        .as_object()
        .ok_or_else(|| GovError::InvalidGeometry("geometry must be a JSON object".to_string()))?;

    let geometry_type = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GovError::InvalidGeometry("geometry is missing 'type'".to_string()))?;

    if geometry_type == "GeometryCollection" {
        let members = object
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                GovError::InvalidGeometry("GeometryCollection is missing 'geometries'".to_string())
            })?;
        for member in members {
            validate_at_depth(member, depth + 1)?;
        }
        return Ok(());
    }

    if !GEOMETRY_TYPES.contains(&geometry_type) {
        return Err(GovError::InvalidGeometry(format!(
            "unknown geometry type '{}'",
            geometry_type
        )));
    }

    let coordinates = object.get("coordinates").ok_or_else(|| {
        GovError::InvalidGeometry("geometry is missing 'coordinates'".to_string())
    })?;
    validate_coordinates(coordinates)
}

/// Coordinates must bottom out in finite numbers, arbitrarily nested in
/// arrays. Anything else (strings, objects, NaN-encoded nulls) rejects.
fn validate_coordinates(value: &Value) -> GovResult<()> {
    match value {
        Value::Number(n) => {
            if n.as_f64().map(f64::is_finite).unwrap_or(false) {
                Ok(())
            } else {
                Err(GovError::InvalidGeometry(
                    "coordinate is not a finite number".to_string(),
                ))
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                return Err(GovError::InvalidGeometry(
                    "coordinate array is empty".to_string(),
                ));
            }
            for item in items {
                validate_coordinates(item)?;
            }
            Ok(())
        }
        _ => Err(GovError::InvalidGeometry(
            "coordinates must contain only numbers".to_string(),
        )),
    }
}
