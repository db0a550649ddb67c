//! Closed unit allow-lists and conversion factors.
//!
//! Distances convert to meters before reaching the engine; areas come back
//! from the engine in square meters and convert on the way out.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::errors::{GovError, GovResult};

pub const DEFAULT_DISTANCE_UNIT: &str = "meters";
pub const DEFAULT_AREA_UNIT: &str = "square_meters";

static DISTANCE_TO_METERS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("meter", 1.0),
        ("meters", 1.0),
        ("metre", 1.0),
        ("metres", 1.0),
        ("kilometer", 1_000.0),
        ("kilometers", 1_000.0),
        ("kilometre", 1_000.0),
        ("kilometres", 1_000.0),
        ("mile", 1_609.344),
        ("miles", 1_609.344),
        ("foot", 0.3048),
        ("feet", 0.3048),
        ("ft", 0.3048),
        ("yard", 0.9144),
        ("yards", 0.9144),
    ])
});

static AREA_FROM_SQ_METERS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("square_meter", 1.0),
        ("square_meters", 1.0),
        ("sqm", 1.0),
        ("hectare", 0.0001),
        ("hectares", 0.0001),
        ("acre", 0.000_247_105),
        ("acres", 0.000_247_105),
        ("square_kilometer", 1e-6),
        ("square_kilometers", 1e-6),
        ("sqkm", 1e-6),
    ])
});

pub fn is_distance_unit(unit: &str) -> bool {
    DISTANCE_TO_METERS.contains_key(unit.trim().to_lowercase().as_str())
}

pub fn is_area_unit(unit: &str) -> bool {
    AREA_FROM_SQ_METERS.contains_key(unit.trim().to_lowercase().as_str())
}

/// Convert a distance to meters. Negative distances are a validation error;
/// unknown units are `UnsupportedUnit`.
pub fn distance_to_meters(distance: f64, unit: &str) -> GovResult<f64> {
    if !distance.is_finite() || distance < 0.0 {
        return Err(GovError::Validation(
            "distance must be a non-negative number".to_string(),
        ));
    }
    let factor = DISTANCE_TO_METERS
        .get(unit.trim().to_lowercase().as_str())
        .ok_or_else(|| GovError::UnsupportedUnit(unit.to_string()))?;
    Ok(distance * factor)
}

/// Convert an engine-reported area in square meters to the requested unit.
pub fn area_from_square_meters(area_m2: f64, unit: &str) -> GovResult<f64> {
    let factor = AREA_FROM_SQ_METERS
        .get(unit.trim().to_lowercase().as_str())
        .ok_or_else(|| GovError::UnsupportedUnit(unit.to_string()))?;
    Ok(area_m2 * factor)
}
