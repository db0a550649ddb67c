//! Redaction helpers applied before an audit record exists.

use sha2::{Digest, Sha256};

use super::GeometrySummary;
use crate::types::GeoJson;

const MAX_ERROR_CHARS: usize = 300;

/// One-way hash of a caller identifier. Blank input normalizes to
/// "anonymous" so the audit trail never carries an empty identity.
pub fn hash_identifier(value: &str) -> String {
    let normalized = value.trim();
    let normalized = if normalized.is_empty() {
        "anonymous"
    } else {
        normalized
    };
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

/// Replace a prompt with a digest-and-length reference.
pub fn redacted_prompt(prompt: &str) -> String {
    let normalized = prompt.trim();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!(
        "redacted:sha256:{:x}:len:{}",
        hasher.finalize(),
        normalized.chars().count()
    )
}

/// Flatten whitespace and cap length so engine errors cannot smuggle
/// payload fragments into the trail.
pub fn sanitize_error(message: &str) -> String {
    let flattened = message.split_whitespace().collect::<Vec<_>>().join(" ");
    flattened.chars().take(MAX_ERROR_CHARS).collect()
}

/// Reduce a geometry to its type and whether coordinates were present.
pub fn summarize_geometry(value: &GeoJson) -> Option<GeometrySummary> {
    let object = value.as_object()?;
    let geometry_type = object
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("unknown")
        .to_string();
    Some(GeometrySummary {
        geometry_type,
        has_coordinates: object.contains_key("coordinates"),
    })
}
