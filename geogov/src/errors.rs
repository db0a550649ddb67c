//! Error taxonomy for the governed request pipeline.
//!
//! Every failure the pipeline can surface is a variant here. Validation-class
//! errors carry enough detail for the caller to fix the input; identity,
//! authorization and rate-limit errors deliberately do not, so a caller cannot
//! enumerate which check rejected them.

use std::time::Duration;
use thiserror::Error;

pub type GovResult<T> = Result<T, GovError>;

#[derive(Debug, Clone, Error)]
pub enum GovError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("operation not permitted")]
    Unauthorized,

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("unsupported unit '{0}'")]
    UnsupportedUnit(String),

    #[error("unsupported CRS EPSG:{0}")]
    UnsupportedCrs(i32),

    #[error("planner backend unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("engine connection pool exhausted")]
    PoolExhausted,

    #[error("request deadline exceeded")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GovError {
    /// Machine-readable error kind carried on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            GovError::Unauthenticated => "unauthenticated",
            GovError::Unauthorized => "unauthorized",
            GovError::RateLimited { .. } => "rate_limited",
            GovError::Validation(_) => "validation_error",
            GovError::InvalidGeometry(_) => "invalid_geometry",
            GovError::UnsupportedUnit(_) => "unsupported_unit",
            GovError::UnsupportedCrs(_) => "unsupported_crs",
            GovError::UpstreamUnavailable(_) => "upstream_unavailable",
            GovError::PoolExhausted => "pool_exhausted",
            GovError::Timeout => "timeout",
            GovError::Internal(_) => "internal_error",
        }
    }

    /// Message surfaced to the caller. Identity, authorization and rate-limit
    /// failures share fixed phrasing regardless of which check rejected the
    /// request; validation-class errors keep their specifics.
    pub fn public_message(&self) -> String {
        match self {
            GovError::Unauthenticated => "Authentication required.".to_string(),
            GovError::Unauthorized => "Insufficient permissions for this operation.".to_string(),
            GovError::RateLimited { .. } => "Rate limit exceeded.".to_string(),
            GovError::Internal(_) => "Internal error.".to_string(),
            other => other.to_string(),
        }
    }

    /// Seconds the caller should wait before retrying, when applicable.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            GovError::RateLimited { retry_after } => Some(retry_after.as_secs().max(1)),
            _ => None,
        }
    }

    /// True for failures the intent resolver may retry transparently.
    pub fn is_transient(&self) -> bool {
        matches!(self, GovError::UpstreamUnavailable(_))
    }
}
