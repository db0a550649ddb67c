//! geogov: a governed geospatial request-execution pipeline.
//!
//! The crate accepts either a structured spatial-operation request or a
//! natural-language prompt, resolves it to exactly one validated geometric
//! operation, enforces identity, permission and rate constraints, executes
//! the operation against an external spatial engine (PostGIS), and leaves an
//! immutable, redacted audit record for every attempt.
//!
//! Entry point: [`kernel::GovernanceKernel`].

pub mod audit;
pub mod config;
pub mod engine;
pub mod errors;
pub mod intent;
pub mod kernel;
pub mod registry;
pub mod security;
pub mod telemetry;
pub mod types;

pub use config::GeoGovConfig;
pub use errors::{GovError, GovResult};
pub use kernel::GovernanceKernel;
pub use types::{QueryRequest, QueryResponse};
