//! Gateway concerns: identity fingerprinting, role-based authorization and
//! per-caller rate limiting.

pub mod authorization;
pub mod identity;
pub mod rate_limit;

pub use authorization::PermissionTable;
pub use identity::{fingerprint_credential, Identity, IdentityRegistry};
pub use rate_limit::{RateDecision, RateLimiter, TokenBucketLimiter};
