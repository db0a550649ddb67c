//! Runtime configuration.
//!
//! Every tunable the pipeline exposes is read from `GEOGOV_*` environment
//! variables with serviceable defaults: rate-limit capacity/window, pool
//! size and acquire timeout, planner endpoint/model/timeout/retries, and
//! the prompt length cap.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::intent::ProviderKind;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Gateway tunables: rate limiting and the anonymous-access policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub rate_limit_enabled: bool,
    /// Tokens refilled per window.
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rate_limit_enabled: true,
            rate_limit_requests: 60,
            rate_limit_window_seconds: 60,
        }
    }
}

impl GatewayConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds.max(1))
    }
}

/// Bounded-pool tunables for the external spatial engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout_ms: 5_000,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Connection parameters for the PostGIS engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Full DSN override; wins over the individual fields when set.
    pub dsn: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "geogov".to_string(),
            user: "geogov".to_string(),
            password: "changeme".to_string(),
            dsn: None,
        }
    }
}

impl EngineConfig {
    pub fn resolve_dsn(&self) -> String {
        if let Some(dsn) = &self.dsn {
            return dsn.clone();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.dbname
        )
    }
}

/// Language-model planner tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub enabled: bool,
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    /// Retries after the first attempt, on transient backend failures only.
    pub max_retries: u32,
    pub backoff_initial_ms: u64,
    pub max_prompt_chars: usize,
    /// Bounds concurrent model calls independently of the connection pool.
    pub max_concurrency: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: ProviderKind::Ollama,
            model: "qwen2.5:7b-instruct".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            timeout_seconds: 20,
            max_retries: 1,
            backoff_initial_ms: 200,
            max_prompt_chars: 4_000,
            max_concurrency: 2,
        }
    }
}

impl PlannerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

/// Provenance policy: datasets with known attribution verify fully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceConfig {
    pub attributed_datasets: Vec<String>,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            attributed_datasets: vec!["data.features".to_string()],
        }
    }
}

/// Top-level configuration for a kernel instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoGovConfig {
    pub environment: String,
    pub log_level: String,
    /// Shared credential granted `admin` at startup. Fingerprinted into the
    /// identity registry and dropped; the raw value is never kept.
    pub api_key: Option<String>,
    pub gateway: GatewayConfig,
    pub pool: PoolConfig,
    pub engine: EngineConfig,
    pub planner: PlannerConfig,
    pub provenance: ProvenanceConfig,
    pub request_deadline_ms: u64,
}

impl Default for GeoGovConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            api_key: None,
            gateway: GatewayConfig::default(),
            pool: PoolConfig::default(),
            engine: EngineConfig::default(),
            planner: PlannerConfig::default(),
            provenance: ProvenanceConfig::default(),
            request_deadline_ms: 30_000,
        }
    }
}

impl GeoGovConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            environment: env_string("GEOGOV_ENVIRONMENT", &defaults.environment),
            log_level: env_string("GEOGOV_LOG_LEVEL", &defaults.log_level),
            api_key: env_opt("GEOGOV_API_KEY"),
            gateway: GatewayConfig {
                rate_limit_enabled: env_bool(
                    "GEOGOV_RATE_LIMIT_ENABLED",
                    defaults.gateway.rate_limit_enabled,
                ),
                rate_limit_requests: env_parse(
                    "GEOGOV_RATE_LIMIT_REQUESTS",
                    defaults.gateway.rate_limit_requests,
                ),
                rate_limit_window_seconds: env_parse(
                    "GEOGOV_RATE_LIMIT_WINDOW_SECONDS",
                    defaults.gateway.rate_limit_window_seconds,
                ),
            },
            pool: PoolConfig {
                max_connections: env_parse("GEOGOV_POOL_MAX", defaults.pool.max_connections),
                acquire_timeout_ms: env_parse(
                    "GEOGOV_POOL_ACQUIRE_TIMEOUT_MS",
                    defaults.pool.acquire_timeout_ms,
                ),
            },
            engine: EngineConfig {
                host: env_string("GEOGOV_DB_HOST", &defaults.engine.host),
                port: env_parse("GEOGOV_DB_PORT", defaults.engine.port),
                dbname: env_string("GEOGOV_DB_NAME", &defaults.engine.dbname),
                user: env_string("GEOGOV_DB_USER", &defaults.engine.user),
                password: env_string("GEOGOV_DB_PASSWORD", &defaults.engine.password),
                dsn: env_opt("GEOGOV_DB_DSN"),
            },
            planner: PlannerConfig {
                enabled: env_bool("GEOGOV_PLANNER_ENABLED", defaults.planner.enabled),
                provider: env_opt("GEOGOV_PLANNER_PROVIDER")
                    .and_then(|v| ProviderKind::parse(&v))
                    .unwrap_or(defaults.planner.provider),
                model: env_string("GEOGOV_PLANNER_MODEL", &defaults.planner.model),
                base_url: env_string("GEOGOV_PLANNER_BASE_URL", &defaults.planner.base_url),
                api_key: env_opt("GEOGOV_PLANNER_API_KEY"),
                timeout_seconds: env_parse(
                    "GEOGOV_PLANNER_TIMEOUT_SECONDS",
                    defaults.planner.timeout_seconds,
                ),
                max_retries: env_parse("GEOGOV_PLANNER_MAX_RETRIES", defaults.planner.max_retries),
                backoff_initial_ms: env_parse(
                    "GEOGOV_PLANNER_BACKOFF_INITIAL_MS",
                    defaults.planner.backoff_initial_ms,
                ),
                max_prompt_chars: env_parse(
                    "GEOGOV_PLANNER_MAX_PROMPT_CHARS",
                    defaults.planner.max_prompt_chars,
                ),
                max_concurrency: env_parse(
                    "GEOGOV_PLANNER_MAX_CONCURRENCY",
                    defaults.planner.max_concurrency,
                ),
            },
            provenance: ProvenanceConfig {
                attributed_datasets: env_opt("GEOGOV_ATTRIBUTED_DATASETS")
                    .map(|v| {
                        v.split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or(defaults.provenance.attributed_datasets),
            },
            request_deadline_ms: env_parse(
                "GEOGOV_REQUEST_DEADLINE_MS",
                defaults.request_deadline_ms,
            ),
        }
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms.max(1))
    }

    pub fn is_test_environment(&self) -> bool {
        matches!(
            self.environment.to_lowercase().as_str(),
            "test" | "testing"
        )
    }
}
