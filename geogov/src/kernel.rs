//! The governance kernel: the mandatory intermediary every request passes
//! through on its way to the spatial engine.
//!
//! Composition, in order: identity resolution → rate limit → authorization →
//! validation (structured) or intent resolution (natural-language) →
//! dispatch through the bounded pool → provenance tagging → exactly one
//! audit record per attempt, on every path. A single end-to-end deadline
//! covers model call, pool acquire and engine call; the audit write sits
//! outside it so a timed-out request is still recorded.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditRecorder, AuditSink};
use crate::config::GeoGovConfig;
use crate::engine::{EngineConnector, EnginePool, PostgisConnector};
use crate::errors::{GovError, GovResult};
use crate::intent::{classify_prompt, IntentResolver, PlannerProvider, ProviderFactory};
use crate::registry::{
    OperationCandidate, OperationRegistry, RequestOrigin, SpatialOperationRequest,
};
use crate::security::rate_limit::RateDecision;
use crate::security::{fingerprint_credential, Identity, IdentityRegistry, PermissionTable, RateLimiter};
use crate::types::{
    ErrorBody, EvidenceRef, HealthReport, OperationName, OperationResult, QueryRequest,
    QueryResponse, Role, SensitivityTag, VerificationStatus,
};

/// Per-request bookkeeping that must survive pipeline failure so the audit
/// record and response can describe how far the request got.
#[derive(Default)]
struct PipelineState {
    operation: Option<OperationName>,
    verification: Option<VerificationStatus>,
    evidence: Option<EvidenceRef>,
}

pub struct GovernanceKernel {
    config: GeoGovConfig,
    identities: IdentityRegistry,
    permissions: PermissionTable,
    limiter: RateLimiter,
    registry: OperationRegistry,
    resolver: Option<IntentResolver>,
    pool: EnginePool,
    audit: AuditRecorder,
}

impl GovernanceKernel {
    pub fn new(
        mut config: GeoGovConfig,
        connector: Arc<dyn EngineConnector>,
        planner: Option<Arc<dyn PlannerProvider>>,
        audit_sink: Arc<dyn AuditSink>,
        mut identities: IdentityRegistry,
    ) -> Self {
        // The shared credential is fingerprinted here and the raw value
        // dropped; nothing downstream ever sees it.
        if let Some(api_key) = config.api_key.take() {
            identities.register_credential(&api_key, Role::Admin);
        }

        let limiter = RateLimiter::from_settings(
            config.gateway.rate_limit_enabled && !config.is_test_environment(),
            config.gateway.rate_limit_requests,
            config.gateway.window(),
        );
        let pool = EnginePool::new(
            connector,
            config.pool.max_connections,
            config.pool.acquire_timeout(),
        );
        let resolver = if config.planner.enabled {
            planner.map(|p| IntentResolver::new(p, config.planner.clone()))
        } else {
            None
        };

        Self {
            identities,
            permissions: PermissionTable::default(),
            limiter,
            registry: OperationRegistry::default(),
            resolver,
            pool,
            audit: AuditRecorder::new(audit_sink),
            config,
        }
    }

    /// Assemble a kernel entirely from configuration: PostGIS engine,
    /// factory-selected planner backend, tracing audit sink.
    pub fn from_config(config: GeoGovConfig) -> GovResult<Self> {
        let connector = Arc::new(PostgisConnector::from_config(&config.engine));
        let planner = if config.planner.enabled {
            Some(ProviderFactory::create(&config.planner)?)
        } else {
            None
        };
        Ok(Self::new(
            config,
            connector,
            planner,
            Arc::new(crate::audit::TracingAuditSink),
            IdentityRegistry::new(),
        ))
    }

    pub fn with_permissions(mut self, permissions: PermissionTable) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            pool_size: self.pool.size(),
            pool_available: self.pool.available(),
            rate_limit_enabled: self.limiter.is_enabled(),
            planner_enabled: self.resolver.is_some(),
        }
    }

    /// Execute one request end to end. Always returns a response and always
    /// leaves exactly one audit record, whatever happened.
    pub async fn execute(&self, request: QueryRequest) -> QueryResponse {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let audit_fingerprint =
            fingerprint_credential(request.credential.as_deref().unwrap_or(""));

        info!(request_id = %request_id, "query.received");

        let mut state = PipelineState::default();
        let outcome = match self
            .identities
            .resolve(request.credential.as_deref(), request.origin.as_deref())
        {
            Err(err) => Err(err),
            Ok(identity) => {
                match tokio::time::timeout(
                    self.config.request_deadline(),
                    self.run_pipeline(&identity, &request, &mut state),
                )
                .await
                {
                    Ok(result) => result,
                    // The pipeline future is dropped here; any held pool
                    // connection was released by its guard.
                    Err(_) => Err(GovError::Timeout),
                }
            }
        };

        let elapsed_ms = started.elapsed().as_millis().min(u64::MAX as u128) as u64;
        let record = AuditRecord::build(
            &request_id,
            &audit_fingerprint,
            state.operation,
            outcome.as_ref().err(),
            state.verification.unwrap_or(VerificationStatus::Unverified),
            state.evidence.clone(),
            request.prompt.as_deref(),
            request.geometry.as_ref(),
            elapsed_ms,
        );
        self.audit.record(record).await;

        match outcome {
            Ok(result) => {
                info!(
                    request_id = %request_id,
                    operation = state.operation.map(|o| o.as_str()),
                    elapsed_ms,
                    "query.completed"
                );
                QueryResponse {
                    request_id,
                    status: "completed",
                    operation: state.operation,
                    result: Some(result),
                    verification_status: state.verification,
                    evidence: state.evidence,
                    error: None,
                }
            }
            Err(err) => {
                warn!(
                    request_id = %request_id,
                    kind = err.kind(),
                    elapsed_ms,
                    "query.failed"
                );
                QueryResponse {
                    request_id,
                    status: "error",
                    operation: state.operation,
                    result: None,
                    verification_status: None,
                    evidence: None,
                    error: Some(ErrorBody {
                        kind: err.kind(),
                        message: err.public_message(),
                        retry_after_seconds: err.retry_after_seconds(),
                    }),
                }
            }
        }
    }

    async fn run_pipeline(
        &self,
        identity: &Identity,
        request: &QueryRequest,
        state: &mut PipelineState,
    ) -> GovResult<OperationResult> {
        match self.limiter.allow(&identity.rate_key) {
            RateDecision::Permitted => {}
            RateDecision::Limited { retry_after } => {
                return Err(GovError::RateLimited { retry_after });
            }
        }

        let validated = self.resolve_operation(identity, request, state).await?;
        state.operation = Some(validated.operation);
        self.permissions.authorize(identity.role, validated.operation)?;

        let (verification, datasets) = self.assess_provenance(&validated);
        state.verification = Some(verification);

        let mut guard = self.pool.acquire().await?;
        state.evidence = Some(EvidenceRef {
            engine: guard.engine_id(),
            datasets,
        });

        let result = self.registry.execute(&validated, guard.engine_mut()).await;
        if result.is_err() {
            // The connection may be mid-statement; do not reuse it.
            guard.discard();
        }
        result
    }

    /// Produce the one validated operation this request maps to, from
    /// whichever path supplied it. Structured input wins when both are
    /// present.
    async fn resolve_operation(
        &self,
        identity: &Identity,
        request: &QueryRequest,
        state: &mut PipelineState,
    ) -> GovResult<SpatialOperationRequest> {
        let sensitivity = request
            .prompt
            .as_deref()
            .map(classify_prompt)
            .unwrap_or(SensitivityTag::Public);

        if let Some(raw_operation) = request
            .operation
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            // Authorize before detailed validation so an unauthorized
            // caller learns nothing about parameter requirements.
            if let Some(operation) = OperationName::parse(raw_operation) {
                state.operation = Some(operation);
                self.permissions.authorize(identity.role, operation)?;
            }
            let candidate = OperationCandidate::from_request(request);
            return self
                .registry
                .validate(candidate, RequestOrigin::Structured, sensitivity);
        }

        if let Some(prompt) = request.prompt.as_deref() {
            let resolver = self.resolver.as_ref().ok_or_else(|| {
                GovError::Validation(
                    "natural-language resolution is disabled; provide 'operation'".to_string(),
                )
            })?;
            // A caller with no grants at all gets rejected before a model
            // call is spent on them.
            if !self.permissions.has_any_grant(identity.role) {
                return Err(GovError::Unauthorized);
            }
            return resolver.resolve(prompt, &self.registry).await;
        }

        Err(GovError::Validation(
            "request needs either 'operation' or 'prompt'".to_string(),
        ))
    }

    /// A result verifies fully when every geometric input was either
    /// supplied inline by the caller or drawn from an attributed dataset.
    fn assess_provenance(
        &self,
        validated: &SpatialOperationRequest,
    ) -> (VerificationStatus, Vec<String>) {
        let datasets: Vec<String> = validated.dataset.iter().cloned().collect();
        let attributed = datasets
            .iter()
            .all(|d| self.config.provenance.attributed_datasets.contains(d));
        let verification = if attributed {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Unverified
        };
        (verification, datasets)
    }
}
