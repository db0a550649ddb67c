//! Natural-language intent resolution.
//!
//! The resolver is the only place untrusted model output is handled, and it
//! is fail-closed end to end: prompts are sanitized before any model call,
//! the backend is invoked with a timeout and bounded backoff retries, and
//! the raw output must validate against the registry schema before anything
//! can execute. The resolver never talks to the spatial engine.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::provider::PlannerProvider;
use super::{extract, sensitivity};
use crate::config::PlannerConfig;
use crate::errors::{GovError, GovResult};
use crate::registry::{OperationCandidate, OperationRegistry, RequestOrigin, SpatialOperationRequest};
use crate::types::SensitivityTag;

const PLANNER_SYSTEM_PROMPT: &str = "\
You are a strict GIS operation planner.
Return exactly one JSON object and no additional text.
Allowed keys: operation, geometry, geometry_b, dataset, limit, distance, units, srid, from_epsg, to_epsg.
Allowed operations: buffer, area, intersection, nearest-neighbors, transform-crs.
Never invent unavailable fields; use only values supported by the user request.
";

const ALLOWED_PROMPT_CONTROL_CHARS: [char; 3] = ['\n', '\t', '\r'];

/// Resolver-internal intermediate: the extracted candidate plus its
/// classification. Discarded once converted to (or rejected as) a validated
/// request; it never crosses the pipeline boundary.
#[derive(Debug)]
struct ParsedIntent {
    candidate: OperationCandidate,
    confidence: f64,
    sensitivity: SensitivityTag,
}

pub struct IntentResolver {
    provider: Arc<dyn PlannerProvider>,
    /// Bounds concurrent model calls so backend backpressure cannot starve
    /// structured requests that never need the model.
    semaphore: Arc<Semaphore>,
    config: PlannerConfig,
}

impl IntentResolver {
    pub fn new(provider: Arc<dyn PlannerProvider>, config: PlannerConfig) -> Self {
        let permits = config.max_concurrency.max(1);
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(permits)),
            config,
        }
    }

    /// Resolve a natural-language prompt to a validated operation request.
    pub async fn resolve(
        &self,
        prompt: &str,
        registry: &OperationRegistry,
    ) -> GovResult<SpatialOperationRequest> {
        let sanitized = sanitize_prompt(prompt, self.config.max_prompt_chars)?;
        let tag = sensitivity::classify_prompt(&sanitized);
        let planner_prompt = compose_planner_prompt(&sanitized);

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| GovError::Internal("resolver semaphore closed".to_string()))?;

        let raw = self.generate_with_retry(&planner_prompt).await?;
        let intent = parse_output(&raw, tag)?;
        debug!(
            confidence = intent.confidence,
            provider = self.provider.info().name,
            "intent candidate extracted"
        );

        registry.validate(intent.candidate, RequestOrigin::NaturalLanguage, intent.sensitivity)
    }

    /// Call the backend, retrying transient failures with exponential
    /// backoff and jitter. Validation-class failures are terminal: bad
    /// output will not get better by asking again with the same prompt.
    async fn generate_with_retry(&self, planner_prompt: &str) -> GovResult<String> {
        let attempts = self.config.max_retries + 1;
        let mut delay = Duration::from_millis(self.config.backoff_initial_ms.max(1));
        let mut last_error = None;

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.config.timeout(), self.provider.generate(planner_prompt))
                .await
            {
                Err(_) => {
                    last_error = Some(GovError::UpstreamUnavailable(
                        "planner call timed out".to_string(),
                    ));
                }
                Ok(Err(err)) if err.is_transient() => {
                    last_error = Some(err);
                }
                Ok(Err(err)) => return Err(err),
                Ok(Ok(raw)) => return Ok(raw),
            }

            if attempt < attempts {
                warn!(attempt, "planner call failed, backing off");
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=50));
                tokio::time::sleep(delay + jitter).await;
                delay = delay.saturating_mul(2);
            }
        }

        Err(last_error
            .unwrap_or_else(|| GovError::UpstreamUnavailable("planner unavailable".to_string())))
    }
}

fn compose_planner_prompt(prompt: &str) -> String {
    format!("{}\nUser request:\n{}\nJSON:", PLANNER_SYSTEM_PROMPT, prompt)
}

/// Reject oversized, empty, or control-character prompts before any model
/// call is made.
pub fn sanitize_prompt(raw: &str, max_chars: usize) -> GovResult<String> {
    let prompt = raw.trim();
    if prompt.is_empty() {
        return Err(GovError::Validation("prompt is empty".to_string()));
    }
    if prompt.chars().count() > max_chars {
        return Err(GovError::Validation(format!(
            "prompt exceeds max length of {} characters",
            max_chars
        )));
    }
    if prompt
        .chars()
        .any(|c| (c as u32) < 32 && !ALLOWED_PROMPT_CONTROL_CHARS.contains(&c))
    {
        return Err(GovError::Validation(
            "prompt contains unsupported control characters".to_string(),
        ));
    }
    Ok(prompt.to_string())
}

/// Raw model output must contain exactly one operation object.
fn parse_output(raw: &str, tag: SensitivityTag) -> GovResult<ParsedIntent> {
    let mut candidates = extract::extract_json_objects(raw)
        .into_iter()
        .filter(|o| o.get("operation").is_some());

    match (candidates.next(), candidates.next()) {
        (None, _) => Err(GovError::Validation(
            "planner output contained no operation object".to_string(),
        )),
        (Some(value), None) => Ok(ParsedIntent {
            candidate: OperationCandidate::from_value(value)?,
            confidence: 1.0,
            sensitivity: tag,
        }),
        (Some(_), Some(_)) => Err(GovError::Validation(
            "planner output contained multiple operation objects; expected exactly one"
                .to_string(),
        )),
    }
}
