//! Append-only audit trail.
//!
//! One record per request attempt, regardless of outcome. Redaction happens
//! when the record is constructed, not at the sink: raw credentials are
//! reduced to fingerprints, prompts to a digest-and-length reference, and
//! geometry payloads to a coordinate-free summary. A sink failure is logged
//! and dropped; it never fails the request it describes.

pub mod redact;

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::{GovError, GovResult};
use crate::types::{EvidenceRef, GeoJson, OperationName, VerificationStatus};

pub use redact::{hash_identifier, redacted_prompt, sanitize_error, summarize_geometry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
}

/// Coordinate-free description of a geometry payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeometrySummary {
    pub geometry_type: String,
    pub has_coordinates: bool,
}

/// Fixed attribution block recorded on every entry.
#[derive(Debug, Clone, Serialize)]
pub struct Attribution {
    pub prompt_policy: &'static str,
    pub user_policy: &'static str,
}

impl Default for Attribution {
    fn default() -> Self {
        Self {
            prompt_policy: "redacted",
            user_policy: "hashed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub request_id: String,
    pub identity_fingerprint: String,
    pub operation: Option<OperationName>,
    pub status: AuditStatus,
    pub error_kind: Option<&'static str>,
    pub error_message: Option<String>,
    pub verification_status: VerificationStatus,
    pub evidence: Option<EvidenceRef>,
    pub prompt_reference: Option<String>,
    pub geometry_summary: Option<GeometrySummary>,
    pub attribution: Attribution,
    pub timestamp: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl AuditRecord {
    /// Build a fully redacted record. `identity_fingerprint` must already be
    /// a fingerprint; prompt and geometry arrive raw and are reduced here.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        request_id: &str,
        identity_fingerprint: &str,
        operation: Option<OperationName>,
        error: Option<&GovError>,
        verification_status: VerificationStatus,
        evidence: Option<EvidenceRef>,
        prompt: Option<&str>,
        geometry: Option<&GeoJson>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            request_id: request_id.to_string(),
            identity_fingerprint: identity_fingerprint.to_string(),
            operation,
            status: if error.is_none() {
                AuditStatus::Success
            } else {
                AuditStatus::Failure
            },
            error_kind: error.map(GovError::kind),
            error_message: error.map(|e| sanitize_error(&e.to_string())),
            verification_status,
            evidence,
            prompt_reference: prompt.map(redacted_prompt),
            geometry_summary: geometry.and_then(summarize_geometry),
            attribution: Attribution::default(),
            timestamp: Utc::now(),
            elapsed_ms,
        }
    }
}

/// Append-only destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> GovResult<()>;
}

/// Bounded in-memory sink; the oldest entry is evicted once full.
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditRecord>>,
    capacity: usize,
}

impl MemoryAuditSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn recent(&self, max: usize) -> Vec<AuditRecord> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let start = entries.len().saturating_sub(max);
        entries[start..].to_vec()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> GovResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity {
            entries.remove(0);
        }
        entries.push(record.clone());
        Ok(())
    }
}

/// Sink that emits each record as a structured tracing event.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, record: &AuditRecord) -> GovResult<()> {
        info!(
            request_id = %record.request_id,
            fingerprint = %record.identity_fingerprint,
            operation = record.operation.map(|o| o.as_str()),
            status = ?record.status,
            error_kind = record.error_kind,
            elapsed_ms = record.elapsed_ms,
            "audit.query"
        );
        Ok(())
    }
}

/// Best-effort recorder: a failed write is logged once and dropped.
pub struct AuditRecorder {
    sink: std::sync::Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: std::sync::Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub async fn record(&self, record: AuditRecord) {
        if let Err(err) = self.sink.append(&record).await {
            warn!(
                request_id = %record.request_id,
                error = %err,
                "audit write failed; continuing without retry"
            );
        }
    }
}
