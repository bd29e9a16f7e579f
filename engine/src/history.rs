// Execution history: record schema and the store abstraction.
//
// Design:
// - `HistoryStore` is the only seam the recommender depends on
// - Records are append-only; this crate never mutates or deletes them
// - `InMemoryHistoryStore`: process-local log, brute-force cosine search
// - `DualWriteHistoryStore`: mirrors appends into a legacy store during migration
//
// Both trait methods are suspension points and must be treated as fallible
// and slow; callers wrap them in timeouts.

use crate::error::HistoryError;
use crate::similarity;
use crate::vectorizer::FeatureVector;
use crate::workload::{Algorithm, Backend, ErrorMitigation, WorkloadDescriptor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// Current version of the persisted record layout.
///
/// v1 lacked `schema_version`, `id` and the optional error-mitigation field;
/// v1 rows deserialize with those defaulted.
pub const RECORD_SCHEMA_VERSION: u16 = 2;

fn legacy_schema_version() -> u16 {
    1
}

/// Measured result of one execution, supplied by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub shots_used: u32,
    pub backend_used: Backend,
    pub error_mitigation: Option<ErrorMitigation>,
    /// Measured success rate / fidelity on a 0-100 scale
    pub success_rate: f64,
    pub runtime_ms: f64,
    /// Fidelity the caller expected before running (0-100)
    pub predicted_fidelity: f64,
}

/// One completed execution, as persisted in the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u16,
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub feature_vector: FeatureVector,
    pub algorithm: Algorithm,
    pub qubits: u32,
    pub depth: u32,
    pub gate_count: u32,
    pub shots_used: u32,
    pub backend_used: Backend,
    #[serde(default)]
    pub error_mitigation: Option<ErrorMitigation>,
    pub success_rate: f64,
    pub runtime_ms: f64,
    pub reward_score: f64,
}

impl ExecutionRecord {
    pub fn new(
        feature_vector: FeatureVector,
        workload: &WorkloadDescriptor,
        outcome: &ExecutionOutcome,
        reward_score: f64,
    ) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            feature_vector,
            algorithm: workload.algorithm,
            qubits: workload.qubits,
            depth: workload.depth,
            gate_count: workload.gate_count,
            shots_used: outcome.shots_used,
            backend_used: outcome.backend_used,
            error_mitigation: outcome.error_mitigation,
            success_rate: outcome.success_rate,
            runtime_ms: outcome.runtime_ms,
            reward_score,
        }
    }
}

/// A history row returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarRecord {
    pub feature_vector: FeatureVector,
    pub similarity: f64,
    pub shots_used: u32,
    pub backend_used: Backend,
    pub error_mitigation: Option<ErrorMitigation>,
    pub reward_score: f64,
}

impl SimilarRecord {
    fn from_record(record: &ExecutionRecord, similarity: f64) -> Self {
        Self {
            feature_vector: record.feature_vector,
            similarity,
            shots_used: record.shots_used,
            backend_used: record.backend_used,
            error_mitigation: record.error_mitigation,
            reward_score: record.reward_score,
        }
    }
}

/// Historical-record store consumed by the recommender and outcome recorder.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Records with cosine similarity >= `threshold`, most similar first, at most `limit`.
    ///
    /// Stores without a similarity index keep the default, which reports
    /// the capability as missing.
    async fn find_similar(
        &self,
        _vector: &FeatureVector,
        _threshold: f64,
        _limit: usize,
    ) -> Result<Vec<SimilarRecord>, HistoryError> {
        Err(HistoryError::Unsupported("similarity search"))
    }

    /// Durable append of a completed execution.
    async fn append(&self, record: ExecutionRecord) -> Result<(), HistoryError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// In-memory append-only history log.
///
/// Suitable for single-instance deployments and tests; contents do not
/// survive a restart.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    inner: Arc<RwLock<Vec<ExecutionRecord>>>,
}

impl InMemoryHistoryStore {
    /// Creates a new, empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `records` (oldest first).
    pub fn with_records(records: Vec<ExecutionRecord>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(records)),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Copy of every record, oldest first
    pub async fn snapshot(&self) -> Vec<ExecutionRecord> {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn find_similar(
        &self,
        vector: &FeatureVector,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SimilarRecord>, HistoryError> {
        let log = self.inner.read().await;
        let hits = similarity::top_k_similar(
            vector.as_slice(),
            log.iter(),
            |r: &ExecutionRecord| r.feature_vector.as_slice(),
            threshold,
            limit,
        );
        Ok(hits
            .into_iter()
            .map(|(record, sim)| SimilarRecord::from_record(record, sim))
            .collect())
    }

    async fn append(&self, record: ExecutionRecord) -> Result<(), HistoryError> {
        self.inner.write().await.push(record);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// Writes every record to both a primary and a legacy store.
///
/// Reads go to the primary only. A legacy write failure is logged and does
/// not fail the append; a primary failure does.
pub struct DualWriteHistoryStore {
    primary: Arc<dyn HistoryStore>,
    legacy: Arc<dyn HistoryStore>,
}

impl DualWriteHistoryStore {
    pub fn new(primary: Arc<dyn HistoryStore>, legacy: Arc<dyn HistoryStore>) -> Self {
        Self { primary, legacy }
    }
}

#[async_trait]
impl HistoryStore for DualWriteHistoryStore {
    async fn find_similar(
        &self,
        vector: &FeatureVector,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SimilarRecord>, HistoryError> {
        self.primary.find_similar(vector, threshold, limit).await
    }

    async fn append(&self, record: ExecutionRecord) -> Result<(), HistoryError> {
        let id = record.id;
        let (primary, legacy) = tokio::join!(
            self.primary.append(record.clone()),
            self.legacy.append(record)
        );

        if let Err(e) = legacy {
            warn!(
                record_id = %id,
                store = self.legacy.name(),
                error = %e,
                "Legacy history write failed; continuing with primary only"
            );
        }
        primary
    }

    fn name(&self) -> &'static str {
        "dual_write"
    }
}
