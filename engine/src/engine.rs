//! Engine facade used by the execution orchestrator and the admission gateway.
//!
//! Wires the recommender, backend policy, rate limiter and history store
//! together behind the five caller-facing operations:
//! `recommend`, `select_backend`, `admit`, `score_outcome` and `record_outcome`.

use crate::config::PlanckConfig;
use crate::error::{AdmissionError, HistoryError};
use crate::history::{ExecutionOutcome, ExecutionRecord, HistoryStore, InMemoryHistoryStore};
use crate::metrics;
use crate::policy::{BackendPolicy, PolicyDecision, PolicyInput};
use crate::rate_limiter::{AdmissionDecision, RateLimiter};
use crate::recommender::{RecommendationResult, Recommender};
use crate::reward;
use crate::vectorizer::vectorize;
use crate::workload::WorkloadDescriptor;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Result of recording a completed execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeReceipt {
    pub record_id: Uuid,
    pub reward: f64,
    /// False when the history append failed or timed out
    pub persisted: bool,
}

pub struct PlanckEngine {
    history: Arc<dyn HistoryStore>,
    recommender: Recommender,
    policy: BackendPolicy,
    rate_limiter: Arc<RateLimiter>,
    append_timeout: Duration,
}

impl PlanckEngine {
    /// Build every component from `config` on top of `history`.
    pub fn new(history: Arc<dyn HistoryStore>, config: &PlanckConfig) -> Self {
        let recommender = Recommender::new(Arc::clone(&history), config.recommender_config());
        let policy = BackendPolicy::new(config.default_policy());
        let rate_limiter = Arc::new(
            RateLimiter::new(config.rate_limit_policy())
                .with_max_payload_bytes(config.rate_limit.max_payload_bytes),
        );

        info!(
            history_store = history.name(),
            default_policy = %policy.default_policy(),
            similarity_threshold = config.recommender.similarity_threshold,
            max_candidates = config.recommender.max_candidates,
            refill_interval_ms = config.rate_limit.refill_interval_ms,
            "Planck engine initialised"
        );

        Self {
            history,
            recommender,
            policy,
            rate_limiter,
            append_timeout: config.append_timeout(),
        }
    }

    /// Engine over a fresh in-memory history log.
    pub fn in_memory(config: &PlanckConfig) -> Self {
        Self::new(Arc::new(InMemoryHistoryStore::new()), config)
    }

    /// Replace the backend policy (e.g. to inject a custom optimal-backend selector).
    pub fn with_policy(mut self, policy: BackendPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the rate limiter (e.g. one backed by a shared bucket store).
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn policy(&self) -> &BackendPolicy {
        &self.policy
    }

    /// Recommend shots, backend and error mitigation for a workload.
    pub async fn recommend(&self, workload: &WorkloadDescriptor) -> RecommendationResult {
        self.recommender.recommend(workload).await
    }

    pub fn select_backend(&self, input: &PolicyInput) -> PolicyDecision {
        let decision = self.policy.select_backend(input);
        debug!(
            backend = %decision.backend,
            policy = %decision.metadata.policy,
            reason = %decision.reason,
            "Backend selected"
        );
        decision
    }

    /// Admission check as a typed result.
    pub fn try_admit(&self, id: &str, payload_bytes: usize) -> Result<(), AdmissionError> {
        self.rate_limiter.admit(id, payload_bytes)
    }

    /// Admission check in gateway form: `{allowed, retryAfterMs}`.
    pub fn admit(&self, id: &str, payload_bytes: usize) -> AdmissionDecision {
        AdmissionDecision::from(&self.try_admit(id, payload_bytes))
    }

    pub fn score_outcome(
        &self,
        actual_fidelity: f64,
        actual_runtime_ms: f64,
        target_latency_ms: f64,
        predicted_fidelity: f64,
    ) -> f64 {
        reward::reward(
            actual_fidelity,
            actual_runtime_ms,
            target_latency_ms,
            predicted_fidelity,
        )
    }

    /// Score a completed execution and append it to history.
    ///
    /// Append failures and timeouts are logged and reported through
    /// `persisted`; they never fail the call.
    #[instrument(
        skip(self, workload, outcome),
        fields(backend = %outcome.backend_used, shots = outcome.shots_used)
    )]
    pub async fn record_outcome(
        &self,
        workload: &WorkloadDescriptor,
        outcome: &ExecutionOutcome,
    ) -> OutcomeReceipt {
        let reward = self.score_outcome(
            outcome.success_rate,
            outcome.runtime_ms,
            workload.target_latency().unwrap_or(0.0),
            outcome.predicted_fidelity,
        );
        let record = ExecutionRecord::new(vectorize(workload), workload, outcome, reward);
        let record_id = record.id;

        let appended = match tokio::time::timeout(self.append_timeout, self.history.append(record))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(HistoryError::Timeout {
                timeout_ms: u64::try_from(self.append_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        let persisted = match appended {
            Ok(()) => true,
            Err(e) => {
                metrics::HISTORY_APPEND_FAILURES_TOTAL.inc();
                warn!(
                    error = %e,
                    store = self.history.name(),
                    %record_id,
                    "Failed to append execution record"
                );
                false
            }
        };

        debug!(%record_id, reward, persisted, "Execution outcome recorded");
        OutcomeReceipt {
            record_id,
            reward,
            persisted,
        }
    }

    /// Start the idle-bucket sweeper on the current tokio runtime.
    pub fn spawn_rate_limit_sweeper(&self, every: Duration) -> JoinHandle<()> {
        self.rate_limiter.spawn_sweeper(every)
    }
}
