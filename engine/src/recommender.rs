//! Similarity-weighted recommendation of execution parameters.
//!
//! Given a workload's feature vector, the recommender pulls the most similar
//! past executions from the history store and runs three independent
//! weighted ballots (shots, backend, error mitigation). Each vote weighs
//! `similarity * (1 + max(0, reward) / 100)`.
//!
//! The recommender never fails its caller. If the store is unreachable,
//! times out, lacks similarity search, or returns nothing above the
//! threshold, heuristic defaults are returned with confidence 0.1 and the
//! reason recorded in [`RecommendationResult::fallback`].
//!
//! Ties in a ballot resolve in key order: fewer shots first, cheaper backend
//! first, lower mitigation level first.

use crate::error::{HistoryError, HistoryUnavailable};
use crate::history::{HistoryStore, SimilarRecord};
use crate::metrics;
use crate::policy::heuristic_backend;
use crate::vectorizer::{vectorize, FeatureVector};
use crate::workload::{Backend, ErrorMitigation, WorkloadDescriptor};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Confidence reported for heuristic defaults
pub const FALLBACK_CONFIDENCE: f64 = 0.1;
/// Upper bound on history-backed confidence
pub const MAX_CONFIDENCE: f64 = 0.95;

const MIN_SHOTS: u32 = 100;
const MAX_SHOTS: u32 = 10_000;

/// Tunables for the recommender.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommenderConfig {
    /// Minimum cosine similarity for a past execution to vote
    pub similarity_threshold: f64,
    /// Maximum number of voting executions
    pub max_candidates: usize,
    /// Shot counts are bucketed to multiples of this before voting
    pub shot_bucket: u32,
    /// Deadline for the history query
    pub query_timeout: Duration,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            max_candidates: 80,
            shot_bucket: 100,
            query_timeout: Duration::from_millis(2_000),
        }
    }
}

/// Suggested execution parameters for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResult {
    pub recommended_shots: u32,
    pub recommended_backend: Backend,
    pub recommended_error_mitigation: ErrorMitigation,
    /// In [0, 0.95]
    pub confidence: f64,
    pub reasoning: String,
    pub based_on_executions: usize,
    /// Why history was not used, if it was not
    #[serde(skip)]
    pub fallback: Option<HistoryUnavailable>,
}

impl RecommendationResult {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Weighted ballot with deterministic tie-breaking (lowest key wins).
#[derive(Debug)]
struct Ballot<K: Ord> {
    weights: BTreeMap<K, f64>,
}

impl<K: Ord + Copy> Ballot<K> {
    fn new() -> Self {
        Self {
            weights: BTreeMap::new(),
        }
    }

    fn vote(&mut self, option: K, weight: f64) {
        *self.weights.entry(option).or_insert(0.0) += weight;
    }

    /// Option with the largest weight and its share of the total.
    fn winner(&self) -> Option<(K, f64)> {
        let mut best: Option<(K, f64)> = None;
        for (option, weight) in &self.weights {
            match best {
                Some((_, w)) if *weight <= w => {}
                _ => best = Some((*option, *weight)),
            }
        }
        let total: f64 = self.weights.values().sum();
        best.map(|(k, w)| (k, if total > 0.0 { w / total } else { 0.0 }))
    }
}

/// Heuristic shot count: `1000 * (1 + qubits/20 + depth/100)`, clamped to [100, 10000].
pub fn default_shots(qubits: u32, depth: u32) -> u32 {
    let raw = 1000.0 * (1.0 + f64::from(qubits) / 20.0 + f64::from(depth) / 100.0);
    (raw.round().clamp(f64::from(MIN_SHOTS), f64::from(MAX_SHOTS))) as u32
}

/// Heuristic error mitigation by circuit size.
pub fn default_error_mitigation(qubits: u32, depth: u32) -> ErrorMitigation {
    if qubits >= 20 || depth >= 100 {
        ErrorMitigation::High
    } else if qubits >= 12 || depth >= 50 {
        ErrorMitigation::Medium
    } else {
        ErrorMitigation::Low
    }
}

/// Round to the nearest multiple of `bucket`, never below one bucket.
fn bucket_shots(shots: u32, bucket: u32) -> u32 {
    let bucket = bucket.max(1);
    let rounded = (f64::from(shots) / f64::from(bucket)).round() as u32;
    rounded.max(1).saturating_mul(bucket)
}

fn vote_weight(candidate: &SimilarRecord) -> f64 {
    candidate.similarity * (1.0 + candidate.reward_score.max(0.0) / 100.0)
}

/// Recommends shots, backend and error mitigation from execution history.
pub struct Recommender {
    history: Arc<dyn HistoryStore>,
    config: RecommenderConfig,
}

impl Recommender {
    pub fn new(history: Arc<dyn HistoryStore>, config: RecommenderConfig) -> Self {
        Self { history, config }
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    /// Vectorize `workload` and recommend from history.
    pub async fn recommend(&self, workload: &WorkloadDescriptor) -> RecommendationResult {
        let vector = vectorize(workload);
        self.recommend_for_vector(&vector, workload).await
    }

    /// Recommend for an already computed vector. `workload` supplies the
    /// size and latency inputs of the heuristic fallback.
    #[instrument(
        level = "debug",
        skip(self, vector, workload),
        fields(qubits = workload.qubits, depth = workload.depth, store = self.history.name())
    )]
    pub async fn recommend_for_vector(
        &self,
        vector: &FeatureVector,
        workload: &WorkloadDescriptor,
    ) -> RecommendationResult {
        metrics::RECOMMENDATIONS_TOTAL.inc();

        let result = match self.similar_candidates(vector).await {
            Ok(candidates) => self.vote(&candidates, workload),
            Err(reason) => {
                metrics::RECOMMENDATION_FALLBACKS_TOTAL.inc();
                match &reason {
                    HistoryUnavailable::NoCandidates => {
                        debug!("No similar executions; using heuristic defaults")
                    }
                    HistoryUnavailable::Store(e) => {
                        warn!(error = %e, "History unavailable; using heuristic defaults")
                    }
                }
                heuristic_recommendation(workload, reason)
            }
        };

        debug!(
            shots = result.recommended_shots,
            backend = %result.recommended_backend,
            mitigation = %result.recommended_error_mitigation,
            confidence = result.confidence,
            based_on = result.based_on_executions,
            "Recommendation ready"
        );
        result
    }

    /// Query the store under the configured deadline and keep qualifying candidates.
    async fn similar_candidates(
        &self,
        vector: &FeatureVector,
    ) -> Result<Vec<SimilarRecord>, HistoryUnavailable> {
        let threshold = self.config.similarity_threshold;
        let limit = self.config.max_candidates;

        let timer = metrics::HISTORY_QUERY_LATENCY_SECONDS.start_timer();
        let queried = tokio::time::timeout(
            self.config.query_timeout,
            self.history.find_similar(vector, threshold, limit),
        )
        .await;
        timer.observe_duration();

        let rows = match queried {
            Ok(rows) => rows?,
            Err(_) => {
                return Err(HistoryError::Timeout {
                    timeout_ms: u64::try_from(self.config.query_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                }
                .into())
            }
        };

        // Stores may be looser than asked; re-apply threshold and cap.
        let candidates: Vec<SimilarRecord> = rows
            .into_iter()
            .filter(|c| c.similarity.is_finite() && c.similarity >= threshold)
            .take(limit)
            .collect();

        if candidates.is_empty() {
            return Err(HistoryUnavailable::NoCandidates);
        }
        Ok(candidates)
    }

    fn vote(
        &self,
        candidates: &[SimilarRecord],
        workload: &WorkloadDescriptor,
    ) -> RecommendationResult {
        let mut shots = Ballot::new();
        let mut backends = Ballot::new();
        let mut mitigations = Ballot::new();
        let mut total_weight = 0.0;
        let mut total_similarity = 0.0;

        for candidate in candidates {
            let weight = vote_weight(candidate);
            total_weight += weight;
            total_similarity += candidate.similarity;

            shots.vote(
                bucket_shots(candidate.shots_used, self.config.shot_bucket),
                weight,
            );
            backends.vote(candidate.backend_used, weight);
            if let Some(mitigation) = candidate.error_mitigation {
                mitigations.vote(mitigation, weight);
            }
        }

        let count = candidates.len();
        let heuristic_backend_choice =
            heuristic_backend(workload.qubits, workload.depth, workload.target_latency());

        let (recommended_shots, shot_share) = shots
            .winner()
            .unwrap_or((default_shots(workload.qubits, workload.depth), 0.0));
        let (recommended_backend, backend_share) =
            backends.winner().unwrap_or((heuristic_backend_choice, 0.0));
        let recommended_error_mitigation = mitigations
            .winner()
            .map(|(m, _)| m)
            .unwrap_or_else(|| default_error_mitigation(workload.qubits, workload.depth));

        let confidence = (total_weight / (2.0 * count as f64)).min(MAX_CONFIDENCE);

        let reasoning = format!(
            "Weighted vote over {} similar executions (mean similarity {:.2}): \
             {} shots ({:.0}% of vote weight), {} ({:.0}% of vote weight), {} error mitigation",
            count,
            total_similarity / count as f64,
            recommended_shots,
            shot_share * 100.0,
            recommended_backend,
            backend_share * 100.0,
            recommended_error_mitigation,
        );

        RecommendationResult {
            recommended_shots,
            recommended_backend,
            recommended_error_mitigation,
            confidence,
            reasoning,
            based_on_executions: count,
            fallback: None,
        }
    }
}

/// Size-based defaults used when history cannot answer.
pub fn heuristic_recommendation(
    workload: &WorkloadDescriptor,
    reason: HistoryUnavailable,
) -> RecommendationResult {
    let (qubits, depth) = (workload.qubits, workload.depth);
    RecommendationResult {
        recommended_shots: default_shots(qubits, depth),
        recommended_backend: heuristic_backend(qubits, depth, workload.target_latency()),
        recommended_error_mitigation: default_error_mitigation(qubits, depth),
        confidence: FALLBACK_CONFIDENCE,
        reasoning: format!("Heuristic defaults used ({})", reason),
        based_on_executions: 0,
        fallback: Some(reason),
    }
}
