//! Planck execution engine
//!
//! Decides how a quantum-style workload should run and whether a caller may
//! submit it right now:
//! - feature vectorization of workload descriptors
//! - similarity-weighted recommendation of shots, backend and error mitigation
//! - reward scoring of completed executions
//! - policy-driven backend selection
//! - per-caller token-bucket admission control

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod metrics;
pub mod policy;
pub mod rate_limiter;
pub mod recommender;
pub mod reward;
pub mod similarity;
pub mod vectorizer;
pub mod workload;

pub use config::PlanckConfig;
pub use engine::{OutcomeReceipt, PlanckEngine};
pub use error::{AdmissionError, HistoryError, HistoryUnavailable};
pub use history::{
    DualWriteHistoryStore, ExecutionOutcome, ExecutionRecord, HistoryStore,
    InMemoryHistoryStore, SimilarRecord, RECORD_SCHEMA_VERSION,
};
pub use policy::{
    BackendPolicy, BackendProfile, CircuitMetrics, DecisionSource, LatencyAwareSelector,
    OptimalBackendSelector, PolicyDecision, PolicyInput, PolicyName,
};
pub use rate_limiter::{
    AdmissionDecision, InMemoryRateLimitStore, RateLimitPolicy, RateLimitStore, RateLimiter,
    MAX_PAYLOAD_BYTES,
};
pub use recommender::{RecommendationResult, Recommender, RecommenderConfig};
pub use reward::reward;
pub use similarity::cosine_similarity;
pub use vectorizer::{vectorize, FeatureVector, FEATURE_DIM};
pub use workload::{Algorithm, Backend, ErrorMitigation, WorkloadDescriptor};
