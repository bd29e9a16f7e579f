//! Error kinds surfaced by the engine.
//!
//! Only admission errors change caller-visible control flow. History errors
//! are recovered inside the recommender and reported alongside the
//! recommendation as a [`HistoryUnavailable`] reason.

use thiserror::Error;

/// Failures reported by a history store implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// Store could not be reached (network, pool exhaustion, ...)
    #[error("history store unreachable: {0}")]
    Unreachable(String),

    /// Store does not provide the requested capability
    #[error("history store does not support {0}")]
    Unsupported(&'static str),

    /// Call exceeded its deadline
    #[error("history store call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Store refused the record or the query
    #[error("history store rejected request: {0}")]
    Rejected(String),
}

/// Why a recommendation fell back to heuristic defaults.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryUnavailable {
    #[error(transparent)]
    Store(#[from] HistoryError),

    #[error("no similar executions above similarity threshold")]
    NoCandidates,
}

/// Typed admission rejections returned to the gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimitExceeded { retry_after_ms: u64 },

    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl AdmissionError {
    /// Retry hint for the caller; zero for rejections that retrying will not fix.
    pub fn retry_after_ms(&self) -> u64 {
        match self {
            AdmissionError::RateLimitExceeded { retry_after_ms } => *retry_after_ms,
            AdmissionError::PayloadTooLarge { .. } => 0,
        }
    }
}
