//! Reward scoring for completed executions.
//!
//! The score feeds back into recommendation voting, where it scales the
//! weight of a historical execution. It is unbounded in both directions.
//!
//! ```text
//! reward = fidelity - latency_penalty + accuracy_bonus + efficiency_bonus
//! ```

/// Cap on the latency penalty
pub const MAX_LATENCY_PENALTY: f64 = 50.0;
const LATENCY_PENALTY_SCALE: f64 = 25.0;
const ACCURACY_BONUS_MAX: f64 = 10.0;
const EFFICIENCY_BONUS_MAX: f64 = 10.0;

/// Breakdown of a reward score, for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardBreakdown {
    pub fidelity_reward: f64,
    pub latency_penalty: f64,
    pub accuracy_bonus: f64,
    pub efficiency_bonus: f64,
}

impl RewardBreakdown {
    pub fn total(&self) -> f64 {
        self.fidelity_reward - self.latency_penalty + self.accuracy_bonus + self.efficiency_bonus
    }
}

/// Compute each reward component.
///
/// Fidelities are on a 0-100 scale. A `target_latency_ms` <= 0 means "no
/// target" and disables the latency penalty.
pub fn reward_breakdown(
    actual_fidelity: f64,
    actual_runtime_ms: f64,
    target_latency_ms: f64,
    predicted_fidelity: f64,
) -> RewardBreakdown {
    let latency_penalty = if target_latency_ms > 0.0 {
        (LATENCY_PENALTY_SCALE * (actual_runtime_ms - target_latency_ms).abs() / target_latency_ms)
            .min(MAX_LATENCY_PENALTY)
    } else {
        0.0
    };

    RewardBreakdown {
        fidelity_reward: actual_fidelity,
        latency_penalty,
        accuracy_bonus: (ACCURACY_BONUS_MAX - (actual_fidelity - predicted_fidelity).abs())
            .max(0.0),
        efficiency_bonus: (EFFICIENCY_BONUS_MAX - (actual_runtime_ms + 1.0).ln()).max(0.0),
    }
}

/// Score a completed execution against its target and prediction.
pub fn reward(
    actual_fidelity: f64,
    actual_runtime_ms: f64,
    target_latency_ms: f64,
    predicted_fidelity: f64,
) -> f64 {
    reward_breakdown(
        actual_fidelity,
        actual_runtime_ms,
        target_latency_ms,
        predicted_fidelity,
    )
    .total()
}
