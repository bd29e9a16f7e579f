//! Feature vectorization for workload descriptors.
//!
//! Maps a [`WorkloadDescriptor`] onto a fixed 12-element vector used for
//! similarity search against execution history. The mapping is pure: no I/O,
//! no randomness, identical input gives an identical vector.
//!
//! Layout:
//!
//! | idx | feature                                   | range   |
//! |-----|-------------------------------------------|---------|
//! | 0   | qubits / MAX_QUBITS                       | [0, 1]  |
//! | 1   | depth / MAX_DEPTH                         | [0, 1]  |
//! | 2   | gate count / MAX_GATES                    | [0, 1]  |
//! | 3   | algorithm scalar                          | [0, 1]  |
//! | 4   | data size / MAX_DATA_SIZE                 | [0, 1]  |
//! | 5   | data complexity                           | [0, 1]  |
//! | 6   | log-scaled latency target (0.5 if unset)  | [0, 1]  |
//! | 7   | backend preference from error mitigation  | [0, 1]  |
//! | 8   | gate density `v2 / (v1 + 1e-6)`           | unbounded |
//! | 9   | circuit complexity `v0 * v1`              | [0, 1]  |
//! | 10  | algorithm/data affinity `v3 * v5`         | [0, 1]  |
//! | 11  | latency/backend compatibility `v6 * v7`   | [0, 1]  |

use crate::workload::{Algorithm, ErrorMitigation, WorkloadDescriptor};
use serde::{Deserialize, Serialize};

pub const FEATURE_DIM: usize = 12;

pub const MAX_QUBITS: f64 = 100.0;
pub const MAX_DEPTH: f64 = 1000.0;
pub const MAX_GATES: f64 = 10_000.0;
pub const MAX_DATA_SIZE: f64 = 1_000_000.0;
pub const MAX_LATENCY_MS: f64 = 10_000.0;

/// Number of leading features that are clamped to [0, 1].
pub const CLAMPED_FEATURES: usize = 8;

const DENSITY_EPSILON: f64 = 1e-6;
const UNSET_LATENCY_FEATURE: f64 = 0.5;

/// Fixed-length numeric encoding of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(pub [f64; FEATURE_DIM]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, idx: usize) -> Option<f64> {
        self.0.get(idx).copied()
    }

    /// Rebuild from a stored slice; `None` if the length is wrong.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        <[f64; FEATURE_DIM]>::try_from(values).ok().map(Self)
    }
}

impl AsRef<[f64]> for FeatureVector {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

/// Coarse backend preference derived from the requested error mitigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPreference {
    Classical,
    Hpc,
    Quantum,
}

impl BackendPreference {
    pub fn from_mitigation(mitigation: ErrorMitigation) -> Self {
        match mitigation {
            ErrorMitigation::High => BackendPreference::Quantum,
            ErrorMitigation::Medium => BackendPreference::Hpc,
            ErrorMitigation::Low | ErrorMitigation::None => BackendPreference::Classical,
        }
    }

    pub fn scalar(&self) -> f64 {
        match self {
            BackendPreference::Classical => 0.0,
            BackendPreference::Hpc => 0.5,
            BackendPreference::Quantum => 1.0,
        }
    }
}

/// Algorithm encoding table; algorithms without an entry encode as 0.5.
pub fn algorithm_scalar(algorithm: Algorithm) -> f64 {
    match algorithm {
        Algorithm::Bell => 0.1,
        Algorithm::Grover => 0.3,
        Algorithm::Shor => 0.5,
        Algorithm::Vqe => 0.7,
        Algorithm::Qaoa => 0.9,
        Algorithm::Qft | Algorithm::Unknown => 0.5,
    }
}

fn ratio(value: f64, max: f64) -> f64 {
    (value / max).min(1.0)
}

fn latency_feature(workload: &WorkloadDescriptor) -> f64 {
    match workload.target_latency() {
        Some(ms) => ((ms + 1.0).ln() / MAX_LATENCY_MS.ln()).min(1.0),
        None => UNSET_LATENCY_FEATURE,
    }
}

/// Vectorize a workload. Total: out-of-range inputs are clamped, never rejected.
pub fn vectorize(workload: &WorkloadDescriptor) -> FeatureVector {
    let mut v = [0.0; FEATURE_DIM];

    v[0] = ratio(f64::from(workload.qubits), MAX_QUBITS);
    v[1] = ratio(f64::from(workload.depth), MAX_DEPTH);
    v[2] = ratio(f64::from(workload.gate_count), MAX_GATES);
    v[3] = algorithm_scalar(workload.algorithm);
    v[4] = ratio(workload.data_size as f64, MAX_DATA_SIZE);
    v[5] = workload.normalized_complexity();
    v[6] = latency_feature(workload);
    v[7] = BackendPreference::from_mitigation(workload.error_mitigation).scalar();

    // Derived features: not clamped.
    v[8] = v[2] / (v[1] + DENSITY_EPSILON);
    v[9] = v[0] * v[1];
    v[10] = v[3] * v[5];
    v[11] = v[6] * v[7];

    FeatureVector(v)
}
