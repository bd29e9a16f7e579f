// Workload description types shared by the vectorizer, recommender and policy layer.
//
// Inputs arrive from the execution orchestrator as loosely typed JSON; every
// field is normalised here rather than rejected so that vectorization stays
// total (malformed values are clamped or defaulted, never thrown).

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Algorithm family of the submitted circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Bell,
    Grover,
    Shor,
    Vqe,
    Qaoa,
    Qft,
    /// Anything the API layer did not recognise
    Unknown,
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match LooseValue::deserialize(deserializer)? {
            LooseValue::Text(raw) => Algorithm::parse_lenient(&raw),
            _ => Algorithm::Unknown,
        })
    }
}

impl Algorithm {
    /// Lenient parse: trims and lowercases, unknown names become `Unknown`.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or(Algorithm::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Bell => "bell",
            Algorithm::Grover => "grover",
            Algorithm::Shor => "shor",
            Algorithm::Vqe => "vqe",
            Algorithm::Qaoa => "qaoa",
            Algorithm::Qft => "qft",
            Algorithm::Unknown => "unknown",
        }
    }
}

impl FromStr for Algorithm {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bell" => Ok(Algorithm::Bell),
            "grover" => Ok(Algorithm::Grover),
            "shor" => Ok(Algorithm::Shor),
            "vqe" => Ok(Algorithm::Vqe),
            "qaoa" => Ok(Algorithm::Qaoa),
            "qft" => Ok(Algorithm::Qft),
            other => Err(UnknownVariant::new("algorithm", other)),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse noise-reduction setting requested for an execution.
///
/// Variant order is the tie-break order used by the recommender ballots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMitigation {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl ErrorMitigation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorMitigation::None => "none",
            ErrorMitigation::Low => "low",
            ErrorMitigation::Medium => "medium",
            ErrorMitigation::High => "high",
        }
    }
}

impl<'de> Deserialize<'de> for ErrorMitigation {
    /// Case-insensitive; unrecognised values become `None`.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match LooseValue::deserialize(deserializer)? {
            LooseValue::Text(raw) => raw.parse().unwrap_or_default(),
            _ => ErrorMitigation::None,
        })
    }
}

impl FromStr for ErrorMitigation {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ErrorMitigation::None),
            "low" => Ok(ErrorMitigation::Low),
            "medium" => Ok(ErrorMitigation::Medium),
            "high" => Ok(ErrorMitigation::High),
            other => Err(UnknownVariant::new("error mitigation", other)),
        }
    }
}

impl fmt::Display for ErrorMitigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution backends, declared in ascending cost order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Cheap, low capacity
    QuantumInspiredGpu,
    /// Mid cost, high capacity
    HpcGpu,
    /// Expensive, lowest capacity, highest noise
    QuantumQpu,
}

impl Backend {
    pub const ALL: [Backend; 3] = [
        Backend::QuantumInspiredGpu,
        Backend::HpcGpu,
        Backend::QuantumQpu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::QuantumInspiredGpu => "quantum_inspired_gpu",
            Backend::HpcGpu => "hpc_gpu",
            Backend::QuantumQpu => "quantum_qpu",
        }
    }

    /// Fixed cost order: quantum_inspired_gpu < hpc_gpu < quantum_qpu
    pub fn cost_rank(&self) -> u8 {
        match self {
            Backend::QuantumInspiredGpu => 0,
            Backend::HpcGpu => 1,
            Backend::QuantumQpu => 2,
        }
    }
}

impl FromStr for Backend {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quantum_inspired_gpu" => Ok(Backend::QuantumInspiredGpu),
            "hpc_gpu" => Ok(Backend::HpcGpu),
            "quantum_qpu" => Ok(Backend::QuantumQpu),
            other => Err(UnknownVariant::new("backend", other)),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by the `FromStr` impls in this module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Per-request description of a workload, as supplied by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadDescriptor {
    #[serde(deserialize_with = "lenient_u32")]
    pub qubits: u32,
    #[serde(deserialize_with = "lenient_u32")]
    pub depth: u32,
    #[serde(deserialize_with = "lenient_u32")]
    pub gate_count: u32,
    pub algorithm: Algorithm,
    #[serde(deserialize_with = "lenient_u64")]
    pub data_size: u64,
    /// Expected in [0, 1]; clamped by the vectorizer
    #[serde(deserialize_with = "lenient_f64")]
    pub data_complexity: f64,
    /// 0 means "no latency target"
    #[serde(deserialize_with = "lenient_f64")]
    pub target_latency_ms: f64,
    pub error_mitigation: ErrorMitigation,
    /// Expected in [0, 1]
    #[serde(deserialize_with = "lenient_f64")]
    pub user_historical_accuracy: f64,
}

impl Default for WorkloadDescriptor {
    fn default() -> Self {
        Self {
            qubits: 0,
            depth: 0,
            gate_count: 0,
            algorithm: Algorithm::Vqe,
            data_size: 0,
            data_complexity: 0.0,
            target_latency_ms: 0.0,
            error_mitigation: ErrorMitigation::None,
            user_historical_accuracy: 0.5,
        }
    }
}

impl WorkloadDescriptor {
    /// Latency target in milliseconds, `None` when unset or not a positive finite number.
    pub fn target_latency(&self) -> Option<f64> {
        (self.target_latency_ms.is_finite() && self.target_latency_ms > 0.0)
            .then_some(self.target_latency_ms)
    }

    /// Data complexity clamped to [0, 1]; NaN counts as 0.
    pub fn normalized_complexity(&self) -> f64 {
        finite_or_zero(self.data_complexity).clamp(0.0, 1.0)
    }

    /// Historical accuracy clamped to [0, 1]; NaN counts as 0.
    pub fn normalized_accuracy(&self) -> f64 {
        finite_or_zero(self.user_historical_accuracy).clamp(0.0, 1.0)
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Any JSON value. Descriptor fields go through this so a malformed field
/// is defaulted instead of failing the whole request.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseValue {
    Number(f64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

impl LooseValue {
    /// Numeric reading; NaN when there is none.
    fn to_f64(&self) -> f64 {
        match self {
            LooseValue::Number(v) => *v,
            LooseValue::Text(raw) => raw.trim().parse().unwrap_or(f64::NAN),
            LooseValue::Other(_) => f64::NAN,
        }
    }
}

// Float-to-int `as` casts saturate and map NaN to 0, which is the clamp we want.
fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(LooseValue::deserialize(deserializer)?.to_f64().round() as u32)
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(LooseValue::deserialize(deserializer)?.to_f64().round() as u64)
}

/// Unreadable values become NaN, which the normalising accessors treat as unset.
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(LooseValue::deserialize(deserializer)?.to_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse_is_lenient() {
        assert_eq!(Algorithm::parse_lenient("  VQE "), Algorithm::Vqe);
        assert_eq!(Algorithm::parse_lenient("Grover"), Algorithm::Grover);
        assert_eq!(Algorithm::parse_lenient("deutsch"), Algorithm::Unknown);
    }

    #[test]
    fn test_backend_round_trips_through_str() {
        for backend in Backend::ALL {
            assert_eq!(backend.as_str().parse::<Backend>().unwrap(), backend);
        }
        assert!("auto".parse::<Backend>().is_err());
    }

    #[test]
    fn test_backend_cost_order_matches_declaration_order() {
        let mut sorted = Backend::ALL;
        sorted.sort_by_key(|b| b.cost_rank());
        assert_eq!(sorted, Backend::ALL);
    }

    #[test]
    fn test_descriptor_deserializes_camel_case_with_defaults() {
        let json = r#"{"qubits":6,"depth":20,"gateCount":40,"algorithm":"teleport","errorMitigation":"high"}"#;
        let w: WorkloadDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(w.qubits, 6);
        assert_eq!(w.gate_count, 40);
        assert_eq!(w.algorithm, Algorithm::Unknown);
        assert_eq!(w.error_mitigation, ErrorMitigation::High);
        assert_eq!(w.target_latency(), None);

        let w: WorkloadDescriptor = serde_json::from_str(r#"{"algorithm":" QAOA"}"#).unwrap();
        assert_eq!(w.algorithm, Algorithm::Qaoa);
    }

    #[test]
    fn test_error_mitigation_parse_is_lenient() {
        let parse = |json: &str| serde_json::from_str::<WorkloadDescriptor>(json).unwrap();
        assert_eq!(parse(r#"{"errorMitigation":"HIGH"}"#).error_mitigation, ErrorMitigation::High);
        assert_eq!(parse(r#"{"errorMitigation":" Medium "}"#).error_mitigation, ErrorMitigation::Medium);
        assert_eq!(parse(r#"{"errorMitigation":"extreme"}"#).error_mitigation, ErrorMitigation::None);
        assert_eq!(parse(r#"{"errorMitigation":3}"#).error_mitigation, ErrorMitigation::None);
    }

    #[test]
    fn test_malformed_counts_are_clamped_not_rejected() {
        let json = r#"{"qubits":-3,"depth":20.6,"gateCount":"40","dataSize":-1,"algorithm":7}"#;
        let w: WorkloadDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(w.qubits, 0);
        assert_eq!(w.depth, 21);
        assert_eq!(w.gate_count, 40);
        assert_eq!(w.data_size, 0);
        assert_eq!(w.algorithm, Algorithm::Unknown);

        let w: WorkloadDescriptor = serde_json::from_str(r#"{"qubits":1e12}"#).unwrap();
        assert_eq!(w.qubits, u32::MAX);
    }

    #[test]
    fn test_malformed_floats_fall_back_to_unset() {
        let json = r#"{"targetLatencyMs":"soon","dataComplexity":null,"userHistoricalAccuracy":"0.8"}"#;
        let w: WorkloadDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(w.target_latency(), None);
        assert_eq!(w.normalized_complexity(), 0.0);
        assert_eq!(w.normalized_accuracy(), 0.8);
    }

    #[test]
    fn test_non_finite_inputs_are_normalized() {
        let w = WorkloadDescriptor {
            data_complexity: f64::NAN,
            target_latency_ms: f64::INFINITY,
            user_historical_accuracy: 3.0,
            ..Default::default()
        };
        assert_eq!(w.normalized_complexity(), 0.0);
        assert_eq!(w.target_latency(), None);
        assert_eq!(w.normalized_accuracy(), 1.0);
    }
}
