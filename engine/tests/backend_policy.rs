// Backend selection through the public API

use planck_engine::{
    Backend, BackendPolicy, CircuitMetrics, DecisionSource, ErrorMitigation,
    OptimalBackendSelector, PolicyInput, PolicyName,
};
use std::sync::Arc;

fn input(qubits: u32, depth: u32) -> PolicyInput {
    PolicyInput {
        qubits,
        depth,
        gate_count: qubits * depth,
        ..Default::default()
    }
}

/// Always answers the same backend
struct FixedSelector(Backend);

impl OptimalBackendSelector for FixedSelector {
    fn optimal_backend(&self, _metrics: &CircuitMetrics, _target_latency_ms: Option<f64>) -> Backend {
        self.0
    }
}

#[test]
fn test_manual_hint_wins_regardless_of_size() {
    let policy = BackendPolicy::default();
    for (q, d) in [(2, 5), (30, 500), (120, 50)] {
        let decision = policy.select_backend(&PolicyInput {
            backend_hint: Some("hpc_gpu".into()),
            ..input(q, d)
        });
        assert_eq!(decision.backend, Backend::HpcGpu);
        assert_eq!(decision.metadata.source, DecisionSource::Manual);
    }
}

#[test]
fn test_high_mitigation_upgrades_qpu() {
    let decision = BackendPolicy::default().select_backend(&PolicyInput {
        backend_hint: Some("quantum_qpu".into()),
        error_mitigation: ErrorMitigation::High,
        ..input(10, 10)
    });
    assert_eq!(decision.backend, Backend::HpcGpu);
    assert!(decision.reason.contains("upgraded"), "{}", decision.reason);
}

#[test]
fn test_auto_qpu_choice_is_upgraded_too() {
    let policy = BackendPolicy::with_selector(
        PolicyName::LatencyFirst,
        Arc::new(FixedSelector(Backend::QuantumQpu)),
    );
    let decision = policy.select_backend(&PolicyInput {
        error_mitigation: ErrorMitigation::High,
        ..input(50, 100)
    });
    assert_eq!(decision.backend, Backend::HpcGpu);
    assert_eq!(decision.metadata.source, DecisionSource::Auto);
    assert_eq!(decision.metadata.upgraded_from, Some(Backend::QuantumQpu));
}

#[test]
fn test_capacity_first_large_circuit_goes_to_hpc() {
    let policy = BackendPolicy::default();
    for depth in [1, 50, 5_000] {
        let decision = policy.select_backend(&PolicyInput {
            policy: Some("capacity_first".into()),
            ..input(25, depth)
        });
        assert_eq!(decision.backend, Backend::HpcGpu);
        assert_eq!(decision.metadata.policy, PolicyName::CapacityFirst);
    }
}

#[test]
fn test_auto_hint_defers_to_policy() {
    let policy = BackendPolicy::with_selector(
        PolicyName::LatencyFirst,
        Arc::new(FixedSelector(Backend::QuantumQpu)),
    );
    let decision = policy.select_backend(&PolicyInput {
        backend_hint: Some("auto".into()),
        ..input(50, 100)
    });
    assert_eq!(decision.backend, Backend::QuantumQpu);
    assert_eq!(decision.metadata.source, DecisionSource::Auto);
}

#[test]
fn test_unknown_policy_name_falls_back_to_latency_first() {
    let policy = BackendPolicy::new(PolicyName::CostFirst);
    let decision = policy.select_backend(&PolicyInput {
        policy: Some("cheapest_possible".into()),
        ..input(4, 10)
    });
    assert_eq!(decision.metadata.policy, PolicyName::LatencyFirst);
}

#[test]
fn test_cost_first_never_exceeds_optimal_cost() {
    let policy = BackendPolicy::with_selector(
        PolicyName::CostFirst,
        Arc::new(FixedSelector(Backend::HpcGpu)),
    );
    let small = policy.select_backend(&input(4, 10));
    assert_eq!(small.backend, Backend::QuantumInspiredGpu);

    // Too large for the cheapest tier
    let large = policy.select_backend(&input(30, 200));
    assert_eq!(large.backend, Backend::HpcGpu);
}
