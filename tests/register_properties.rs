//! Register-level guarantees: idempotent collapse, index-ordered gathering,
//! explicit validation failures, adaptive switch budget and bus overflow.

use std::sync::Arc;

mod common;

use common::*;
use qarma_register::collapse::MultiDimCriteria;
use qarma_register::error::{BusError, CollapseError, QarmaError};
use qarma_register::profiler::WorkloadProfile;
use qarma_register::{
    AdaptivePolicy, AdaptiveThresholds, AiObserver, CollapseStrategy, ManualClock, MessageBus,
    MessageType, ObserverConfig, QubitStatus, BROADCAST,
};

#[test]
fn test_collapse_is_idempotent() {
    let mut reg = executed(&[3i64, 9, 4]);
    let calls = CallCounter::default();
    let counter = calls.clone();
    reg.set_custom_collapse(move |results: &[&i64], out: &mut i64| {
        counter.hit();
        *out = results.iter().copied().max().copied().unwrap_or_default();
    });

    let first = reg.collapse().unwrap() as *const i64;
    let second = reg.collapse().unwrap() as *const i64;
    assert_eq!(first, second);
    assert_eq!(calls.get(), 1);
    assert_eq!(reg.output(), Some(&9));

    // reset opens the door to a fresh collapse
    reg.reset();
    reg.execute().unwrap();
    reg.collapse().unwrap();
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_first_wins_follows_index_order_not_completion_order() {
    // qubit 0 finishes last in wall-clock time
    let mut reg = racing_register(&[60, 5, 1, 10]);
    reg.execute().unwrap();
    assert!(reg.is_complete());
    assert_eq!(*reg.collapse().unwrap(), 0);

    reg.reset();
    reg.set_strategy(CollapseStrategy::LastWins);
    reg.execute().unwrap();
    assert_eq!(*reg.collapse().unwrap(), 3);
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Reading {
    sensor: u32,
    bytes: [u8; 12],
}

#[test]
fn test_validate_accepts_identical_and_rejects_one_byte_difference() {
    let sample = Reading {
        sensor: 7,
        bytes: *b"calibrated!!",
    };
    let mut reg = executed(&[sample.clone(), sample.clone(), sample.clone()]);
    reg.set_strategy(CollapseStrategy::Validate);
    assert_eq!(reg.collapse().unwrap(), &sample);

    let mut odd = sample.clone();
    odd.bytes[11] = b'?';
    let mut reg = executed(&[sample.clone(), odd, sample]);
    reg.set_strategy(CollapseStrategy::Validate);
    match reg.collapse() {
        Err(QarmaError::Collapse(CollapseError::ValidationMismatch { index })) => assert_eq!(index, 1),
        other => panic!("expected a validation mismatch, got {:?}", other),
    }
    assert!(!reg.is_collapsed());
    assert_eq!(reg.output(), None);
}

#[test]
fn test_combine_sums_four_ranges() {
    let mut reg = qarma_register::QuantumRegister::<u64>::new(4).unwrap();
    for i in 0..4 {
        let start = i as u64 * 25;
        reg.qubit_init(
            i,
            move |out: &mut u64| {
                *out = (start..start + 25).sum();
                Ok(())
            },
            0,
            8,
        )
        .unwrap();
    }
    reg.set_combine(|results: &[&u64], out: &mut u64| *out = results.iter().copied().sum());
    reg.set_strategy(CollapseStrategy::Combine);
    assert!(reg.execute_sync().unwrap());
    assert_eq!(*reg.collapse().unwrap(), 4950);
}

#[test]
fn test_best_selects_lowest_cost() {
    let mut reg = executed(&[42i64, 17, 99, 23]);
    reg.set_evaluate(|cost: &i64| -(*cost as i32));
    reg.set_strategy(CollapseStrategy::Best);
    assert_eq!(*reg.collapse().unwrap(), 17);
}

#[test]
fn test_adaptive_switches_at_most_once_per_execution() {
    let clock = Arc::new(ManualClock::new(0));
    let mut reg = timed_register(&clock, &[400, 400, 400, 400, 400]);
    reg.set_wait_all(false);
    let observer = Arc::new(AiObserver::new(ObserverConfig::default()));

    for policy in [
        AdaptivePolicy::Timeout,
        AdaptivePolicy::FailureRate,
        AdaptivePolicy::Quality,
        AdaptivePolicy::Aggressive,
    ] {
        reg.set_strategy(CollapseStrategy::FirstWins);
        reg.adaptive_init(policy, observer.clone());
        reg.adaptive_set_thresholds(AdaptiveThresholds {
            timeout_ms: 100,
            failure_rate_threshold: 0.0,
            quality_threshold: 0.9,
            check_interval_ms: 0,
        })
        .unwrap();
        reg.adaptive_report_quality(0.1).unwrap();

        for _ in 0..3 {
            reg.reset();
            reg.execute().unwrap();
            let state = reg.adaptive_get_state().unwrap();
            assert!(state.switch_count <= 1, "{:?} switched {} times", policy, state.switch_count);
        }

        reg.adaptive_reset().unwrap();
        assert_eq!(reg.strategy(), CollapseStrategy::FirstWins);
        assert_eq!(reg.adaptive_get_state().unwrap().switch_count, 0);
    }
}

#[test]
fn test_adaptive_switch_keeps_register_collapsible() {
    // defaults: FirstWins, wait for all, no evaluator or combiner
    let clock = Arc::new(ManualClock::new(0));
    let mut reg = timed_register(&clock, &[400, 400, 400, 400, 400]);
    reg.adaptive_init(
        AdaptivePolicy::Timeout,
        Arc::new(AiObserver::new(ObserverConfig::default())),
    );
    reg.adaptive_set_thresholds(AdaptiveThresholds {
        timeout_ms: 100,
        check_interval_ms: 0,
        ..AdaptiveThresholds::default()
    })
    .unwrap();

    reg.execute().unwrap();
    assert_eq!(reg.adaptive_get_state().unwrap().switch_count, 1);
    let strategy = reg.strategy();
    assert_ne!(strategy, CollapseStrategy::Combine);
    assert!(reg.can_collapse_with(strategy));
    assert!(reg.collapse().is_ok(), "{:?} could not collapse", strategy);
}

#[test]
fn test_similarity_bounds() {
    let profiles = [
        WorkloadProfile::default(),
        WorkloadProfile {
            qubit_count: 4,
            avg_execution_time_ms: 12,
            variance: 3,
            has_evaluation: true,
            requires_all: true,
            data_size: 64,
        },
        WorkloadProfile {
            qubit_count: 64,
            avg_execution_time_ms: 1,
            variance: 900,
            has_evaluation: false,
            requires_all: true,
            data_size: 0,
        },
        WorkloadProfile {
            qubit_count: 1,
            avg_execution_time_ms: 10_000,
            variance: 0,
            has_evaluation: true,
            requires_all: false,
            data_size: 1 << 20,
        },
    ];

    for a in &profiles {
        assert!((a.similarity(a) - 1.0).abs() < 1e-9);
        for b in &profiles {
            let s = a.similarity(b);
            assert!((0.0..=1.0).contains(&s), "similarity {} out of range", s);
        }
    }
}

#[test]
fn test_bus_overflow_drops_without_corruption() {
    let bus = MessageBus::default();
    for i in 0..64u32 {
        bus.send(i % 4, MessageType::PartialResult, &i.to_le_bytes(), BROADCAST)
            .unwrap();
    }
    assert_eq!(
        bus.send(1, MessageType::PartialResult, b"overflow", BROADCAST),
        Err(BusError::QueueFull { capacity: 64 })
    );
    assert_eq!(bus.stats().messages_dropped, 1);

    // qubit 0 sees everything except its own messages, in order
    let mut seen = Vec::new();
    while let Some(m) = bus.receive(0) {
        seen.push(u32::from_le_bytes([m.payload[0], m.payload[1], m.payload[2], m.payload[3]]));
    }
    let expected: Vec<u32> = (0..64).filter(|i| i % 4 != 0).collect();
    assert_eq!(seen, expected);
    assert_eq!(bus.pending(), 16);
}

#[test]
fn test_multidim_single_weight_matches_best() {
    let values = [12i64, 80, 45, 80, 3];
    let quality = |v: &i64| (*v as i32) * 2 - 7;

    let mut best = executed(&values);
    best.set_evaluate(quality);
    best.set_strategy(CollapseStrategy::Best);
    let expected = *best.collapse().unwrap();

    let mut multi = executed(&values);
    multi.set_multidim(MultiDimCriteria {
        quality: Some(Arc::new(quality)),
        speed: Some(Arc::new(|v: &i64| -(*v as i32))),
        resource: None,
        quality_weight: 100,
        speed_weight: 0,
        resource_weight: 0,
    });
    multi.set_strategy(CollapseStrategy::MultiDim);
    assert_eq!(*multi.collapse().unwrap(), expected);
}

#[test]
fn test_disabled_qubits_are_skipped_and_not_counted() {
    let mut reg = value_register(&[1u8, 2, 3]);
    reg.set_enabled(1, false).unwrap();
    reg.execute().unwrap();

    assert_eq!(reg.qubit(1).unwrap().status(), QubitStatus::Skipped);
    assert!(reg.is_complete());
    assert_eq!(reg.completed_count(), 2);
    assert_eq!(reg.get_qubit_result(1), None);
    reg.set_strategy(CollapseStrategy::LastWins);
    assert_eq!(*reg.collapse().unwrap(), 3);
}
