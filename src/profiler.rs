//! Workload profiling: a small feature vector describing a register, used as
//! the lookup key of the observer's learning database.

use serde::{Deserialize, Serialize};

use crate::register::{QuantumRegister, QubitData, QubitStatus};

const QUBIT_WEIGHT: f64 = 0.30;
const TIME_WEIGHT: f64 = 0.25;
const FLAG_WEIGHT: f64 = 0.15;
const SIZE_WEIGHT: f64 = 0.15;

/// Qubit count difference at which count similarity drops to zero
const QUBIT_FALLOFF: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadProfile {
    pub qubit_count: u32,
    /// Mean duration of completed qubits, ms
    pub avg_execution_time_ms: u64,
    pub variance: u64,
    pub has_evaluation: bool,
    pub requires_all: bool,
    pub data_size: usize,
}

impl WorkloadProfile {
    /// Relevance of `other` to this profile in [0, 1]
    ///
    /// Qubit count always contributes. Timing and data size only count when
    /// both sides have them, and each flag only counts when the flags agree,
    /// so the score is normalised by the weights that were actually included.
    pub fn similarity(&self, other: &WorkloadProfile) -> f64 {
        let mut score = 0.0;
        let mut weight = 0.0;

        let diff = self.qubit_count.abs_diff(other.qubit_count) as f64;
        let qubit_sim = if diff < QUBIT_FALLOFF {
            1.0 - diff / QUBIT_FALLOFF
        } else {
            0.0
        };
        score += qubit_sim * QUBIT_WEIGHT;
        weight += QUBIT_WEIGHT;

        if self.avg_execution_time_ms > 0 && other.avg_execution_time_ms > 0 {
            score += ratio(self.avg_execution_time_ms as f64, other.avg_execution_time_ms as f64) * TIME_WEIGHT;
            weight += TIME_WEIGHT;
        }

        if self.has_evaluation == other.has_evaluation {
            score += FLAG_WEIGHT;
            weight += FLAG_WEIGHT;
        }
        if self.requires_all == other.requires_all {
            score += FLAG_WEIGHT;
            weight += FLAG_WEIGHT;
        }

        if self.data_size > 0 && other.data_size > 0 {
            score += ratio(self.data_size as f64, other.data_size as f64) * SIZE_WEIGHT;
            weight += SIZE_WEIGHT;
        }

        if weight > 0.0 {
            score / weight
        } else {
            0.0
        }
    }
}

/// Smaller over larger, in (0, 1]
fn ratio(a: f64, b: f64) -> f64 {
    if a > b {
        b / a
    } else {
        a / b
    }
}

/// Profile a register from its configuration and completed qubit timings
pub fn profile<T: QubitData>(register: &QuantumRegister<T>) -> WorkloadProfile {
    let durations: Vec<u64> = register
        .qubits()
        .iter()
        .filter(|q| q.status() == QubitStatus::Completed)
        .map(|q| q.duration_ms())
        .collect();

    let (avg, variance) = if durations.is_empty() {
        (0, 0)
    } else {
        let n = durations.len() as u64;
        let avg = durations.iter().sum::<u64>() / n;
        let variance = durations
            .iter()
            .map(|d| {
                let diff = *d as i64 - avg as i64;
                (diff * diff) as u64
            })
            .sum::<u64>()
            / n;
        (avg, variance)
    };

    WorkloadProfile {
        qubit_count: register.count() as u32,
        avg_execution_time_ms: avg,
        variance,
        has_evaluation: register.has_evaluator(),
        requires_all: register.wait_for_all(),
        data_size: register.data_size(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn base() -> WorkloadProfile {
        WorkloadProfile {
            qubit_count: 8,
            avg_execution_time_ms: 40,
            variance: 10,
            has_evaluation: true,
            requires_all: false,
            data_size: 256,
        }
    }

    #[test]
    fn test_self_similarity_is_one() {
        let p = base();
        assert!((p.similarity(&p) - 1.0).abs() < 1e-9);

        let empty = WorkloadProfile::default();
        assert!((empty.similarity(&empty) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_similarity_bounds() {
        let a = base();
        let b = WorkloadProfile {
            qubit_count: 30,
            avg_execution_time_ms: 1,
            variance: 0,
            has_evaluation: false,
            requires_all: true,
            data_size: 1,
        };
        let s = a.similarity(&b);
        assert!((0.0..=1.0).contains(&s));
        assert!(s < 0.1);
    }

    #[test]
    fn test_qubit_count_falloff() {
        let a = WorkloadProfile {
            qubit_count: 4,
            ..Default::default()
        };
        let b = WorkloadProfile {
            qubit_count: 9,
            ..Default::default()
        };
        // (0.5 * 0.3 + 0.15 + 0.15) / 0.6
        assert!((a.similarity(&b) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_timing_only_counts_when_both_present() {
        let a = base();
        let b = WorkloadProfile {
            avg_execution_time_ms: 0,
            ..base()
        };
        assert!((a.similarity(&b) - 1.0).abs() < 1e-9);

        let c = WorkloadProfile {
            avg_execution_time_ms: 80,
            ..base()
        };
        // (0.3 + 0.5 * 0.25 + 0.15 + 0.15 + 0.15) / 1.0
        assert!((a.similarity(&c) - 0.875).abs() < 1e-9);
    }

    #[test]
    fn test_profile_from_register() {
        let clock = Arc::new(ManualClock::new(0));
        let mut reg = QuantumRegister::<u32>::new(3).unwrap().with_clock(clock.clone());
        for (i, cost) in [10u64, 20, 30].into_iter().enumerate() {
            let c = clock.clone();
            reg.qubit_init(
                i,
                move |_: &mut u32| {
                    c.advance(cost);
                    Ok(())
                },
                0,
                4,
            )
            .unwrap();
        }
        reg.set_wait_all(false);
        reg.set_data_size(64);
        reg.execute().unwrap();

        let p = profile(&reg);
        assert_eq!(p.qubit_count, 3);
        assert_eq!(p.avg_execution_time_ms, 20);
        // (100 + 0 + 100) / 3
        assert_eq!(p.variance, 66);
        assert!(!p.has_evaluation);
        assert!(!p.requires_all);
        assert_eq!(p.data_size, 64);
    }
}
