//! Predictive scheduler: estimates per-qubit run time, proposes a dispatch
//! order and learns actual durations keyed by declared result size.

use parking_lot::Mutex;
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::register::{QuantumRegister, QubitData, QubitStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleStrategy {
    Sequential,
    Random,
    LongestFirst,
    ShortestFirst,
    Balanced,
    AiPredicted,
}

impl Default for ScheduleStrategy {
    fn default() -> Self {
        Self::AiPredicted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub strategy: ScheduleStrategy,
    /// Distinct result sizes remembered; further sizes are not learned
    pub pattern_capacity: usize,
    /// Relative error under which a prediction counts as accurate
    pub accuracy_tolerance: f64,
    /// Weight of the previous average prediction error
    pub error_smoothing: f64,
    pub learned_confidence: f64,
    pub heuristic_confidence: f64,
    /// Complexity units per byte of result
    pub complexity_factor: u64,
    /// Shuffle under `Random` instead of keeping index order
    pub randomize: bool,
    pub seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: ScheduleStrategy::AiPredicted,
            pattern_capacity: 32,
            accuracy_tolerance: 0.2,
            error_smoothing: 0.7,
            learned_confidence: 0.8,
            heuristic_confidence: 0.3,
            complexity_factor: 10,
            randomize: false,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QubitPrediction {
    pub qubit_index: usize,
    pub predicted_time_ms: u64,
    pub confidence: f64,
    pub complexity_score: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub data_size: usize,
    pub avg_time_ms: u64,
    pub sample_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub strategy: ScheduleStrategy,
    pub total_scheduled: u64,
    pub predictions_accurate: u64,
    pub pattern_count: usize,
    pub avg_prediction_error: f64,
}

struct SchedulerState {
    strategy: ScheduleStrategy,
    predictions: Vec<QubitPrediction>,
    patterns: Vec<LearnedPattern>,
    total_scheduled: u64,
    predictions_accurate: u64,
    avg_prediction_error: f64,
    rng: StdRng,
}

impl SchedulerState {
    fn new(config: &SchedulerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            strategy: config.strategy,
            predictions: Vec::new(),
            patterns: Vec::with_capacity(config.pattern_capacity),
            total_scheduled: 0,
            predictions_accurate: 0,
            avg_prediction_error: 0.0,
            rng,
        }
    }

    fn learned_time(&self, data_size: usize) -> Option<u64> {
        self.patterns
            .iter()
            .find(|p| p.data_size == data_size)
            .map(|p| p.avg_time_ms)
            .filter(|t| *t > 0)
    }
}

pub struct PredictiveScheduler {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl Default for PredictiveScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl PredictiveScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        info!("Quantum scheduler initialising with {:?}", config.strategy);
        Self {
            state: Mutex::new(SchedulerState::new(&config)),
            config,
        }
    }

    /// Forget learned patterns, predictions and statistics
    pub fn init(&self) {
        *self.state.lock() = SchedulerState::new(&self.config);
        info!("Quantum scheduler reset");
    }

    pub fn set_strategy(&self, strategy: ScheduleStrategy) {
        self.state.lock().strategy = strategy;
        debug!("Scheduler: strategy set to {:?}", strategy);
    }

    pub fn strategy(&self) -> ScheduleStrategy {
        self.state.lock().strategy
    }

    /// Estimate every qubit's run time, replacing earlier predictions
    pub fn predict<T: QubitData>(&self, register: &QuantumRegister<T>) {
        let mut state = self.state.lock();
        let predictions: Vec<QubitPrediction> = register
            .qubits()
            .iter()
            .enumerate()
            .map(|(i, qubit)| {
                let complexity = qubit.result_size() as u64 * self.config.complexity_factor;
                let prediction = match state.learned_time(qubit.result_size()) {
                    Some(learned) => QubitPrediction {
                        qubit_index: i,
                        predicted_time_ms: learned,
                        confidence: self.config.learned_confidence,
                        complexity_score: complexity,
                    },
                    None => QubitPrediction {
                        qubit_index: i,
                        predicted_time_ms: (complexity / 100).max(1),
                        confidence: self.config.heuristic_confidence,
                        complexity_score: complexity,
                    },
                };
                trace!(
                    "Scheduler: qubit {} predicted {}ms (confidence {:.1})",
                    i,
                    prediction.predicted_time_ms,
                    prediction.confidence
                );
                prediction
            })
            .collect();

        state.total_scheduled += predictions.len() as u64;
        debug!("Scheduler: predicted {} qubits", predictions.len());
        state.predictions = predictions;
    }

    /// Dispatch order for `register`, or `None` before any matching prediction
    pub fn get_order<T: QubitData>(&self, register: &QuantumRegister<T>) -> Option<Vec<usize>> {
        let mut state = self.state.lock();
        if state.predictions.is_empty() || state.predictions.len() != register.count() {
            debug!("Scheduler: no predictions for a {}-qubit register", register.count());
            return None;
        }

        let mut order: Vec<usize> = (0..register.count()).collect();
        let times: Vec<u64> = state.predictions.iter().map(|p| p.predicted_time_ms).collect();
        let time = |i: &usize| times[*i];

        match state.strategy {
            ScheduleStrategy::LongestFirst | ScheduleStrategy::AiPredicted => {
                order.sort_by(|a, b| time(b).cmp(&time(a)));
                debug!("Scheduler: ordered longest-first {:?}", order);
            }
            ScheduleStrategy::ShortestFirst => {
                order.sort_by_key(time);
                debug!("Scheduler: ordered shortest-first {:?}", order);
            }
            ScheduleStrategy::Random if self.config.randomize => {
                order.shuffle(&mut state.rng);
                debug!("Scheduler: shuffled {:?}", order);
            }
            ScheduleStrategy::Sequential | ScheduleStrategy::Random | ScheduleStrategy::Balanced => {}
        }

        Some(order)
    }

    /// Compare predictions with actual durations and fold them into the patterns
    pub fn learn<T: QubitData>(&self, register: &QuantumRegister<T>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.predictions.is_empty() {
            return;
        }

        let mut accurate = 0u64;
        let mut total_error = 0.0;

        for (i, qubit) in register.qubits().iter().enumerate() {
            if qubit.status() != QubitStatus::Completed {
                continue;
            }
            let Some(prediction) = state.predictions.get(i) else {
                continue;
            };

            let actual = qubit.duration_ms();
            let error_pct = if actual > 0 {
                (actual as f64 - prediction.predicted_time_ms as f64).abs() / actual as f64
            } else {
                0.0
            };
            total_error += error_pct;
            if error_pct < self.config.accuracy_tolerance {
                accurate += 1;
            }
            trace!(
                "Scheduler: qubit {} predicted={}ms actual={}ms error={:.0}%",
                i,
                prediction.predicted_time_ms,
                actual,
                error_pct * 100.0
            );

            let size = qubit.result_size();
            if let Some(pattern) = state.patterns.iter_mut().find(|p| p.data_size == size) {
                let samples = pattern.sample_count as u64;
                pattern.avg_time_ms = (pattern.avg_time_ms * samples + actual) / (samples + 1);
                pattern.sample_count += 1;
            } else if state.patterns.len() < self.config.pattern_capacity {
                state.patterns.push(LearnedPattern {
                    data_size: size,
                    avg_time_ms: actual,
                    sample_count: 1,
                });
            }
        }

        let count = register.count() as f64;
        let smoothing = self.config.error_smoothing;
        state.avg_prediction_error =
            state.avg_prediction_error * smoothing + (total_error / count) * (1.0 - smoothing);
        state.predictions_accurate += accurate;

        info!(
            "Scheduler: {}/{} predictions accurate, avg error {:.0}%",
            accurate,
            register.count(),
            state.avg_prediction_error * 100.0
        );
    }

    pub fn get_prediction(&self, index: usize) -> Option<QubitPrediction> {
        self.state.lock().predictions.get(index).copied()
    }

    pub fn patterns(&self) -> Vec<LearnedPattern> {
        self.state.lock().patterns.clone()
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock();
        SchedulerStats {
            strategy: state.strategy,
            total_scheduled: state.total_scheduled,
            predictions_accurate: state.predictions_accurate,
            pattern_count: state.patterns.len(),
            avg_prediction_error: state.avg_prediction_error,
        }
    }

    pub fn print_stats(&self) -> SchedulerStats {
        let stats = self.stats();
        info!(
            "Scheduler statistics: scheduled={} accurate={} patterns={}",
            stats.total_scheduled, stats.predictions_accurate, stats.pattern_count
        );
        stats
    }
}
