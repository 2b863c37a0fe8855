//! Adaptive controller: watches a running register and switches its collapse
//! strategy at most once per execution when progress looks unhealthy.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::collapse::{CollapseStrategy, STRATEGY_COUNT};
use crate::observer::AiObserver;
use crate::profiler;
use crate::register::{QuantumRegister, QubitData};

/// When the controller considers switching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdaptivePolicy {
    /// Never switch
    None,
    /// Slow progress past the timeout
    Timeout,
    /// Failure share above threshold
    FailureRate,
    /// Reported quality below threshold
    Quality,
    /// Looser timeout or failure conditions
    Aggressive,
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveThresholds {
    pub timeout_ms: u64,
    /// Failed / finished ratio, 0-1
    pub failure_rate_threshold: f64,
    /// Minimum acceptable reported quality, 0-1
    pub quality_threshold: f64,
    pub check_interval_ms: u64,
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            failure_rate_threshold: 0.3,
            quality_threshold: 0.5,
            check_interval_ms: 100,
        }
    }
}

/// Snapshot of the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveState {
    pub policy: AdaptivePolicy,
    pub thresholds: AdaptiveThresholds,
    pub execution_start_ms: u64,
    pub last_check_ms: u64,
    pub switch_count: u32,
    pub original_strategy: CollapseStrategy,
    pub current_strategy: CollapseStrategy,
    pub has_switched: bool,
    pub completed_at_last_check: u32,
    pub failed_at_last_check: u32,
    pub current_quality: f64,
}

/// Why a check decided to switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Timeout,
    FailureRate,
    LowQuality,
    SlowProgress,
    ElevatedFailures,
}

pub struct AdaptiveController {
    state: AdaptiveState,
    observer: Arc<AiObserver>,
}

impl AdaptiveController {
    pub fn new(policy: AdaptivePolicy, strategy: CollapseStrategy, observer: Arc<AiObserver>) -> Self {
        Self {
            state: AdaptiveState {
                policy,
                thresholds: AdaptiveThresholds::default(),
                execution_start_ms: 0,
                last_check_ms: 0,
                switch_count: 0,
                original_strategy: strategy,
                current_strategy: strategy,
                has_switched: false,
                completed_at_last_check: 0,
                failed_at_last_check: 0,
                current_quality: 1.0,
            },
            observer,
        }
    }

    pub fn set_thresholds(&mut self, thresholds: AdaptiveThresholds) {
        self.state.thresholds = thresholds;
    }

    pub fn thresholds(&self) -> AdaptiveThresholds {
        self.state.thresholds
    }

    pub fn report_quality(&mut self, quality: f64) {
        self.state.current_quality = quality.clamp(0.0, 1.0);
    }

    pub fn state(&self) -> AdaptiveState {
        self.state.clone()
    }

    /// Mark the start of a run; the switch budget is not refilled here
    pub(crate) fn begin_execution(&mut self, strategy: CollapseStrategy, now_ms: u64) {
        let s = &mut self.state;
        s.execution_start_ms = now_ms;
        s.last_check_ms = now_ms;
        s.current_strategy = strategy;
        s.completed_at_last_check = 0;
        s.failed_at_last_check = 0;
    }

    fn evaluate(&self, elapsed_ms: u64, completion_rate: f64, failure_rate: f64) -> Option<Trigger> {
        let t = &self.state.thresholds;
        match self.state.policy {
            AdaptivePolicy::None => None,
            AdaptivePolicy::Timeout => {
                (elapsed_ms > t.timeout_ms && completion_rate < 0.5).then_some(Trigger::Timeout)
            }
            AdaptivePolicy::FailureRate => {
                (failure_rate > t.failure_rate_threshold).then_some(Trigger::FailureRate)
            }
            AdaptivePolicy::Quality => {
                (self.state.current_quality < t.quality_threshold).then_some(Trigger::LowQuality)
            }
            AdaptivePolicy::Aggressive => {
                if elapsed_ms as f64 > t.timeout_ms as f64 * 0.5 && completion_rate < 0.3 {
                    Some(Trigger::SlowProgress)
                } else if failure_rate > t.failure_rate_threshold * 0.7 {
                    Some(Trigger::ElevatedFailures)
                } else {
                    None
                }
            }
        }
    }

    /// One checkpoint against `register`; returns the strategy to switch to
    pub fn check<T: QubitData>(&mut self, register: &QuantumRegister<T>) -> Option<CollapseStrategy> {
        if !register.is_executing() || self.state.policy == AdaptivePolicy::None {
            return None;
        }

        let now = register.clock().now_ms();
        if now.saturating_sub(self.state.last_check_ms) < self.state.thresholds.check_interval_ms {
            return None;
        }
        self.state.last_check_ms = now;

        let completed = register.completed_count();
        let failed = register.failed_count();
        let elapsed = now.saturating_sub(self.state.execution_start_ms);
        let completion_rate = completed as f64 / register.count() as f64;
        let finished = completed + failed;
        let failure_rate = if finished > 0 {
            failed as f64 / finished as f64
        } else {
            0.0
        };

        let trigger = self.evaluate(elapsed, completion_rate, failure_rate);
        debug!(
            "Adaptive check: elapsed={}ms completion={:.2} failure={:.2} trigger={:?}",
            elapsed, completion_rate, failure_rate, trigger
        );

        let next = match trigger {
            Some(trigger) if !self.state.has_switched => match self.choose_alternative(register) {
                Some(next) => {
                    warn!(
                        "Adaptive: {:?} triggered, switching {:?} -> {:?}",
                        trigger, self.state.current_strategy, next
                    );
                    Some(next)
                }
                None => {
                    warn!(
                        "Adaptive: {:?} triggered but no configured alternative to {:?}",
                        trigger, self.state.current_strategy
                    );
                    None
                }
            },
            _ => None,
        };

        match next {
            Some(next) => {
                self.state.current_strategy = next;
                self.state.has_switched = true;
                self.state.switch_count += 1;
            }
            None => {
                self.state.completed_at_last_check = completed;
                self.state.failed_at_last_check = failed;
            }
        }
        next
    }

    /// Observer recommendation first, then rotation; only strategies the
    /// register can actually collapse with are eligible
    fn choose_alternative<T: QubitData>(&self, register: &QuantumRegister<T>) -> Option<CollapseStrategy> {
        let current = self.state.current_strategy;
        let eligible = |s: CollapseStrategy| s != current && register.can_collapse_with(s);

        let profile = profiler::profile(register);
        let recommended = self.observer.recommend_strategy(&profile);
        if eligible(recommended) {
            return Some(recommended);
        }
        if recommended != current {
            debug!("Adaptive: recommended {:?} is not configured, rotating", recommended);
        }

        // Ensemble is never picked by rotation
        let rotation = STRATEGY_COUNT - 1;
        (1..=rotation)
            .filter_map(|step| CollapseStrategy::from_index((current.index() + step) % rotation))
            .find(|s| eligible(*s))
    }

    /// Restore the original strategy and clear the switch budget
    pub fn reset(&mut self) -> CollapseStrategy {
        let s = &mut self.state;
        s.execution_start_ms = 0;
        s.last_check_ms = 0;
        s.switch_count = 0;
        s.current_strategy = s.original_strategy;
        s.has_switched = false;
        s.completed_at_last_check = 0;
        s.failed_at_last_check = 0;
        s.current_quality = 1.0;
        info!("Adaptive: reset to {:?}", s.original_strategy);
        s.original_strategy
    }
}
