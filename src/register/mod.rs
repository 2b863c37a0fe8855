//! Quantum register: fans a unit of work out into qubits, runs them through
//! a [`Dispatcher`] and collapses their results with a [`CollapseStrategy`].
//!
//! Qubit state machine: Pending -> Running -> {Completed | Failed}, or
//! Pending -> Skipped for qubits disabled at dispatch time. Results are
//! always gathered in qubit index order, never in completion order.

pub mod completion;
pub mod dispatch;
pub mod qubit;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adaptive::{AdaptiveController, AdaptivePolicy, AdaptiveState, AdaptiveThresholds};
use crate::clock::{system_clock, Clock};
use crate::collapse::{
    self, CollapseContext, CollapseStrategy, Combiner, ConfigPresence, CustomCollapse,
    EnsembleConfig, Evaluator, MultiDimCriteria, TemporalHistory,
};
use crate::error::{CollapseError, QarmaError, RegisterError, Result};
use crate::observer::AiObserver;

pub use completion::{CompletionHandle, CompletionTracker};
pub use dispatch::{DispatchMode, Dispatcher, InlineDispatcher, Job, ParallelDispatcher};
pub use qubit::{Qubit, QubitData, QubitFn, QubitStatus, UserData};

/// Qubits listed by `debug_summary`
const DEBUG_QUBIT_LIMIT: usize = 16;

/// Register defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterConfig {
    pub default_strategy: CollapseStrategy,
    pub wait_for_all: bool,
    pub dispatch: DispatchMode,
    /// Jobs per parallel wave, 0 = one per pool thread
    pub wave_size: usize,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            default_strategy: CollapseStrategy::FirstWins,
            wait_for_all: true,
            dispatch: DispatchMode::Inline,
            wave_size: 0,
        }
    }
}

/// Point-in-time register counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterStats {
    pub total_qubits: usize,
    pub enabled_qubits: usize,
    pub completed_qubits: u32,
    pub failed_qubits: u32,
    pub total_execution_time_ms: u64,
    pub collapse_time_ms: u64,
    pub avg_qubit_time_ms: u64,
}

pub struct QuantumRegister<T: QubitData> {
    id: Uuid,
    qubits: Vec<Qubit<T>>,
    strategy: CollapseStrategy,

    custom: Option<Arc<dyn CustomCollapse<T>>>,
    evaluator: Option<Arc<dyn Evaluator<T>>>,
    combiner: Option<Arc<dyn Combiner<T>>>,
    multidim: Option<MultiDimCriteria<T>>,
    temporal: Option<TemporalHistory>,
    ensemble: Option<EnsembleConfig>,

    /// Allocated on first successful collapse, reused afterwards
    output: Option<T>,
    collapsed: bool,
    wait_for_all: bool,
    data_size: usize,

    tracker: CompletionTracker,
    total_execution_time_ms: u64,
    collapse_time_ms: u64,

    adaptive: Option<AdaptiveController>,
    dispatcher: Arc<dyn Dispatcher>,
    clock: Arc<dyn Clock>,
}

impl<T: QubitData> QuantumRegister<T> {
    /// Register of `capacity` disabled qubits, run inline
    pub fn new(capacity: usize) -> std::result::Result<Self, RegisterError> {
        if capacity == 0 {
            warn!("Cannot create quantum register with 0 qubits");
            return Err(RegisterError::ZeroCapacity);
        }

        let qubits = (0..capacity).map(|i| Qubit::new(i as u32)).collect();
        let id = Uuid::new_v4();
        info!("Created quantum register {} with {} qubits", id, capacity);

        Ok(Self {
            id,
            qubits,
            strategy: CollapseStrategy::default(),
            custom: None,
            evaluator: None,
            combiner: None,
            multidim: None,
            temporal: None,
            ensemble: None,
            output: None,
            collapsed: false,
            wait_for_all: true,
            data_size: 0,
            tracker: CompletionTracker::new(),
            total_execution_time_ms: 0,
            collapse_time_ms: 0,
            adaptive: None,
            dispatcher: Arc::new(InlineDispatcher),
            clock: system_clock(),
        })
    }

    pub fn with_config(capacity: usize, config: &RegisterConfig) -> Result<Self> {
        let mut register = Self::new(capacity)?;
        register.strategy = config.default_strategy;
        register.wait_for_all = config.wait_for_all;

        if config.dispatch == DispatchMode::Parallel {
            register.dispatcher = Arc::new(ParallelDispatcher::new(config.wave_size)?);
        }
        Ok(register)
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn check_index(&self, index: usize) -> std::result::Result<(), RegisterError> {
        if index >= self.qubits.len() {
            return Err(RegisterError::IndexOutOfRange {
                index,
                capacity: self.qubits.len(),
            });
        }
        Ok(())
    }

    /// Attach a body and its data to a qubit and enable it
    pub fn qubit_init<F>(
        &mut self,
        index: usize,
        function: F,
        data: T,
        result_size: usize,
    ) -> std::result::Result<(), RegisterError>
    where
        F: Fn(&mut T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.check_index(index)?;
        let qubit = &mut self.qubits[index];
        qubit.function = Some(Arc::new(function));
        qubit.data = data;
        qubit.result_size = result_size;
        qubit.enabled = true;
        qubit.status = QubitStatus::Pending;
        debug!("Qubit {} initialised ({} byte result)", index, result_size);
        Ok(())
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> std::result::Result<(), RegisterError> {
        self.check_index(index)?;
        self.qubits[index].enabled = enabled;
        Ok(())
    }

    pub fn set_id(&mut self, index: usize, id: u32) -> std::result::Result<(), RegisterError> {
        self.check_index(index)?;
        self.qubits[index].id = id;
        Ok(())
    }

    pub fn set_userdata(
        &mut self,
        index: usize,
        userdata: Option<UserData>,
    ) -> std::result::Result<(), RegisterError> {
        self.check_index(index)?;
        self.qubits[index].userdata = userdata;
        Ok(())
    }

    pub fn set_strategy(&mut self, strategy: CollapseStrategy) {
        self.strategy = strategy;
    }

    /// Install a custom reducer and select [`CollapseStrategy::Custom`]
    pub fn set_custom_collapse<F>(&mut self, collapse: F)
    where
        F: CustomCollapse<T> + 'static,
    {
        self.custom = Some(Arc::new(collapse));
        self.strategy = CollapseStrategy::Custom;
    }

    pub fn set_evaluate<F>(&mut self, evaluator: F)
    where
        F: Evaluator<T> + 'static,
    {
        self.evaluator = Some(Arc::new(evaluator));
    }

    pub fn set_combine<F>(&mut self, combiner: F)
    where
        F: Combiner<T> + 'static,
    {
        self.combiner = Some(Arc::new(combiner));
    }

    pub fn set_wait_all(&mut self, wait_all: bool) {
        self.wait_for_all = wait_all;
    }

    pub fn set_multidim(&mut self, criteria: MultiDimCriteria<T>) {
        self.multidim = Some(criteria);
    }

    /// Configure (or reconfigure) the temporal history; stored scores are kept
    /// when the window size is unchanged
    pub fn set_temporal(
        &mut self,
        window_size: usize,
        trend_weight: i32,
    ) -> std::result::Result<(), RegisterError> {
        if window_size == 0 || !(0..=100).contains(&trend_weight) {
            return Err(RegisterError::InvalidConfiguration {
                reason: format!(
                    "temporal window {} / trend weight {} (window > 0, weight 0-100)",
                    window_size, trend_weight
                ),
            });
        }

        match self.temporal.as_mut() {
            Some(history) if history.window_size == window_size => {
                history.trend_weight = trend_weight;
            }
            _ => self.temporal = Some(TemporalHistory::new(window_size, trend_weight)),
        }
        Ok(())
    }

    /// Up to three (strategy, weight) members; non-positive weights are skipped
    pub fn set_ensemble(
        &mut self,
        members: &[(CollapseStrategy, i32)],
    ) -> std::result::Result<(), RegisterError> {
        if members.len() > 3 {
            return Err(RegisterError::InvalidConfiguration {
                reason: format!("ensemble takes at most 3 members, got {}", members.len()),
            });
        }
        if members.iter().any(|(s, _)| *s == CollapseStrategy::Ensemble) {
            return Err(RegisterError::InvalidConfiguration {
                reason: "ensemble cannot contain itself".to_string(),
            });
        }

        let config = EnsembleConfig::from_pairs(members);
        if config.is_empty() {
            return Err(RegisterError::InvalidConfiguration {
                reason: "ensemble needs at least one positively weighted member".to_string(),
            });
        }
        self.ensemble = Some(config);
        Ok(())
    }

    /// Declared input size, reported in the workload profile
    pub fn set_data_size(&mut self, data_size: usize) {
        self.data_size = data_size;
    }

    fn presence(&self) -> ConfigPresence {
        ConfigPresence {
            evaluator: self.evaluator.is_some(),
            combiner: self.combiner.is_some(),
            custom: self.custom.is_some(),
            multidim: self.multidim.is_some(),
            temporal: self.temporal.is_some(),
            ensemble: self.ensemble.is_some(),
        }
    }

    /// Whether `strategy` has everything it needs to collapse this register
    pub fn can_collapse_with(&self, strategy: CollapseStrategy) -> bool {
        collapse::missing_requirement(strategy, &self.presence(), self.ensemble.as_ref()).is_none()
    }

    fn validate_strategy(&self) -> std::result::Result<(), CollapseError> {
        match collapse::missing_requirement(self.strategy, &self.presence(), self.ensemble.as_ref()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Dispatch every enabled qubit in index order
    ///
    /// Returns whether at least one qubit was dispatched.
    pub fn execute(&mut self) -> Result<bool> {
        let order: Vec<usize> = (0..self.qubits.len()).collect();
        self.run(order)
    }

    /// Dispatch in `order`; unlisted qubits follow in index order
    pub fn execute_ordered(&mut self, order: &[usize]) -> Result<bool> {
        let mut seen = vec![false; self.qubits.len()];
        let mut full = Vec::with_capacity(self.qubits.len());

        for &index in order {
            if index >= self.qubits.len() {
                return Err(RegisterError::InvalidOrder {
                    reason: format!("index {} out of range ({} qubits)", index, self.qubits.len()),
                }
                .into());
            }
            if seen[index] {
                return Err(RegisterError::InvalidOrder {
                    reason: format!("index {} listed twice", index),
                }
                .into());
            }
            seen[index] = true;
            full.push(index);
        }
        full.extend((0..self.qubits.len()).filter(|i| !seen[*i]));

        self.run(full)
    }

    /// Execute and report whether every enabled qubit has finished
    pub fn execute_sync(&mut self) -> Result<bool> {
        if !self.execute()? {
            return Ok(false);
        }
        debug!("All quantum tasks completed");
        Ok(self.is_complete())
    }

    fn run(&mut self, order: Vec<usize>) -> Result<bool> {
        if self.tracker.is_executing() {
            return Err(RegisterError::AlreadyExecuting.into());
        }
        self.validate_strategy()?;

        let start_ms = self.clock.now_ms();
        let enabled: Vec<usize> = order
            .into_iter()
            .filter(|&i| {
                if self.qubits[i].enabled {
                    true
                } else {
                    self.qubits[i].status = QubitStatus::Skipped;
                    false
                }
            })
            .collect();

        self.collapsed = false;
        self.tracker.begin(enabled.len() as u32);
        if let Some(controller) = self.adaptive.as_mut() {
            controller.begin_execution(self.strategy, start_ms);
        }

        info!(
            "Executing register {}: {} of {} qubits enabled via {} dispatcher",
            self.id,
            enabled.len(),
            self.qubits.len(),
            self.dispatcher.name()
        );

        let wave_size = self.dispatcher.wave_size().max(1);
        for wave in enabled.chunks(wave_size) {
            let jobs = Self::build_jobs(&mut self.qubits, wave, &self.tracker, &*self.clock);
            self.dispatcher.dispatch(jobs);
            self.adaptive_check();
        }

        self.total_execution_time_ms = self.clock.now_ms().saturating_sub(start_ms);
        self.tracker.finish_dispatch();

        info!(
            "Dispatched {} qubits: {} completed, {} failed in {}ms",
            enabled.len(),
            self.tracker.completed(),
            self.tracker.failed(),
            self.total_execution_time_ms
        );
        Ok(!enabled.is_empty())
    }

    /// One job per qubit in `wave`; indices must be distinct
    fn build_jobs<'a>(
        qubits: &'a mut [Qubit<T>],
        wave: &[usize],
        tracker: &'a CompletionTracker,
        clock: &'a dyn Clock,
    ) -> Vec<Job<'a>> {
        let mut slots: Vec<Option<&'a mut Qubit<T>>> = qubits.iter_mut().map(Some).collect();

        wave.iter()
            .filter_map(|&i| slots[i].take())
            .map(|qubit| -> Job<'a> {
                Box::new(move || {
                    let now = || clock.now_ms();
                    match qubit.run(&now) {
                        Ok(()) => tracker.record_completed(),
                        Err(e) => {
                            warn!("Qubit {} failed: {:#}", qubit.id, e);
                            tracker.record_failed();
                        }
                    }
                })
            })
            .collect()
    }

    /// Every enabled qubit has finished
    pub fn is_complete(&self) -> bool {
        let enabled = self.enabled_count() as u32;
        self.tracker.completed() + self.tracker.failed() >= enabled
    }

    /// Spin until complete; `Duration::ZERO` waits without a deadline
    pub fn wait(&self, timeout: Duration) -> std::result::Result<(), RegisterError> {
        let start = std::time::Instant::now();
        while !self.is_complete() {
            if !timeout.is_zero() && start.elapsed() >= timeout {
                return Err(RegisterError::WaitTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            std::thread::yield_now();
        }
        Ok(())
    }

    /// Waitable view of this register's counters
    pub fn completion_handle(&self) -> CompletionHandle {
        self.tracker.handle()
    }

    /// Reduce the completed results into the output
    ///
    /// Idempotent until the next `execute` or `reset`. On error nothing is
    /// cached and the output keeps its previous value.
    pub fn collapse(&mut self) -> Result<&T> {
        if self.collapsed {
            debug!("Register {} already collapsed, returning cached output", self.id);
            return self.output.as_ref().ok_or_else(|| {
                QarmaError::Internal("collapsed register has no output".to_string())
            });
        }

        self.validate_strategy()?;

        if !self.is_complete() {
            warn!("Collapsing register {} before all qubits complete", self.id);
        }

        let start_ms = self.clock.now_ms();
        let results: SmallVec<[&T; 16]> = self
            .qubits
            .iter()
            .filter(|q| q.status == QubitStatus::Completed)
            .map(|q| &q.data)
            .collect();

        if results.is_empty() {
            warn!("Register {} has no completed results to collapse", self.id);
            return Err(CollapseError::NoResults.into());
        }

        let mut ctx = CollapseContext {
            evaluator: self.evaluator.as_deref(),
            combiner: self.combiner.as_deref(),
            custom: self.custom.as_deref(),
            multidim: self.multidim.as_ref(),
            temporal: self.temporal.as_mut(),
            ensemble: self.ensemble.as_ref(),
            now_ms: start_ms,
        };

        let output = self.output.get_or_insert_with(T::default);
        let outcome = collapse::apply(self.strategy, &results, output, &mut ctx)?;

        self.collapse_time_ms = self.clock.now_ms().saturating_sub(start_ms);
        self.collapsed = true;
        info!(
            "Register {} collapsed with {:?} over {} results (selected {:?})",
            self.id,
            self.strategy,
            results.len(),
            outcome.selected
        );

        self.output
            .as_ref()
            .ok_or_else(|| QarmaError::Internal("collapse output missing".to_string()))
    }

    /// Last collapsed value, if any
    pub fn output(&self) -> Option<&T> {
        if self.collapsed {
            self.output.as_ref()
        } else {
            None
        }
    }

    /// Data of a completed qubit
    pub fn get_qubit_result(&self, index: usize) -> Option<&T> {
        self.qubits
            .get(index)
            .filter(|q| q.status == QubitStatus::Completed)
            .map(|q| &q.data)
    }

    /// Clear per-run state; configuration and qubit bodies are kept
    pub fn reset(&mut self) {
        self.tracker.clear();
        self.collapsed = false;
        self.total_execution_time_ms = 0;
        self.collapse_time_ms = 0;
        for qubit in &mut self.qubits {
            qubit.reset_run_state();
        }
        debug!("Register {} reset", self.id);
    }

    pub fn stats(&self) -> RegisterStats {
        let completed = self.tracker.completed();
        RegisterStats {
            total_qubits: self.qubits.len(),
            enabled_qubits: self.enabled_count(),
            completed_qubits: completed,
            failed_qubits: self.tracker.failed(),
            total_execution_time_ms: self.total_execution_time_ms,
            collapse_time_ms: self.collapse_time_ms,
            avg_qubit_time_ms: if completed > 0 {
                self.total_execution_time_ms / completed as u64
            } else {
                0
            },
        }
    }

    /// Multi-line state dump listing at most the first 16 qubits
    pub fn debug_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Quantum Register {} ===", self.id);
        let _ = writeln!(out, "Total qubits: {}", self.qubits.len());
        let _ = writeln!(
            out,
            "Completed: {} Failed: {}",
            self.tracker.completed(),
            self.tracker.failed()
        );
        let _ = writeln!(out, "Collapsed: {}", if self.collapsed { "Yes" } else { "No" });
        let _ = writeln!(out, "Strategy: {:?}", self.strategy);
        let _ = writeln!(out, "Qubit status:");
        for (i, q) in self.qubits.iter().take(DEBUG_QUBIT_LIMIT).enumerate() {
            let _ = writeln!(
                out,
                "  [{}] {} - {:?}",
                i,
                if q.enabled { "EN" } else { "DIS" },
                q.status
            );
        }
        if self.qubits.len() > DEBUG_QUBIT_LIMIT {
            let _ = writeln!(out, "  ... ({} more qubits)", self.qubits.len() - DEBUG_QUBIT_LIMIT);
        }
        out
    }

    pub fn debug_print(&self) {
        for line in self.debug_summary().lines() {
            info!("{}", line);
        }
    }

    // Adaptive execution

    /// Attach an adaptive controller; the current strategy becomes the original
    pub fn adaptive_init(&mut self, policy: AdaptivePolicy, observer: Arc<AiObserver>) {
        info!("Register {}: adaptive policy {:?}", self.id, policy);
        self.adaptive = Some(AdaptiveController::new(policy, self.strategy, observer));
    }

    pub fn adaptive_set_thresholds(
        &mut self,
        thresholds: AdaptiveThresholds,
    ) -> std::result::Result<(), RegisterError> {
        let controller = self
            .adaptive
            .as_mut()
            .ok_or(RegisterError::AdaptiveNotInitialized)?;
        controller.set_thresholds(thresholds);
        Ok(())
    }

    /// Run one adaptive checkpoint; returns whether the strategy switched
    pub fn adaptive_check(&mut self) -> bool {
        if !self.tracker.is_executing() {
            return false;
        }
        let Some(mut controller) = self.adaptive.take() else {
            return false;
        };

        let switched = controller.check(self);
        if let Some(strategy) = switched {
            self.strategy = strategy;
        }
        self.adaptive = Some(controller);
        switched.is_some()
    }

    pub fn adaptive_get_state(&self) -> Option<AdaptiveState> {
        self.adaptive.as_ref().map(|c| c.state())
    }

    /// Feed an externally measured quality in [0, 1] to the Quality policy
    pub fn adaptive_report_quality(&mut self, quality: f64) -> std::result::Result<(), RegisterError> {
        let controller = self
            .adaptive
            .as_mut()
            .ok_or(RegisterError::AdaptiveNotInitialized)?;
        controller.report_quality(quality);
        Ok(())
    }

    /// Restore the original strategy and allow one more switch
    pub fn adaptive_reset(&mut self) -> std::result::Result<(), RegisterError> {
        let controller = self
            .adaptive
            .as_mut()
            .ok_or(RegisterError::AdaptiveNotInitialized)?;
        self.strategy = controller.reset();
        Ok(())
    }

    // Accessors

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn count(&self) -> usize {
        self.qubits.len()
    }

    pub fn enabled_count(&self) -> usize {
        self.qubits.iter().filter(|q| q.enabled).count()
    }

    pub fn qubits(&self) -> &[Qubit<T>] {
        &self.qubits
    }

    pub fn qubit(&self, index: usize) -> Option<&Qubit<T>> {
        self.qubits.get(index)
    }

    /// Mutable access to a qubit's data between runs
    pub fn data_mut(&mut self, index: usize) -> Option<&mut T> {
        self.qubits.get_mut(index).map(|q| &mut q.data)
    }

    pub fn strategy(&self) -> CollapseStrategy {
        self.strategy
    }

    pub fn has_evaluator(&self) -> bool {
        self.evaluator.is_some()
    }

    pub fn wait_for_all(&self) -> bool {
        self.wait_for_all
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    pub fn is_executing(&self) -> bool {
        self.tracker.is_executing()
    }

    pub fn completed_count(&self) -> u32 {
        self.tracker.completed()
    }

    pub fn failed_count(&self) -> u32 {
        self.tracker.failed()
    }

    pub fn total_execution_time_ms(&self) -> u64 {
        self.total_execution_time_ms
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn temporal_history(&self) -> Option<&TemporalHistory> {
        self.temporal.as_ref()
    }

    /// Forget recorded temporal scores, keeping window and weight
    pub fn reset_temporal_history(&mut self) {
        if let Some(history) = self.temporal.as_mut() {
            history.clear();
        }
    }
}
