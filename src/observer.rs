//! AI observer: learns which collapse strategy performs best for a given
//! workload shape and recommends it for similar registers.
//!
//! The learning database is an append-only list of entries, each pairing a
//! representative [`WorkloadProfile`] with per-strategy metrics. Observations
//! are folded into the most similar entry when it is similar enough, and
//! start a new entry otherwise.

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::collapse::{CollapseStrategy, STRATEGY_COUNT};
use crate::profiler::{self, WorkloadProfile};
use crate::register::{QuantumRegister, QubitData};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    pub enabled: bool,
    /// Minimum similarity for an observation to reuse an entry
    pub match_threshold: f64,
    /// EMA rate for quality updates
    pub learning_rate: f64,
    pub initial_capacity: usize,
    /// Below this confidence recommendations fall back to heuristics
    pub confidence_gate: f64,
    /// Variance under which any result is considered good enough
    pub low_variance_threshold: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            match_threshold: 0.8,
            learning_rate: 0.3,
            initial_capacity: 32,
            confidence_gate: 0.5,
            low_variance_threshold: 100,
        }
    }
}

/// Learned performance of one strategy within an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub total_uses: u32,
    pub success_count: u32,
    pub total_time_ms: u64,
    pub avg_quality: f64,
    /// Observation counter value when last used
    pub last_used: u64,
}

impl StrategyMetrics {
    /// Quality per unit time, weighted by success rate
    pub fn score(&self) -> f64 {
        if self.total_uses == 0 {
            return 0.0;
        }
        let uses = self.total_uses as f64;
        let success_rate = self.success_count as f64 / uses;
        let avg_time = self.total_time_ms as f64 / uses;
        (self.avg_quality * success_rate) / (avg_time + 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEntry {
    pub profile: WorkloadProfile,
    pub metrics: [StrategyMetrics; STRATEGY_COUNT],
    pub observation_count: u32,
    pub confidence: f64,
}

impl LearningEntry {
    fn new(profile: WorkloadProfile) -> Self {
        Self {
            profile,
            metrics: [StrategyMetrics::default(); STRATEGY_COUNT],
            observation_count: 0,
            confidence: 0.0,
        }
    }

    /// Linear ramp over the first ten observations, then 1 - 1/n
    fn update_confidence(&mut self) {
        let n = self.observation_count as f64;
        self.confidence = if self.observation_count >= 10 {
            1.0 - 1.0 / n
        } else {
            n / 10.0
        };
    }
}

/// Returned by [`AiObserver::observe_start`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationTicket {
    pub started_at_ms: u64,
    pub strategy: CollapseStrategy,
    pub profile: WorkloadProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObserverStats {
    pub total_observations: u64,
    pub entries: usize,
    pub capacity: usize,
    pub enabled: bool,
}

pub struct AiObserver {
    config: ObserverConfig,
    db: RwLock<Vec<LearningEntry>>,
    enabled: CachePadded<AtomicBool>,
    total_observations: CachePadded<AtomicU64>,
}

impl Default for AiObserver {
    fn default() -> Self {
        Self::new(ObserverConfig::default())
    }
}

impl AiObserver {
    pub fn new(config: ObserverConfig) -> Self {
        info!("Quantum AI observer initialising (match threshold {})", config.match_threshold);
        Self {
            enabled: CachePadded::new(AtomicBool::new(config.enabled)),
            db: RwLock::new(Vec::new()),
            total_observations: CachePadded::new(AtomicU64::new(0)),
            config,
        }
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!("Quantum AI: {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn profile_register<T: QubitData>(&self, register: &QuantumRegister<T>) -> WorkloadProfile {
        profiler::profile(register)
    }

    /// Most similar entry and its similarity, ignoring zero-similarity entries
    fn best_match(entries: &[LearningEntry], profile: &WorkloadProfile) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, entry) in entries.iter().enumerate() {
            let sim = profile.similarity(&entry.profile);
            if sim > best.map_or(0.0, |(_, s)| s) {
                best = Some((i, sim));
            }
        }
        best
    }

    fn find_or_create_entry(&self, entries: &mut Vec<LearningEntry>, profile: &WorkloadProfile) -> Option<usize> {
        if let Some((index, sim)) = Self::best_match(entries, profile) {
            if sim >= self.config.match_threshold {
                return Some(index);
            }
        }

        if entries.len() == entries.capacity() {
            let grow = if entries.capacity() == 0 {
                self.config.initial_capacity.max(1)
            } else {
                entries.capacity()
            };
            if let Err(e) = entries.try_reserve_exact(grow) {
                warn!("Failed to expand quantum AI database: {}", e);
                return None;
            }
        }

        entries.push(LearningEntry::new(*profile));
        debug!("Quantum AI: new learning entry #{}", entries.len() - 1);
        Some(entries.len() - 1)
    }

    pub fn observe_start<T: QubitData>(&self, register: &QuantumRegister<T>) -> ObservationTicket {
        if self.is_enabled() {
            debug!("Quantum AI: observing execution start");
        }
        ObservationTicket {
            started_at_ms: register.clock().now_ms(),
            strategy: register.strategy(),
            profile: profiler::profile(register),
        }
    }

    /// Fold one finished execution into the learning database
    pub fn observe_complete<T: QubitData>(&self, register: &QuantumRegister<T>, elapsed_ms: u64, quality: f64) {
        if !self.is_enabled() {
            return;
        }

        let strategy = register.strategy();
        let profile = profiler::profile(register);
        debug!(
            "Quantum AI: observing completion strategy={:?} time={}ms quality={:.2}",
            strategy, elapsed_ms, quality
        );

        let observation = self.total_observations.load(Ordering::SeqCst);
        let mut db = self.db.write();
        let Some(index) = self.find_or_create_entry(&mut db, &profile) else {
            return;
        };
        let entry = &mut db[index];

        let alpha = self.config.learning_rate;
        let metrics = &mut entry.metrics[strategy.index()];
        metrics.total_uses += 1;
        if register.is_collapsed() {
            metrics.success_count += 1;
        }
        metrics.total_time_ms += elapsed_ms;
        metrics.avg_quality = metrics.avg_quality * (1.0 - alpha) + quality * alpha;
        metrics.last_used = observation;

        entry.observation_count += 1;
        entry.update_confidence();
        self.total_observations.fetch_add(1, Ordering::SeqCst);

        info!(
            "Quantum AI: learning updated (observations={} confidence={:.0}%)",
            entry.observation_count,
            entry.confidence * 100.0
        );
    }

    /// Close a ticket from [`observe_start`](Self::observe_start) using the register's clock
    pub fn observe_finish<T: QubitData>(&self, ticket: &ObservationTicket, register: &QuantumRegister<T>, quality: f64) {
        let elapsed = register.clock().now_ms().saturating_sub(ticket.started_at_ms);
        self.observe_complete(register, elapsed, quality);
    }

    fn heuristic(&self, profile: &WorkloadProfile) -> CollapseStrategy {
        if profile.has_evaluation {
            CollapseStrategy::Best
        } else if profile.requires_all {
            CollapseStrategy::Combine
        } else if profile.variance < self.config.low_variance_threshold {
            CollapseStrategy::FirstWins
        } else {
            CollapseStrategy::Validate
        }
    }

    pub fn recommend_strategy(&self, profile: &WorkloadProfile) -> CollapseStrategy {
        if !self.is_enabled() {
            return CollapseStrategy::FirstWins;
        }

        let db = self.db.read();
        let matched = Self::best_match(&db, profile)
            .filter(|(i, sim)| {
                *sim >= self.config.match_threshold && db[*i].confidence >= self.config.confidence_gate
            })
            .map(|(i, _)| &db[i]);

        let Some(entry) = matched else {
            let strategy = self.heuristic(profile);
            debug!("Quantum AI: no confident match, heuristic {:?}", strategy);
            return strategy;
        };

        let mut best_strategy = CollapseStrategy::FirstWins;
        let mut best_score = 0.0;
        for (strategy, metrics) in CollapseStrategy::ALL.iter().zip(entry.metrics.iter()) {
            let score = metrics.score();
            if score > best_score {
                best_score = score;
                best_strategy = *strategy;
            }
        }

        info!(
            "Quantum AI: recommending {:?} (confidence={:.0}%)",
            best_strategy,
            entry.confidence * 100.0
        );
        best_strategy
    }

    pub fn recommend_for<T: QubitData>(&self, register: &QuantumRegister<T>) -> CollapseStrategy {
        self.recommend_strategy(&profiler::profile(register))
    }

    /// Confidence of the first similar entry that has used `strategy`
    pub fn get_confidence(&self, profile: &WorkloadProfile, strategy: CollapseStrategy) -> f64 {
        if !self.is_enabled() {
            return 0.0;
        }
        self.db
            .read()
            .iter()
            .find(|e| {
                profile.similarity(&e.profile) >= self.config.match_threshold
                    && e.metrics[strategy.index()].total_uses > 0
            })
            .map_or(0.0, |e| e.confidence)
    }

    pub fn entries(&self) -> Vec<LearningEntry> {
        self.db.read().clone()
    }

    pub fn stats(&self) -> ObserverStats {
        let db = self.db.read();
        ObserverStats {
            total_observations: self.total_observations.load(Ordering::SeqCst),
            entries: db.len(),
            capacity: db.capacity(),
            enabled: self.is_enabled(),
        }
    }

    pub fn print_stats(&self) -> ObserverStats {
        let stats = self.stats();
        info!(
            "Quantum AI statistics: observations={} entries={} enabled={}",
            stats.total_observations, stats.entries, stats.enabled
        );
        stats
    }

    pub fn reset_learning(&self) {
        info!("Quantum AI: resetting learned data");
        *self.db.write() = Vec::new();
        self.total_observations.store(0, Ordering::SeqCst);
    }
}
