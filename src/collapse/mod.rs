//! Collapse strategy library
//!
//! A collapse reduces the results of every completed qubit, gathered in
//! qubit index order, into one output value. Thirteen built-in policies are
//! available; most of them select one of the inputs and clone it into the
//! output, `Combine` and `Custom` hand the whole result set to a caller
//! supplied reducer.
//!
//! Strategy-specific configuration (evaluators, multi-dimensional criteria,
//! temporal history, ensemble members) is owned by the register and handed
//! to [`apply`] through a [`CollapseContext`]. Missing configuration is
//! reported by [`missing_requirement`] before any strategy runs.

pub mod consensus;
pub mod ensemble;
pub mod selection;

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::CollapseError;

/// Number of real collapse strategies
pub const STRATEGY_COUNT: usize = 13;

/// Collapse policies, in their stable numeric order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollapseStrategy {
    /// Result of the lowest-index completed qubit
    FirstWins,
    /// Result of the highest-index completed qubit
    LastWins,
    /// Highest evaluator score, first seen wins ties
    Best,
    /// Plurality of equal results
    Vote,
    /// Caller supplied combiner over all results
    Combine,
    /// Every result must equal the first one
    Validate,
    /// Caller supplied collapse function
    Custom,
    /// Score-weighted probabilistic pick
    Fuzzy,
    /// Hill-climbing over three passes
    Progressive,
    /// Optimistic pick of the first result with rollback
    Speculative,
    /// Weighted quality/speed/resource aggregate
    MultiDim,
    /// Score blended with the trend against stored history
    Temporal,
    /// Weighted vote among up to three inner strategies
    Ensemble,
}

impl CollapseStrategy {
    pub const ALL: [CollapseStrategy; STRATEGY_COUNT] = [
        CollapseStrategy::FirstWins,
        CollapseStrategy::LastWins,
        CollapseStrategy::Best,
        CollapseStrategy::Vote,
        CollapseStrategy::Combine,
        CollapseStrategy::Validate,
        CollapseStrategy::Custom,
        CollapseStrategy::Fuzzy,
        CollapseStrategy::Progressive,
        CollapseStrategy::Speculative,
        CollapseStrategy::MultiDim,
        CollapseStrategy::Temporal,
        CollapseStrategy::Ensemble,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Configuration that must be present before this strategy can run
    pub fn requirements(self) -> &'static [Requirement] {
        match self {
            Self::FirstWins
            | Self::LastWins
            | Self::Vote
            | Self::Validate
            | Self::Progressive => &[],
            Self::Best | Self::Fuzzy | Self::Speculative => &[Requirement::Evaluator],
            Self::Combine => &[Requirement::Combiner],
            Self::Custom => &[Requirement::CustomCollapse],
            Self::MultiDim => &[Requirement::MultiDimCriteria],
            Self::Temporal => &[Requirement::Evaluator, Requirement::TemporalHistory],
            Self::Ensemble => &[Requirement::EnsembleConfig],
        }
    }
}

impl Default for CollapseStrategy {
    fn default() -> Self {
        Self::FirstWins
    }
}

/// A piece of register configuration a strategy depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Requirement {
    Evaluator,
    Combiner,
    CustomCollapse,
    MultiDimCriteria,
    TemporalHistory,
    EnsembleConfig,
}

/// Scores one result, higher is better
pub trait Evaluator<T>: Send + Sync {
    fn evaluate(&self, result: &T) -> i32;
}

impl<T, F> Evaluator<T> for F
where
    F: Fn(&T) -> i32 + Send + Sync,
{
    fn evaluate(&self, result: &T) -> i32 {
        self(result)
    }
}

/// Merges every result into the output
pub trait Combiner<T>: Send + Sync {
    fn combine(&self, results: &[&T], output: &mut T);
}

impl<T, F> Combiner<T> for F
where
    F: Fn(&[&T], &mut T) + Send + Sync,
{
    fn combine(&self, results: &[&T], output: &mut T) {
        self(results, output)
    }
}

/// Fully caller-defined reduction
pub trait CustomCollapse<T>: Send + Sync {
    fn collapse(&self, results: &[&T], output: &mut T);
}

impl<T, F> CustomCollapse<T> for F
where
    F: Fn(&[&T], &mut T) + Send + Sync,
{
    fn collapse(&self, results: &[&T], output: &mut T) {
        self(results, output)
    }
}

/// Three optional scoring dimensions with integer weights
pub struct MultiDimCriteria<T> {
    pub quality: Option<Arc<dyn Evaluator<T>>>,
    pub speed: Option<Arc<dyn Evaluator<T>>>,
    pub resource: Option<Arc<dyn Evaluator<T>>>,
    pub quality_weight: i32,
    pub speed_weight: i32,
    pub resource_weight: i32,
}

impl<T> MultiDimCriteria<T> {
    /// Weighted aggregate; a missing dimension scores 0 but its weight still counts
    pub fn aggregate(&self, result: &T) -> i64 {
        let score = |dim: &Option<Arc<dyn Evaluator<T>>>| {
            dim.as_ref().map_or(0, |e| e.evaluate(result) as i64)
        };

        let mut total_weight =
            self.quality_weight as i64 + self.speed_weight as i64 + self.resource_weight as i64;
        if total_weight == 0 {
            total_weight = 1;
        }

        (score(&self.quality) * self.quality_weight as i64
            + score(&self.speed) * self.speed_weight as i64
            + score(&self.resource) * self.resource_weight as i64)
            / total_weight
    }
}

impl<T> Clone for MultiDimCriteria<T> {
    fn clone(&self) -> Self {
        Self {
            quality: self.quality.clone(),
            speed: self.speed.clone(),
            resource: self.resource.clone(),
            quality_weight: self.quality_weight,
            speed_weight: self.speed_weight,
            resource_weight: self.resource_weight,
        }
    }
}

/// Per-slot score history used by the temporal strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalHistory {
    pub quality_history: Vec<i32>,
    pub timestamps: Vec<u64>,
    /// Number of slots holding a real observation
    pub history_size: usize,
    pub window_size: usize,
    /// 0-100, share of the trend-adjusted score in the blend
    pub trend_weight: i32,
}

impl TemporalHistory {
    pub fn new(window_size: usize, trend_weight: i32) -> Self {
        Self {
            quality_history: vec![0; window_size],
            timestamps: vec![0; window_size],
            history_size: 0,
            window_size,
            trend_weight,
        }
    }

    /// Blend `current` with its trend against slot `index`; slots beyond the
    /// recorded history score unblended
    pub fn temporal_score(&self, index: usize, current: i32) -> i64 {
        if index >= self.history_size || index >= self.quality_history.len() {
            return current as i64;
        }
        let current = current as i64;
        let trend = current - self.quality_history[index] as i64;
        let weight = self.trend_weight as i64;
        (current * (100 - weight) + (current + trend) * weight) / 100
    }

    /// Store the newest scores, bounded by the window
    pub fn record(&mut self, scores: &[i32], now_ms: u64) {
        let stored = scores.len().min(self.window_size);
        if self.history_size < stored {
            self.history_size = stored;
        }
        for (i, score) in scores.iter().take(stored).enumerate() {
            self.quality_history[i] = *score;
            self.timestamps[i] = now_ms;
        }
    }

    pub fn clear(&mut self) {
        self.quality_history.iter_mut().for_each(|s| *s = 0);
        self.timestamps.iter_mut().for_each(|t| *t = 0);
        self.history_size = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsembleMember {
    pub strategy: CollapseStrategy,
    pub weight: i32,
}

/// Up to three weighted inner strategies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnsembleConfig {
    pub members: ArrayVec<EnsembleMember, 3>,
}

impl EnsembleConfig {
    /// Builds from (strategy, weight) pairs, skipping non-positive weights
    pub fn from_pairs(pairs: &[(CollapseStrategy, i32)]) -> Self {
        let mut members = ArrayVec::new();
        for &(strategy, weight) in pairs {
            if weight <= 0 {
                debug!("Ensemble: skipping {:?} with weight {}", strategy, weight);
                continue;
            }
            if members.try_push(EnsembleMember { strategy, weight }).is_err() {
                warn!("Ensemble: more than three members, ignoring {:?}", strategy);
                break;
            }
        }
        Self { members }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Which optional configuration blocks a register currently holds
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigPresence {
    pub evaluator: bool,
    pub combiner: bool,
    pub custom: bool,
    pub multidim: bool,
    pub temporal: bool,
    pub ensemble: bool,
}

impl ConfigPresence {
    fn has(&self, requirement: Requirement) -> bool {
        match requirement {
            Requirement::Evaluator => self.evaluator,
            Requirement::Combiner => self.combiner,
            Requirement::CustomCollapse => self.custom,
            Requirement::MultiDimCriteria => self.multidim,
            Requirement::TemporalHistory => self.temporal,
            Requirement::EnsembleConfig => self.ensemble,
        }
    }
}

/// First unmet requirement of `strategy`, including ensemble members
pub fn missing_requirement(
    strategy: CollapseStrategy,
    presence: &ConfigPresence,
    ensemble: Option<&EnsembleConfig>,
) -> Option<CollapseError> {
    let unmet = |s: CollapseStrategy| {
        s.requirements()
            .iter()
            .find(|r| !presence.has(**r))
            .map(|r| CollapseError::MissingConfiguration {
                strategy: s,
                requirement: *r,
            })
    };

    if let Some(err) = unmet(strategy) {
        return Some(err);
    }

    if strategy == CollapseStrategy::Ensemble {
        let config = ensemble?;
        if config.is_empty() {
            return Some(CollapseError::MissingConfiguration {
                strategy,
                requirement: Requirement::EnsembleConfig,
            });
        }
        for member in &config.members {
            if ensemble::votes_inline(member.strategy) {
                if let Some(err) = unmet(member.strategy) {
                    return Some(err);
                }
            }
        }
    }

    None
}

/// Borrowed view of the register's strategy configuration
pub struct CollapseContext<'a, T> {
    pub evaluator: Option<&'a dyn Evaluator<T>>,
    pub combiner: Option<&'a dyn Combiner<T>>,
    pub custom: Option<&'a dyn CustomCollapse<T>>,
    pub multidim: Option<&'a MultiDimCriteria<T>>,
    pub temporal: Option<&'a mut TemporalHistory>,
    pub ensemble: Option<&'a EnsembleConfig>,
    pub now_ms: u64,
}

impl<'a, T> CollapseContext<'a, T> {
    pub fn empty(now_ms: u64) -> Self {
        Self {
            evaluator: None,
            combiner: None,
            custom: None,
            multidim: None,
            temporal: None,
            ensemble: None,
            now_ms,
        }
    }

    fn missing(strategy: CollapseStrategy, requirement: Requirement) -> CollapseError {
        CollapseError::MissingConfiguration {
            strategy,
            requirement,
        }
    }
}

/// What a collapse produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapseOutcome {
    /// Index into the gathered results, when the strategy selected one
    pub selected: Option<usize>,
}

/// Run `strategy` over `results` into `output`
///
/// On error the output is left untouched. `results` must not be empty.
pub fn apply<T: Clone + PartialEq>(
    strategy: CollapseStrategy,
    results: &[&T],
    output: &mut T,
    ctx: &mut CollapseContext<'_, T>,
) -> Result<CollapseOutcome, CollapseError> {
    use CollapseStrategy::*;

    if results.is_empty() {
        return Err(CollapseError::NoResults);
    }

    let selected = match strategy {
        FirstWins => Some(0),
        LastWins => Some(results.len() - 1),
        Best => {
            let eval = ctx.evaluator.ok_or(CollapseContext::<T>::missing(strategy, Requirement::Evaluator))?;
            Some(selection::best_index(results, eval))
        }
        Vote => Some(consensus::vote_index(results)?),
        Combine => {
            let combiner = ctx.combiner.ok_or(CollapseContext::<T>::missing(strategy, Requirement::Combiner))?;
            combiner.combine(results, output);
            None
        }
        Validate => {
            consensus::validate(results)?;
            Some(0)
        }
        Custom => {
            let custom = ctx.custom.ok_or(CollapseContext::<T>::missing(strategy, Requirement::CustomCollapse))?;
            custom.collapse(results, output);
            None
        }
        Fuzzy => {
            let eval = ctx.evaluator.ok_or(CollapseContext::<T>::missing(strategy, Requirement::Evaluator))?;
            Some(selection::fuzzy_index(results, eval))
        }
        Progressive => Some(selection::progressive_index(results, ctx.evaluator)),
        Speculative => {
            let eval = ctx.evaluator.ok_or(CollapseContext::<T>::missing(strategy, Requirement::Evaluator))?;
            Some(selection::speculative_index(results, eval))
        }
        MultiDim => {
            let criteria = ctx.multidim.ok_or(CollapseContext::<T>::missing(strategy, Requirement::MultiDimCriteria))?;
            Some(selection::multidim_index(results, criteria))
        }
        Temporal => {
            let eval = ctx.evaluator.ok_or(CollapseContext::<T>::missing(strategy, Requirement::Evaluator))?;
            let now_ms = ctx.now_ms;
            let history = ctx
                .temporal
                .as_deref_mut()
                .ok_or(CollapseContext::<T>::missing(strategy, Requirement::TemporalHistory))?;
            Some(selection::temporal_index(results, eval, history, now_ms))
        }
        Ensemble => {
            let config = ctx.ensemble.ok_or(CollapseContext::<T>::missing(strategy, Requirement::EnsembleConfig))?;
            Some(ensemble::ensemble_index(results, config, ctx))
        }
    };

    if let Some(index) = selected {
        output.clone_from(results[index]);
    }

    debug!(
        "Collapse {:?} over {} results selected {:?}",
        strategy,
        results.len(),
        selected
    );

    Ok(CollapseOutcome { selected })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_indices_are_stable() {
        assert_eq!(CollapseStrategy::FirstWins.index(), 0);
        assert_eq!(CollapseStrategy::Vote.index(), 3);
        assert_eq!(CollapseStrategy::Ensemble.index(), STRATEGY_COUNT - 1);
        for (i, s) in CollapseStrategy::ALL.iter().enumerate() {
            assert_eq!(CollapseStrategy::from_index(i), Some(*s));
        }
        assert_eq!(CollapseStrategy::from_index(STRATEGY_COUNT), None);
    }

    #[test]
    fn test_missing_requirement_reports_first_gap() {
        let presence = ConfigPresence {
            evaluator: true,
            ..Default::default()
        };
        let err = missing_requirement(CollapseStrategy::Temporal, &presence, None);
        assert_eq!(
            err,
            Some(CollapseError::MissingConfiguration {
                strategy: CollapseStrategy::Temporal,
                requirement: Requirement::TemporalHistory,
            })
        );
        assert!(missing_requirement(CollapseStrategy::Best, &presence, None).is_none());
        assert!(missing_requirement(CollapseStrategy::Validate, &ConfigPresence::default(), None).is_none());
    }

    #[test]
    fn test_missing_requirement_checks_ensemble_members() {
        let config = EnsembleConfig::from_pairs(&[
            (CollapseStrategy::Best, 50),
            (CollapseStrategy::MultiDim, 50),
        ]);
        let presence = ConfigPresence {
            evaluator: true,
            ensemble: true,
            ..Default::default()
        };
        let err = missing_requirement(CollapseStrategy::Ensemble, &presence, Some(&config));
        assert_eq!(
            err,
            Some(CollapseError::MissingConfiguration {
                strategy: CollapseStrategy::MultiDim,
                requirement: Requirement::MultiDimCriteria,
            })
        );
    }

    #[test]
    fn test_ensemble_from_pairs_skips_non_positive_weights() {
        let config = EnsembleConfig::from_pairs(&[
            (CollapseStrategy::Best, 40),
            (CollapseStrategy::Fuzzy, 0),
            (CollapseStrategy::LastWins, -5),
        ]);
        assert_eq!(config.members.len(), 1);
        assert_eq!(config.members[0].strategy, CollapseStrategy::Best);
    }

    #[test]
    fn test_temporal_history_record_is_bounded_by_window() {
        let mut history = TemporalHistory::new(2, 50);
        history.record(&[10, 20, 30], 7);
        assert_eq!(history.history_size, 2);
        assert_eq!(history.quality_history, vec![10, 20]);
        assert_eq!(history.timestamps, vec![7, 7]);

        // improving by 10: (20*50 + 30*50) / 100 = 25
        assert_eq!(history.temporal_score(0, 20), 25);
        // slot beyond history stays unblended
        assert_eq!(history.temporal_score(2, 40), 40);
    }

    #[test]
    fn test_apply_combine_writes_output() {
        let combiner = |results: &[&i64], out: &mut i64| {
            *out = results.iter().copied().sum();
        };
        let values = [1i64, 2, 3];
        let refs: Vec<&i64> = values.iter().collect();
        let mut output = 0i64;
        let mut ctx = CollapseContext::empty(0);
        ctx.combiner = Some(&combiner);
        let outcome = apply(CollapseStrategy::Combine, &refs, &mut output, &mut ctx).unwrap();
        assert_eq!(output, 6);
        assert_eq!(outcome.selected, None);
    }

    #[test]
    fn test_apply_without_evaluator_leaves_output() {
        let values = [5i32, 9];
        let refs: Vec<&i32> = values.iter().collect();
        let mut output = -1;
        let mut ctx = CollapseContext::empty(0);
        let err = apply(CollapseStrategy::Best, &refs, &mut output, &mut ctx).unwrap_err();
        assert!(matches!(err, CollapseError::MissingConfiguration { .. }));
        assert_eq!(output, -1);
    }

    #[test]
    fn test_apply_empty_results() {
        let refs: Vec<&i32> = Vec::new();
        let mut output = 0;
        let mut ctx = CollapseContext::empty(0);
        assert_eq!(
            apply(CollapseStrategy::FirstWins, &refs, &mut output, &mut ctx),
            Err(CollapseError::NoResults)
        );
    }
}
