//! Ensemble collapse: weighted voting among up to three inner strategies.
//!
//! Inner strategies are re-run inline as pure selectors, never by recursing
//! through the register's collapse, so the temporal history is read but not
//! updated here.

use smallvec::SmallVec;
use tracing::debug;

use super::selection::{best_index, lcg_step, multidim_index, temporal_peek};
use super::{CollapseContext, CollapseStrategy, EnsembleConfig};

/// Whether `strategy` has an inline selector; other strategies vote for index 0
pub fn votes_inline(strategy: CollapseStrategy) -> bool {
    matches!(
        strategy,
        CollapseStrategy::FirstWins
            | CollapseStrategy::LastWins
            | CollapseStrategy::Best
            | CollapseStrategy::Fuzzy
            | CollapseStrategy::MultiDim
            | CollapseStrategy::Temporal
    )
}

fn member_choice<T>(
    strategy: CollapseStrategy,
    results: &[&T],
    ctx: &CollapseContext<'_, T>,
) -> usize {
    let count = results.len();
    match strategy {
        CollapseStrategy::FirstWins => 0,
        CollapseStrategy::LastWins => count - 1,
        CollapseStrategy::Best => ctx.evaluator.map_or(0, |eval| best_index(results, eval)),
        CollapseStrategy::Fuzzy => ctx.evaluator.map_or(0, |eval| {
            // Simplified fuzzy: best, or a pseudo-random slot 30% of the time
            let best = best_index(results, eval);
            let draw = lcg_step(eval.evaluate(results[best])) % 100;
            if draw >= 70 {
                draw as usize % count
            } else {
                best
            }
        }),
        CollapseStrategy::MultiDim => ctx
            .multidim
            .map_or(0, |criteria| multidim_index(results, criteria)),
        CollapseStrategy::Temporal => match (ctx.evaluator, ctx.temporal.as_deref()) {
            (Some(eval), Some(history)) => {
                let current: Vec<i32> = results.iter().map(|r| eval.evaluate(r)).collect();
                temporal_peek(&current, history)
            }
            _ => 0,
        },
        other => {
            debug!("Ensemble: {:?} has no inline selector, voting for 0", other);
            0
        }
    }
}

/// Index with the most accumulated weighted votes, first seen wins ties
pub fn ensemble_index<T>(
    results: &[&T],
    config: &EnsembleConfig,
    ctx: &CollapseContext<'_, T>,
) -> usize {
    let mut votes: SmallVec<[i64; 16]> = SmallVec::from_elem(0, results.len());

    for member in &config.members {
        let choice = member_choice(member.strategy, results, ctx);
        votes[choice] += member.weight as i64;
        debug!(
            "Ensemble: {:?} (weight {}) voted for {}",
            member.strategy, member.weight, choice
        );
    }

    let mut winner = 0;
    for (i, v) in votes.iter().enumerate().skip(1) {
        if *v > votes[winner] {
            winner = i;
        }
    }

    debug!("Ensemble: winner {} with {} votes", winner, votes[winner]);
    winner
}
