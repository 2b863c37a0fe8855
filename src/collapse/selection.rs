//! Selection strategies: each returns the index of the chosen result.
//!
//! Every function assumes a non-empty `results` slice. Ties go to the
//! lowest index unless noted otherwise.

use tracing::{debug, trace};

use super::{Evaluator, MultiDimCriteria, TemporalHistory};

/// Probability (percent) that fuzzy collapse takes the top scorer outright
const FUZZY_EXPLOIT_PERCENT: u32 = 70;

/// Progressive collapse refinement passes
const PROGRESSIVE_ROUNDS: usize = 3;

/// Share of the speculative score a result must reach to confirm it
const SPECULATION_CONFIRM_RATIO: f64 = 0.9;

/// One step of the classic `1103515245 * x + 12345` LCG
pub(crate) fn lcg_step(seed: i32) -> u32 {
    (seed as u32).wrapping_mul(1_103_515_245).wrapping_add(12_345)
}

/// Highest score, first seen wins ties
pub fn best_index<T>(results: &[&T], evaluator: &dyn Evaluator<T>) -> usize {
    let mut best_idx = 0;
    let mut best_score = evaluator.evaluate(results[0]);

    for (i, result) in results.iter().enumerate().skip(1) {
        let score = evaluator.evaluate(result);
        if score > best_score {
            best_score = score;
            best_idx = i;
        }
    }

    best_idx
}

/// Score-weighted probabilistic selection
///
/// The draw is seeded from the first result's score, so identical inputs
/// always pick the same index.
pub fn fuzzy_index<T>(results: &[&T], evaluator: &dyn Evaluator<T>) -> usize {
    let scores: Vec<i32> = results.iter().map(|r| evaluator.evaluate(r)).collect();
    let total: i64 = scores.iter().map(|s| *s as i64).sum();

    let mut best_idx = 0;
    for (i, score) in scores.iter().enumerate().skip(1) {
        if *score > scores[best_idx] {
            best_idx = i;
        }
    }

    let draw = (lcg_step(scores[0]) / 65_536) % 100;

    let selected = if draw < FUZZY_EXPLOIT_PERCENT {
        best_idx
    } else if total > 0 {
        let target = (draw as i64 * total) / 100;
        let mut cumulative = 0i64;
        let mut picked = 0;
        for (i, score) in scores.iter().enumerate() {
            cumulative += *score as i64;
            if cumulative >= target {
                picked = i;
                break;
            }
        }
        picked
    } else {
        draw as usize % results.len()
    };

    debug!(
        "Fuzzy: draw={} best={} total={} selected={}",
        draw, best_idx, total, selected
    );
    selected
}

/// Start from the first result and adopt strictly better ones over three passes
pub fn progressive_index<T>(results: &[&T], evaluator: Option<&dyn Evaluator<T>>) -> usize {
    let Some(evaluator) = evaluator else {
        return 0;
    };

    let mut current = 0;
    let mut current_score = evaluator.evaluate(results[0]);
    let mut improvements = 0;

    for round in 0..PROGRESSIVE_ROUNDS {
        for (i, result) in results.iter().enumerate().skip(1) {
            let candidate = evaluator.evaluate(result);
            if candidate > current_score {
                current = i;
                current_score = candidate;
                improvements += 1;
                trace!("Progressive: round {} adopted {} (score {})", round, i, candidate);
            }
        }
    }

    debug!("Progressive: {} improvements, final index {}", improvements, current);
    current
}

/// Speculate on the first result and roll back if the others outvote it
///
/// Results scoring at least 90% of the speculative score confirm it, every
/// other result contradicts it. The best contradicting result replaces the
/// speculation only when contradictions outnumber confirmations and it
/// actually scores higher.
pub fn speculative_index<T>(results: &[&T], evaluator: &dyn Evaluator<T>) -> usize {
    if results.len() < 2 {
        return 0;
    }

    let speculative_score = evaluator.evaluate(results[0]);
    let threshold = speculative_score as f64 * SPECULATION_CONFIRM_RATIO;

    let mut confirmations = 0usize;
    let mut contradictions = 0usize;
    let mut best_alternative: Option<(usize, i32)> = None;

    for (i, result) in results.iter().enumerate().skip(1) {
        let score = evaluator.evaluate(result);
        if score as f64 >= threshold {
            confirmations += 1;
        } else {
            contradictions += 1;
            if best_alternative.map_or(true, |(_, best)| score > best) {
                best_alternative = Some((i, score));
            }
        }
    }

    match best_alternative {
        Some((idx, score)) if contradictions > confirmations && score > speculative_score => {
            debug!(
                "Speculative: rollback to {} ({} contradictions vs {} confirmations)",
                idx, contradictions, confirmations
            );
            idx
        }
        _ => 0,
    }
}

/// Highest weighted aggregate, first seen wins ties
pub fn multidim_index<T>(results: &[&T], criteria: &MultiDimCriteria<T>) -> usize {
    let mut best_idx = 0;
    let mut best_score = criteria.aggregate(results[0]);

    for (i, result) in results.iter().enumerate().skip(1) {
        let score = criteria.aggregate(result);
        if score > best_score {
            best_score = score;
            best_idx = i;
        }
    }

    best_idx
}

/// Highest trend-blended score, then record the current scores into `history`
pub fn temporal_index<T>(
    results: &[&T],
    evaluator: &dyn Evaluator<T>,
    history: &mut TemporalHistory,
    now_ms: u64,
) -> usize {
    let current: Vec<i32> = results.iter().map(|r| evaluator.evaluate(r)).collect();
    let selected = temporal_peek(&current, history);
    history.record(&current, now_ms);
    selected
}

/// Selection over precomputed scores without touching the history
pub(crate) fn temporal_peek(current: &[i32], history: &TemporalHistory) -> usize {
    let mut best_idx = 0;
    let mut best_score = history.temporal_score(0, current[0]);

    for (i, score) in current.iter().enumerate().skip(1) {
        let blended = history.temporal_score(i, *score);
        if blended > best_score {
            best_score = blended;
            best_idx = i;
        }
    }

    best_idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn identity(v: &i32) -> i32 {
        *v
    }

    fn refs(values: &[i32]) -> Vec<&i32> {
        values.iter().collect()
    }

    #[test]
    fn test_best_index_first_tie_wins() {
        let values = [3, 9, 9, 1];
        assert_eq!(best_index(&refs(&values), &identity), 1);
    }

    #[test]
    fn test_best_index_negative_cost() {
        let costs = [40, 15, 70, 25];
        let neg = |c: &i32| -*c;
        assert_eq!(best_index(&refs(&costs), &neg), 1);
    }

    #[test]
    fn test_fuzzy_exploits_best_for_low_draw() {
        // seed 0 -> 12345 / 65536 = 0 -> draw 0 -> best
        let values = [0, 50, 20];
        assert_eq!(fuzzy_index(&refs(&values), &identity), 1);
    }

    #[test]
    fn test_fuzzy_weighted_walk_can_pick_below_best() {
        // seed 2 -> draw 76; total 132, target 100; cumulative 2, 72, 132
        let values = [2, 70, 60];
        assert_eq!(fuzzy_index(&refs(&values), &identity), 2);
        // seed 2 again; total 44, target 33; cumulative 2, 42
        let values = [2, 40, 1, 1];
        assert_eq!(fuzzy_index(&refs(&values), &identity), 1);
    }

    #[test]
    fn test_fuzzy_non_positive_total_uses_draw_modulo() {
        // seed -1 -> draw 97, total -9 -> 97 % 3
        let values = [-1, -5, -3];
        assert_eq!(fuzzy_index(&refs(&values), &identity), 1);
        // seed -5 -> draw 80, total -5 -> 80 % 4
        let values = [-5, 0, 0, 0];
        assert_eq!(fuzzy_index(&refs(&values), &identity), 0);
    }

    #[test]
    fn test_fuzzy_is_deterministic() {
        let values = [17, 4, 88, 31];
        let a = fuzzy_index(&refs(&values), &identity);
        let b = fuzzy_index(&refs(&values), &identity);
        assert_eq!(a, b);
        assert!(a < values.len());
    }

    #[test]
    fn test_progressive_without_evaluator_keeps_first() {
        let values = [1, 2, 3];
        assert_eq!(progressive_index::<i32>(&refs(&values), None), 0);
    }

    #[test]
    fn test_progressive_climbs_to_first_maximum() {
        let values = [1, 5, 3, 5];
        assert_eq!(progressive_index(&refs(&values), Some(&identity)), 1);
    }

    #[test]
    fn test_progressive_evaluates_three_passes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let eval = move |v: &i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            *v
        };
        let values = [1, 2, 3, 4];
        progressive_index(&refs(&values), Some(&eval));
        assert_eq!(calls.load(Ordering::SeqCst), 1 + 3 * 3);
    }

    #[test]
    fn test_speculative_keeps_confirmed_guess() {
        let values = [100, 95, 20, 92];
        assert_eq!(speculative_index(&refs(&values), &identity), 0);
    }

    #[test]
    fn test_speculative_rolls_back_when_outvoted() {
        // all three contradict, but none outscores the guess
        let values = [10, 3, 4, 5];
        assert_eq!(speculative_index(&refs(&values), &identity), 0);

        // threshold -90: -50 confirms, -95 and -91 contradict (2 > 1)
        // and the best contradiction -91 beats -100
        let values = [-100, -50, -95, -91];
        assert_eq!(speculative_index(&refs(&values), &identity), 3);
    }

    #[test]
    fn test_speculative_single_result() {
        let values = [7];
        assert_eq!(speculative_index(&refs(&values), &identity), 0);
    }

    #[test]
    fn test_multidim_matches_best_with_single_weight() {
        let values = [4, 12, 7];
        let criteria = MultiDimCriteria::<i32> {
            quality: Some(Arc::new(identity)),
            speed: Some(Arc::new(|v: &i32| -*v)),
            resource: None,
            quality_weight: 100,
            speed_weight: 0,
            resource_weight: 0,
        };
        assert_eq!(
            multidim_index(&refs(&values), &criteria),
            best_index(&refs(&values), &identity)
        );
    }

    #[test]
    fn test_temporal_updates_history() {
        let mut history = TemporalHistory::new(4, 50);
        let first = [10, 30, 20];
        assert_eq!(temporal_index(&refs(&first), &identity, &mut history, 1), 1);
        assert_eq!(history.history_size, 3);

        // slot 0 jumps by 25: (35*50 + 60*50)/100 = 47 beats slot 1 at 30
        let second = [35, 30, 20];
        assert_eq!(temporal_index(&refs(&second), &identity, &mut history, 2), 0);
        assert_eq!(&history.quality_history[..3], &[35, 30, 20]);
    }
}
