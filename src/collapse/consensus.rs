//! Equality-based strategies: Validate and Vote.

use tracing::{debug, error};

use crate::error::CollapseError;

/// Every result must equal the first one
pub fn validate<T: PartialEq>(results: &[&T]) -> Result<(), CollapseError> {
    for (index, result) in results.iter().enumerate().skip(1) {
        if *result != results[0] {
            error!("Validate: result {} differs from result 0", index);
            return Err(CollapseError::ValidationMismatch { index });
        }
    }
    Ok(())
}

/// Plurality vote over equal results
///
/// Returns the index of the first member of the largest group of equal
/// results. Earlier groups win ties. With more than one result the winning
/// group must hold at least two of them.
pub fn vote_index<T: PartialEq>(results: &[&T]) -> Result<usize, CollapseError> {
    // (representative index, votes)
    let mut groups: Vec<(usize, usize)> = Vec::new();

    for (i, result) in results.iter().enumerate() {
        match groups.iter_mut().find(|(rep, _)| results[*rep] == *result) {
            Some(group) => group.1 += 1,
            None => groups.push((i, 1)),
        }
    }

    let mut winner = groups[0];
    for group in groups.iter().skip(1) {
        if group.1 > winner.1 {
            winner = *group;
        }
    }

    if results.len() > 1 && winner.1 < 2 {
        return Err(CollapseError::NoConsensus {
            largest_group: winner.1,
            total: results.len(),
        });
    }

    debug!(
        "Vote: {} of {} results agree with result {}",
        winner.1,
        results.len(),
        winner.0
    );
    Ok(winner.0)
}
