//! Winner selection.

use std::cmp::Ordering;

/// Pick the winning agent index from `(agent_index, score)` pairs.
///
/// Only scores at or above `threshold` qualify. The highest score wins and
/// ties go to the lowest agent index, independent of input order.
pub fn select_winner(scores: &[(u32, f64)], threshold: f64) -> Option<u32> {
    scores
        .iter()
        .filter(|(_, score)| !score.is_nan() && *score >= threshold)
        .min_by(|(ia, sa), (ib, sb)| match sb.total_cmp(sa) {
            Ordering::Equal => ia.cmp(ib),
            other => other,
        })
        .map(|(index, _)| *index)
}

/// Rank `(agent_index, score)` pairs best first, using the same ordering
/// as [`select_winner`].
pub fn rank(scores: &[(u32, f64)]) -> Vec<(u32, f64)> {
    let mut ranked = scores.to_vec();
    ranked.sort_by(|(ia, sa), (ib, sb)| sb.total_cmp(sa).then_with(|| ia.cmp(ib)));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_score_wins() {
        assert_eq!(select_winner(&[(0, 0.5), (1, 1.0), (2, 0.9)], 0.9), Some(1));
    }

    #[test]
    fn test_tie_goes_to_lowest_index() {
        assert_eq!(select_winner(&[(2, 1.0), (0, 1.0), (1, 1.0)], 1.0), Some(0));
    }

    #[test]
    fn test_no_qualifying_score() {
        assert_eq!(select_winner(&[(0, 0.99), (1, 0.0)], 1.0), None);
        assert_eq!(select_winner(&[], 1.0), None);
        assert_eq!(select_winner(&[(0, f64::NAN)], 0.0), None);
    }

    #[test]
    fn test_rank_orders_best_first() {
        let ranked = rank(&[(0, 0.2), (1, 0.8), (2, 0.8), (3, 0.0)]);
        assert_eq!(ranked.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1, 2, 0, 3]);
    }
}
