use crate::model::PathologyScores;

/// Scores at or above this value are reported as detected.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Keeps the entries whose score is `>= threshold`, in their original order.
pub fn significant(scores: &PathologyScores, threshold: f32) -> PathologyScores {
    scores
        .iter()
        .filter(|(_, score)| *score >= threshold)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores() -> PathologyScores {
        [("A", 0.7f32), ("B", 0.3), ("C", 0.5)].into_iter().collect()
    }

    fn labels(s: &PathologyScores) -> Vec<&str> {
        s.labels().collect()
    }

    #[test]
    fn default_threshold_is_inclusive() {
        let found = significant(&scores(), DEFAULT_THRESHOLD);
        assert_eq!(labels(&found), vec!["A", "C"]);
        assert_eq!(found.get("C"), Some(0.5));
    }

    #[test]
    fn higher_thresholds_narrow_the_result() {
        assert_eq!(labels(&significant(&scores(), 0.6)), vec!["A"]);
        assert!(significant(&scores(), 0.8).is_empty());
    }

    #[test]
    fn order_follows_the_input() {
        let s: PathologyScores = [("Z", 0.9f32), ("A", 0.95), ("M", 0.1)].into_iter().collect();
        assert_eq!(labels(&significant(&s, 0.5)), vec!["Z", "A"]);
    }
}
