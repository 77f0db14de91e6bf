use serde::{Deserialize, Serialize};

use super::domain::{Violation, PERFECT_SCORE};

/// Totals derived from a set of violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSummary {
    /// Unclamped sum of impacts; may exceed 100.
    pub total_score_impact: u32,
    /// `max(0, 100 - total_score_impact)`.
    pub final_score: u8,
}

/// Stateless reducer from violations to a compliance score.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScoreAggregator;

impl ScoreAggregator {
    pub fn aggregate(violations: &[Violation]) -> ScoreSummary {
        let total_score_impact = violations
            .iter()
            .map(|violation| u32::from(violation.impact))
            .fold(0u32, u32::saturating_add);

        let remaining = u32::from(PERFECT_SCORE).saturating_sub(total_score_impact);

        ScoreSummary {
            total_score_impact,
            final_score: remaining as u8,
        }
    }
}
