use crate::compliance::domain::{RuleId, Severity, Violation};
use crate::compliance::score::{ScoreAggregator, ScoreSummary};

fn violation(id: &str, impact: u8) -> Violation {
    Violation {
        rule_id: RuleId(id.to_string()),
        rule_name: id.to_string(),
        severity: Severity::Low,
        impact,
    }
}

#[test]
fn no_violations_yield_a_perfect_score() {
    assert_eq!(
        ScoreAggregator::aggregate(&[]),
        ScoreSummary {
            total_score_impact: 0,
            final_score: 100,
        }
    );
}

#[test]
fn impacts_are_summed() {
    let summary = ScoreAggregator::aggregate(&[violation("a", 15), violation("b", 20)]);

    assert_eq!(summary.total_score_impact, 35);
    assert_eq!(summary.final_score, 65);
}

#[test]
fn total_impact_is_unclamped_while_score_floors_at_zero() {
    let summary = ScoreAggregator::aggregate(&[violation("a", 60), violation("b", 60)]);

    assert_eq!(summary.total_score_impact, 120);
    assert_eq!(summary.final_score, 0);
}

#[test]
fn final_score_stays_within_bounds_for_any_impact_mix() {
    for impacts in [vec![0], vec![100], vec![100, 100, 100], vec![1, 2, 3, 94], vec![99, 2]] {
        let violations: Vec<_> = impacts
            .iter()
            .enumerate()
            .map(|(index, impact)| violation(&format!("r{index}"), *impact))
            .collect();
        let summary = ScoreAggregator::aggregate(&violations);
        let expected_total: u32 = impacts.iter().map(|impact| u32::from(*impact)).sum();

        assert_eq!(summary.total_score_impact, expected_total);
        assert_eq!(
            u32::from(summary.final_score),
            100u32.saturating_sub(expected_total)
        );
        assert!(summary.final_score <= 100);
    }
}
