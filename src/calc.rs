use crate::hierarchy::{AssessmentHierarchy, CLASS_TOTAL_POINTS};
use crate::ledger::EffectiveScore;
use crate::model::Assessment;
use serde::Serialize;

/// VB6-compatible 1-decimal rounding used for display:
/// `Int(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Share of `max_score` earned, clamped to `[0, 1]`. A non-positive
/// ceiling earns nothing.
fn earned_fraction(raw: f64, max_score: f64) -> f64 {
    if max_score <= 0.0 {
        return 0.0;
    }
    (raw / max_score).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemContribution {
    pub assessment_id: String,
    pub weight_points: f64,
    pub excluded: bool,
    /// Percentage (0-100) this item scored. `None` when excluded.
    pub score_to_use: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalBreakdown {
    pub student_id: String,
    pub total: f64,
    pub raw_total: f64,
    pub active_weight: f64,
    pub items: Vec<ItemContribution>,
}

impl TotalBreakdown {
    pub fn display_total(&self) -> f64 {
        round_off_1_decimal(self.total)
    }
}

/// Percentage (0-100) a parent earns from its non-excluded children.
///
/// The result is the weighted average over the remaining children, so
/// excluding a child rescales its siblings instead of diluting the parent.
/// A parent with no active children earns 0.
pub fn parent_score<S, X>(
    student_id: &str,
    children: &[&Assessment],
    effective_score: &S,
    is_excluded: &X,
) -> f64
where
    S: Fn(&str, &str) -> EffectiveScore,
    X: Fn(&str, &str) -> bool,
{
    let mut total_earned = 0.0_f64;
    let mut active_child_weight = 0.0_f64;
    for c in children {
        if is_excluded(student_id, &c.id) {
            continue;
        }
        let raw = effective_score(student_id, &c.id).for_aggregation();
        total_earned += earned_fraction(raw, c.leaf_max()) * c.weight_points;
        active_child_weight += c.weight_points;
    }

    if active_child_weight <= 0.0 {
        return 0.0;
    }
    // Partially excluded (active < parent weight) rescales by
    // parent/active before dividing by the parent weight, which reduces
    // to the same quotient as the fully active case.
    (total_earned / active_child_weight) * 100.0
}

/// Full per-item computation of one student's class total.
pub fn compute_breakdown<S, X>(
    student_id: &str,
    hierarchy: &AssessmentHierarchy,
    effective_score: S,
    is_excluded: X,
) -> TotalBreakdown
where
    S: Fn(&str, &str) -> EffectiveScore,
    X: Fn(&str, &str) -> bool,
{
    let mut active_weight = 0.0_f64;
    let mut raw_total = 0.0_f64;
    let mut items = Vec::new();

    for a in hierarchy.top_level() {
        if is_excluded(student_id, &a.id) {
            items.push(ItemContribution {
                assessment_id: a.id.clone(),
                weight_points: a.weight_points,
                excluded: true,
                score_to_use: None,
            });
            continue;
        }

        active_weight += a.weight_points;
        let score_to_use = if a.is_parent {
            let children = hierarchy.children_of(&a.id);
            parent_score(student_id, &children, &effective_score, &is_excluded)
        } else {
            let raw = effective_score(student_id, &a.id).for_aggregation();
            earned_fraction(raw, a.leaf_max()) * 100.0
        };
        raw_total += score_to_use * a.weight_points / 100.0;
        items.push(ItemContribution {
            assessment_id: a.id.clone(),
            weight_points: a.weight_points,
            excluded: false,
            score_to_use: Some(score_to_use),
        });
    }

    let total = if active_weight <= 0.0 {
        0.0
    } else if active_weight < CLASS_TOTAL_POINTS {
        raw_total * (CLASS_TOTAL_POINTS / active_weight)
    } else {
        // Over-subscribed classes may exceed 100; that is kept as-is.
        raw_total
    };

    TotalBreakdown {
        student_id: student_id.to_string(),
        total: total.max(0.0),
        raw_total,
        active_weight,
        items,
    }
}

/// A student's class total as a percentage. Pure: reads only the lookups.
pub fn compute_total<S, X>(
    student_id: &str,
    hierarchy: &AssessmentHierarchy,
    effective_score: S,
    is_excluded: X,
) -> f64
where
    S: Fn(&str, &str) -> EffectiveScore,
    X: Fn(&str, &str) -> bool,
{
    compute_breakdown(student_id, hierarchy, effective_score, is_excluded).total
}
