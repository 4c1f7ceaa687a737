use crate::model::Assessment;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::warn;

/// Expected sum of top-level weights in a class.
pub const CLASS_TOTAL_POINTS: f64 = 100.0;

/// Snapshot of one class's assessments arranged as top-level items and
/// their children. Nesting is two levels deep: parents never have parents.
#[derive(Debug, Clone, Default)]
pub struct AssessmentHierarchy {
    by_id: HashMap<String, Assessment>,
    top_level: Vec<String>,
    children: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WeightWarning {
    #[serde(rename_all = "camelCase")]
    ParentChildMismatch {
        parent_id: String,
        parent_points: f64,
        children_points: f64,
    },
    #[serde(rename_all = "camelCase")]
    ClassTotalMismatch { top_level_points: f64 },
    #[serde(rename_all = "camelCase")]
    EmptyParent { parent_id: String },
}

fn display_order(a: &Assessment, b: &Assessment) -> Ordering {
    // Unordered items sort after ordered ones.
    let sort_a = a.sort_order.unwrap_or(i64::MAX);
    let sort_b = b.sort_order.unwrap_or(i64::MAX);
    sort_a
        .cmp(&sort_b)
        .then_with(|| match (a.date, b.date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

impl AssessmentHierarchy {
    pub fn from_assessments(assessments: Vec<Assessment>) -> Self {
        let by_id: HashMap<String, Assessment> = assessments
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();

        let mut top: Vec<&Assessment> = Vec::new();
        let mut children: HashMap<String, Vec<&Assessment>> = HashMap::new();

        for a in by_id.values() {
            if a.is_parent {
                children.entry(a.id.clone()).or_default();
                top.push(a);
                continue;
            }
            match a.parent_id.as_deref() {
                None => top.push(a),
                Some(pid) => match by_id.get(pid) {
                    Some(parent) if parent.is_parent => {
                        children.entry(pid.to_string()).or_default().push(a);
                    }
                    _ => {
                        warn!(
                            assessment_id = %a.id,
                            parent_id = %pid,
                            "child has no valid parent; treating as standalone"
                        );
                        top.push(a);
                    }
                },
            }
        }

        top.sort_by(|a, b| display_order(a, b));
        let top_level = top.iter().map(|a| a.id.clone()).collect();
        let children = children
            .into_iter()
            .map(|(pid, mut kids)| {
                kids.sort_by(|a, b| display_order(a, b));
                (pid, kids.iter().map(|a| a.id.clone()).collect())
            })
            .collect();

        Self {
            by_id,
            top_level,
            children,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Assessment> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Parents and standalone leaves, in display order.
    pub fn top_level(&self) -> Vec<&Assessment> {
        self.top_level
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .collect()
    }

    /// Children of `parent_id` ordered by `sort_order`. Unknown ids and
    /// childless parents yield an empty list.
    pub fn children_of(&self, parent_id: &str) -> Vec<&Assessment> {
        self.children
            .get(parent_id)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    /// Every assessment, each parent directly followed by its children.
    pub fn flattened(&self) -> Vec<&Assessment> {
        let mut out = Vec::with_capacity(self.by_id.len());
        for a in self.top_level() {
            out.push(a);
            if a.is_parent {
                out.extend(self.children_of(&a.id));
            }
        }
        out
    }

    /// Soft checks on the weighting convention. Never blocks grading.
    pub fn weight_warnings(&self, tolerance: f64) -> Vec<WeightWarning> {
        let mut out = Vec::new();
        let mut top_points = 0.0_f64;
        for a in self.top_level() {
            top_points += a.weight_points;
            if !a.is_parent {
                continue;
            }
            let kids = self.children_of(&a.id);
            if kids.is_empty() {
                out.push(WeightWarning::EmptyParent {
                    parent_id: a.id.clone(),
                });
                continue;
            }
            let children_points: f64 = kids.iter().map(|c| c.weight_points).sum();
            if (children_points - a.weight_points).abs() > tolerance {
                out.push(WeightWarning::ParentChildMismatch {
                    parent_id: a.id.clone(),
                    parent_points: a.weight_points,
                    children_points,
                });
            }
        }
        if !self.top_level.is_empty() && (top_points - CLASS_TOTAL_POINTS).abs() > tolerance {
            out.push(WeightWarning::ClassTotalMismatch {
                top_level_points: top_points,
            });
        }
        out
    }
}
