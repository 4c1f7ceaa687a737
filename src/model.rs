use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub is_parent: bool,
    /// Set only on children.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Points toward the class total, or toward the parent's total for a child.
    pub weight_points: f64,
    /// Raw ceiling. Required on leaves, absent on parents.
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl Assessment {
    pub fn is_leaf(&self) -> bool {
        !self.is_parent
    }

    /// Ceiling used when scoring a leaf; a missing ceiling scores as 0.
    pub fn leaf_max(&self) -> f64 {
        self.max_score.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
}

/// One persisted row of the score matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub student_id: String,
    pub assessment_id: String,
    pub raw_score: Option<f64>,
    pub is_excluded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpsert {
    pub student_id: String,
    pub assessment_id: String,
    pub score: f64,
}
