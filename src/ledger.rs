use crate::model::{ScoreEntry, ScoreUpsert};
use serde::Serialize;
use std::collections::HashMap;

/// Differences smaller than this are treated as "same score" when diffing.
const SCORE_EPSILON: f64 = 1e-9;

/// The single value used for a (student, assessment) cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "camelCase")]
pub enum EffectiveScore {
    Value(f64),
    /// The user emptied the cell in this session.
    Cleared,
    /// Never graded.
    NoEntry,
}

impl EffectiveScore {
    pub fn value(self) -> Option<f64> {
        match self {
            EffectiveScore::Value(v) => Some(v),
            EffectiveScore::Cleared | EffectiveScore::NoEntry => None,
        }
    }

    /// Aggregation policy: anything without a number counts as 0.
    /// This conflates "graded zero" with "not yet graded" on purpose.
    pub fn for_aggregation(self) -> f64 {
        self.value().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayValue {
    Score(f64),
    Empty,
}

/// Turn raw cell input into an overlay value. Blank or non-numeric input
/// becomes `Empty`; numbers are clamped to `[0, max_score]`.
pub fn parse_score_input(input: &str, max_score: f64) -> OverlayValue {
    let t = input.trim();
    if t.is_empty() {
        return OverlayValue::Empty;
    }
    match t.parse::<f64>() {
        Ok(v) if v.is_finite() => OverlayValue::Score(v.clamp(0.0, max_score.max(0.0))),
        _ => OverlayValue::Empty,
    }
}

type Matrix<T> = HashMap<String, HashMap<String, T>>;

fn lookup<'m, T>(m: &'m Matrix<T>, student_id: &str, assessment_id: &str) -> Option<&'m T> {
    m.get(student_id).and_then(|row| row.get(assessment_id))
}

/// Persisted score matrix plus the unsaved-edit overlay for one class.
#[derive(Debug, Clone, Default)]
pub struct ScoreLedger {
    persisted: Matrix<f64>,
    overlay: Matrix<OverlayValue>,
}

impl ScoreLedger {
    #[cfg(test)]
    pub fn new(entries: Vec<ScoreEntry>) -> Self {
        let mut ledger = Self::default();
        ledger.replace_persisted(entries);
        ledger
    }

    /// Swap in a freshly fetched matrix. The overlay is left alone.
    pub fn replace_persisted(&mut self, entries: Vec<ScoreEntry>) {
        self.persisted.clear();
        for e in entries {
            let Some(v) = e.raw_score else {
                continue;
            };
            self.persisted
                .entry(e.student_id)
                .or_default()
                .insert(e.assessment_id, v);
        }
    }

    pub fn persisted_score(&self, student_id: &str, assessment_id: &str) -> Option<f64> {
        lookup(&self.persisted, student_id, assessment_id).copied()
    }

    pub fn overlay_value(&self, student_id: &str, assessment_id: &str) -> Option<OverlayValue> {
        lookup(&self.overlay, student_id, assessment_id).copied()
    }

    pub fn effective_score(&self, student_id: &str, assessment_id: &str) -> EffectiveScore {
        match self.overlay_value(student_id, assessment_id) {
            Some(OverlayValue::Score(v)) => EffectiveScore::Value(v),
            Some(OverlayValue::Empty) => EffectiveScore::Cleared,
            None => self
                .persisted_score(student_id, assessment_id)
                .map(EffectiveScore::Value)
                .unwrap_or(EffectiveScore::NoEntry),
        }
    }

    /// Last write wins per key.
    pub fn set_overlay(&mut self, student_id: &str, assessment_id: &str, value: OverlayValue) {
        self.overlay
            .entry(student_id.to_string())
            .or_default()
            .insert(assessment_id.to_string(), value);
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.overlay.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.overlay.values().map(HashMap::len).sum()
    }

    pub fn clear_overlay(&mut self) {
        self.overlay.clear();
    }

    /// Keep only overlay entries for which `keep(student, assessment)` holds.
    /// Returns how many were dropped.
    pub fn retain_overlay<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&str, &str) -> bool,
    {
        let mut dropped = 0;
        for (sid, row) in self.overlay.iter_mut() {
            row.retain(|aid, _| {
                let k = keep(sid, aid);
                if !k {
                    dropped += 1;
                }
                k
            });
        }
        self.overlay.retain(|_, row| !row.is_empty());
        dropped
    }

    /// Cleared overlay cells that still have a persisted score.
    pub fn cleared_over_persisted(&self) -> usize {
        self.overlay
            .iter()
            .flat_map(|(sid, row)| row.iter().map(move |(aid, v)| (sid, aid, v)))
            .filter(|(sid, aid, v)| {
                **v == OverlayValue::Empty && self.persisted_score(sid, aid).is_some()
            })
            .count()
    }

    /// Numeric overlay entries that differ from the persisted value,
    /// sorted by (student, assessment).
    pub fn pending_upserts(&self) -> Vec<ScoreUpsert> {
        let mut out = Vec::new();
        for (sid, row) in &self.overlay {
            for (aid, value) in row {
                let OverlayValue::Score(v) = *value else {
                    continue;
                };
                let unchanged = self
                    .persisted_score(sid, aid)
                    .map(|p| (p - v).abs() <= SCORE_EPSILON)
                    .unwrap_or(false);
                if unchanged {
                    continue;
                }
                out.push(ScoreUpsert {
                    student_id: sid.clone(),
                    assessment_id: aid.clone(),
                    score: v,
                });
            }
        }
        out.sort_by(|a, b| {
            a.student_id
                .cmp(&b.student_id)
                .then_with(|| a.assessment_id.cmp(&b.assessment_id))
        });
        out
    }
}
