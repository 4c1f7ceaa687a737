use crate::backend::{BackendError, BackendResult, GradeBackend};
use crate::calc::{self, TotalBreakdown};
use crate::exclusions::{self, ExclusionRegistry, ToggleOutcome};
use crate::hierarchy::{AssessmentHierarchy, WeightWarning};
use crate::ledger::{parse_score_input, EffectiveScore, OverlayValue, ScoreLedger};
use crate::model::{ScoreUpsert, Student};
use crate::notify::{ChangeBus, ChangeEvent, Notification};
use crossbeam::channel::Receiver;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("unknown student: {0}")]
    UnknownStudent(String),

    #[error("unknown assessment: {0}")]
    UnknownAssessment(String),

    #[error("exclusion updated but reloading the class failed: {0}")]
    Reload(#[source] BackendError),
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("a save is already in progress")]
    InProgress,

    #[error("save failed: {0}")]
    Backend(#[source] BackendError),

    #[error("scores saved but reloading them failed: {0}")]
    Refresh(#[source] BackendError),
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub weight_tolerance: f64,
    pub event_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            weight_tolerance: 0.01,
            event_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum EditOutcome {
    Stored(f64),
    Cleared,
    /// Unknown student, unknown assessment, or a parent assessment.
    Ignored,
}

/// `reverted_clears` counts cleared cells that fell back to their stored
/// score: the backend has no way to delete a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SaveOutcome {
    #[serde(rename_all = "camelCase")]
    NothingToSave { reverted_clears: usize },
    #[serde(rename_all = "camelCase")]
    Saved { count: usize, reverted_clears: usize },
}

/// Entries handed to the backend by an in-flight save.
#[derive(Debug)]
pub struct SaveBatch {
    entries: Vec<ScoreUpsert>,
}

impl SaveBatch {
    pub fn entries(&self) -> &[ScoreUpsert] {
        &self.entries
    }
}

/// One operator's editing session over one class. Every view of the class
/// reads scores, exclusions and totals from here.
pub struct GradebookSession {
    class_id: String,
    students: Vec<Student>,
    roster: HashSet<String>,
    hierarchy: AssessmentHierarchy,
    exclusions: ExclusionRegistry,
    ledger: ScoreLedger,
    totals: HashMap<String, TotalBreakdown>,
    save_in_flight: bool,
    bus: ChangeBus,
    options: SessionOptions,
}

impl GradebookSession {
    pub fn open<B>(
        backend: &B,
        class_id: &str,
        options: SessionOptions,
    ) -> Result<Self, SessionError>
    where
        B: GradeBackend + ?Sized,
    {
        let mut session = Self {
            class_id: class_id.to_string(),
            students: Vec::new(),
            roster: HashSet::new(),
            hierarchy: AssessmentHierarchy::default(),
            exclusions: ExclusionRegistry::default(),
            ledger: ScoreLedger::default(),
            totals: HashMap::new(),
            save_in_flight: false,
            bus: ChangeBus::new(options.event_capacity),
            options,
        };
        session.load(backend)?;
        info!(
            class_id,
            students = session.students.len(),
            assessments = session.hierarchy.len(),
            exclusions = session.exclusions.len(),
            "grading session opened"
        );
        if session.hierarchy.is_empty() {
            debug!(class_id, "class has no assessments; every total is 0");
        }
        for w in session.weight_warnings() {
            warn!(class_id, warning = ?w, "weight convention not met");
        }
        Ok(session)
    }

    fn load<B>(&mut self, backend: &B) -> Result<(), SessionError>
    where
        B: GradeBackend + ?Sized,
    {
        let assessments = backend.list_assessments(&self.class_id)?;
        let students = backend.list_students(&self.class_id)?;
        let scores = backend.get_scores(&self.class_id)?;
        let exclusions = ExclusionRegistry::load(
            backend,
            &self.class_id,
            students.iter().map(|s| s.id.as_str()),
        )?;

        self.hierarchy = AssessmentHierarchy::from_assessments(assessments);
        self.roster = students.iter().map(|s| s.id.clone()).collect();
        self.students = students;
        self.exclusions = exclusions;
        self.ledger.replace_persisted(scores);
        self.totals.clear();
        Ok(())
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn hierarchy(&self) -> &AssessmentHierarchy {
        &self.hierarchy
    }

    pub fn ledger(&self) -> &ScoreLedger {
        &self.ledger
    }

    pub fn exclusions(&self) -> &ExclusionRegistry {
        &self.exclusions
    }

    pub fn subscribe(&mut self) -> Receiver<Notification> {
        self.bus.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.bus.revision()
    }

    pub fn weight_warnings(&self) -> Vec<WeightWarning> {
        self.hierarchy.weight_warnings(self.options.weight_tolerance)
    }

    pub fn has_student(&self, student_id: &str) -> bool {
        self.roster.contains(student_id)
    }

    pub fn effective_score(&self, student_id: &str, assessment_id: &str) -> EffectiveScore {
        self.ledger.effective_score(student_id, assessment_id)
    }

    pub fn is_excluded(&self, student_id: &str, assessment_id: &str) -> bool {
        self.exclusions.is_excluded(student_id, assessment_id)
    }

    /// Cached per-item breakdown of a student's total.
    pub fn breakdown(&mut self, student_id: &str) -> &TotalBreakdown {
        if !self.totals.contains_key(student_id) {
            let b = calc::compute_breakdown(
                student_id,
                &self.hierarchy,
                |s, a| self.ledger.effective_score(s, a),
                |s, a| self.exclusions.is_excluded(s, a),
            );
            self.totals.insert(student_id.to_string(), b);
        }
        &self.totals[student_id]
    }

    /// Reuses a cached breakdown when one exists.
    pub fn compute_total(&self, student_id: &str) -> f64 {
        if let Some(b) = self.totals.get(student_id) {
            return b.total;
        }
        calc::compute_total(
            student_id,
            &self.hierarchy,
            |s, a| self.ledger.effective_score(s, a),
            |s, a| self.exclusions.is_excluded(s, a),
        )
    }

    /// Percentage a parent earns for one student, for group views.
    pub fn parent_score(&self, student_id: &str, parent_id: &str) -> Option<f64> {
        let parent = self.hierarchy.get(parent_id).filter(|a| a.is_parent)?;
        let children = self.hierarchy.children_of(&parent.id);
        Some(calc::parent_score(
            student_id,
            &children,
            &|s: &str, a: &str| self.ledger.effective_score(s, a),
            &|s: &str, a: &str| self.exclusions.is_excluded(s, a),
        ))
    }

    fn invalidate_student(&mut self, student_id: &str) {
        self.totals.remove(student_id);
    }

    /// Record raw cell input. Never fails: input that cannot be applied
    /// is reported as `Ignored`.
    pub fn set_edit(&mut self, student_id: &str, assessment_id: &str, input: &str) -> EditOutcome {
        if !self.roster.contains(student_id) {
            debug!(student_id, "edit for unknown student ignored");
            return EditOutcome::Ignored;
        }
        let Some(a) = self.hierarchy.get(assessment_id).filter(|a| a.is_leaf()) else {
            debug!(assessment_id, "edit for unknown or parent assessment ignored");
            return EditOutcome::Ignored;
        };
        let value = parse_score_input(input, a.leaf_max());
        self.ledger.set_overlay(student_id, assessment_id, value);
        self.invalidate_student(student_id);
        self.bus.publish(ChangeEvent::OverlayChanged {
            student_id: student_id.to_string(),
            assessment_id: assessment_id.to_string(),
        });
        match value {
            OverlayValue::Score(v) => EditOutcome::Stored(v),
            OverlayValue::Empty => EditOutcome::Cleared,
        }
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.ledger.has_unsaved_changes()
    }

    pub fn pending_edits(&self) -> usize {
        self.ledger.pending_len()
    }

    pub fn save_in_flight(&self) -> bool {
        self.save_in_flight
    }

    /// Whether the Save action should be enabled.
    pub fn can_save(&self) -> bool {
        self.has_unsaved_changes() && !self.save_in_flight
    }

    /// Abandon every unsaved edit.
    pub fn discard_edits(&mut self) {
        if !self.ledger.has_unsaved_changes() {
            return;
        }
        self.ledger.clear_overlay();
        self.totals.clear();
        self.bus.publish(ChangeEvent::OverlayCleared);
    }

    /// First half of a save: diff the overlay against the ledger.
    ///
    /// Returns `None` when nothing differs; the overlay then holds only
    /// no-op or cleared cells and is dropped without a backend call.
    pub fn begin_save(&mut self) -> Result<Option<SaveBatch>, SaveError> {
        if self.save_in_flight {
            return Err(SaveError::InProgress);
        }
        let entries = self.ledger.pending_upserts();
        if entries.is_empty() {
            self.discard_edits();
            return Ok(None);
        }
        self.save_in_flight = true;
        Ok(Some(SaveBatch { entries }))
    }

    /// Second half of a save, given the backend's answer for `batch`.
    pub fn finish_save<B>(
        &mut self,
        backend: &B,
        batch: SaveBatch,
        result: BackendResult<()>,
    ) -> Result<SaveOutcome, SaveError>
    where
        B: GradeBackend + ?Sized,
    {
        self.save_in_flight = false;
        let count = batch.entries.len();
        if let Err(e) = result {
            warn!(class_id = %self.class_id, count, error = %e, "score save failed; edits kept");
            return Err(SaveError::Backend(e));
        }

        let scores = backend.get_scores(&self.class_id).map_err(|e| {
            warn!(class_id = %self.class_id, count, error = %e, "scores saved but reload failed");
            SaveError::Refresh(e)
        })?;
        let reverted_clears = self.ledger.cleared_over_persisted();
        self.ledger.replace_persisted(scores);
        // Cleared wholesale: the refreshed ledger is the source of truth.
        self.ledger.clear_overlay();
        self.totals.clear();
        info!(class_id = %self.class_id, count, reverted_clears, "scores saved");
        self.bus.publish(ChangeEvent::Saved { count });
        Ok(SaveOutcome::Saved {
            count,
            reverted_clears,
        })
    }

    pub fn save_all<B>(&mut self, backend: &B) -> Result<SaveOutcome, SaveError>
    where
        B: GradeBackend + ?Sized,
    {
        let reverted_clears = self.ledger.cleared_over_persisted();
        let Some(batch) = self.begin_save()? else {
            if reverted_clears > 0 {
                warn!(
                    class_id = %self.class_id,
                    reverted_clears,
                    "cleared cells reverted to their stored scores"
                );
            }
            return Ok(SaveOutcome::NothingToSave { reverted_clears });
        };
        let result = backend.upsert_scores(&self.class_id, batch.entries());
        self.finish_save(backend, batch, result)
    }

    /// Exclude or include one assessment for one student, then reload that
    /// student's exclusions and the score ledger.
    ///
    /// Once the backend accepts the toggle, the local flag, cached total and
    /// change event follow it even if the reload fails (`SessionError::Reload`).
    pub fn set_excluded<B>(
        &mut self,
        backend: &B,
        student_id: &str,
        assessment_id: &str,
        excluded: bool,
    ) -> Result<ToggleOutcome, SessionError>
    where
        B: GradeBackend + ?Sized,
    {
        if !self.roster.contains(student_id) {
            return Err(SessionError::UnknownStudent(student_id.to_string()));
        }
        if !self.hierarchy.contains(assessment_id) {
            return Err(SessionError::UnknownAssessment(assessment_id.to_string()));
        }

        let outcome = if excluded {
            exclusions::exclude(backend, student_id, &self.class_id, assessment_id)?
        } else {
            exclusions::include(backend, student_id, &self.class_id, assessment_id)?
        };

        self.exclusions.set(student_id, assessment_id, excluded);
        self.invalidate_student(student_id);
        self.bus.publish(ChangeEvent::ExclusionChanged {
            student_id: student_id.to_string(),
            assessment_id: assessment_id.to_string(),
            excluded,
        });

        if let Err(e) = self.reload_after_toggle(backend, student_id) {
            warn!(
                class_id = %self.class_id,
                student_id,
                error = %e,
                "exclusion saved but reload failed"
            );
            return Err(SessionError::Reload(e));
        }
        Ok(outcome)
    }

    fn reload_after_toggle<B>(&mut self, backend: &B, student_id: &str) -> BackendResult<()>
    where
        B: GradeBackend + ?Sized,
    {
        self.exclusions
            .reload_student(backend, &self.class_id, student_id)?;
        let scores = backend.get_scores(&self.class_id)?;
        self.ledger.replace_persisted(scores);
        self.totals.clear();
        Ok(())
    }

    /// Reload everything from the backend. Unsaved edits survive unless
    /// their student or assessment no longer exists.
    pub fn refresh<B>(&mut self, backend: &B) -> Result<(), SessionError>
    where
        B: GradeBackend + ?Sized,
    {
        self.load(backend)?;
        let hierarchy = &self.hierarchy;
        let roster = &self.roster;
        let dropped = self.ledger.retain_overlay(|sid, aid| {
            roster.contains(sid) && hierarchy.get(aid).map(|a| a.is_leaf()).unwrap_or(false)
        });
        if dropped > 0 {
            warn!(
                class_id = %self.class_id,
                dropped,
                "dropped edits for removed students or assessments"
            );
        }
        self.bus.publish(ChangeEvent::LedgerRefreshed);
        Ok(())
    }
}
