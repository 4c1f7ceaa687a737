use crate::backend::{BackendError, BackendResult, GradeBackend};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Per-student exclusion flags for one class, keyed by (student, assessment).
#[derive(Debug, Clone, Default)]
pub struct ExclusionRegistry {
    by_student: HashMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ToggleOutcome {
    Changed,
    /// The backend already held the requested state.
    Unchanged,
}

impl ExclusionRegistry {
    #[cfg(test)]
    pub fn from_pairs<I, S, A>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, A)>,
        S: Into<String>,
        A: Into<String>,
    {
        let mut registry = Self::default();
        for (s, a) in pairs {
            registry.by_student.entry(s.into()).or_default().insert(a.into());
        }
        registry
    }

    /// Snapshot for a whole class, fetched student by student.
    pub fn load<B, I>(backend: &B, class_id: &str, student_ids: I) -> BackendResult<Self>
    where
        B: GradeBackend + ?Sized,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut registry = Self::default();
        for sid in student_ids {
            registry.reload_student(backend, class_id, sid.as_ref())?;
        }
        Ok(registry)
    }

    /// Replace one student's flags with the backend's current view.
    pub fn reload_student<B>(
        &mut self,
        backend: &B,
        class_id: &str,
        student_id: &str,
    ) -> BackendResult<()>
    where
        B: GradeBackend + ?Sized,
    {
        let fresh: BTreeSet<String> = backend
            .list_exclusions(student_id, class_id)?
            .into_iter()
            .collect();
        if fresh.is_empty() {
            self.by_student.remove(student_id);
        } else {
            self.by_student.insert(student_id.to_string(), fresh);
        }
        Ok(())
    }

    /// Record a toggle the backend has already accepted.
    pub fn set(&mut self, student_id: &str, assessment_id: &str, excluded: bool) {
        if excluded {
            self.by_student
                .entry(student_id.to_string())
                .or_default()
                .insert(assessment_id.to_string());
            return;
        }
        if let Some(set) = self.by_student.get_mut(student_id) {
            set.remove(assessment_id);
            if set.is_empty() {
                self.by_student.remove(student_id);
            }
        }
    }

    pub fn is_excluded(&self, student_id: &str, assessment_id: &str) -> bool {
        self.by_student
            .get(student_id)
            .map(|set| set.contains(assessment_id))
            .unwrap_or(false)
    }

    pub fn excluded_for(&self, student_id: &str) -> Vec<&str> {
        self.by_student
            .get(student_id)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_student.values().map(BTreeSet::len).sum()
    }
}

/// Exclude an assessment for a student. A duplicate is reported as
/// `Unchanged`, never as an error.
pub fn exclude<B>(
    backend: &B,
    student_id: &str,
    class_id: &str,
    assessment_id: &str,
) -> BackendResult<ToggleOutcome>
where
    B: GradeBackend + ?Sized,
{
    match backend.create_exclusion(student_id, class_id, assessment_id) {
        Ok(()) => Ok(ToggleOutcome::Changed),
        Err(BackendError::AlreadyExcluded) => {
            debug!(student_id, assessment_id, "exclusion already present");
            Ok(ToggleOutcome::Unchanged)
        }
        Err(e) => Err(e),
    }
}

/// Remove an exclusion. A missing exclusion means already included.
pub fn include<B>(
    backend: &B,
    student_id: &str,
    class_id: &str,
    assessment_id: &str,
) -> BackendResult<ToggleOutcome>
where
    B: GradeBackend + ?Sized,
{
    match backend.delete_exclusion(student_id, class_id, assessment_id) {
        Ok(()) => Ok(ToggleOutcome::Changed),
        Err(BackendError::NotFound) => {
            debug!(student_id, assessment_id, "exclusion already absent");
            Ok(ToggleOutcome::Unchanged)
        }
        Err(e) => Err(e),
    }
}
