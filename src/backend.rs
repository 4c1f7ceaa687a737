use crate::model::{Assessment, ScoreEntry, ScoreUpsert, Student};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("assessment is already excluded")]
    AlreadyExcluded,

    #[error("not found")]
    NotFound,

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage collaborator the grading session reads from and writes to.
pub trait GradeBackend {
    fn list_assessments(&self, class_id: &str) -> BackendResult<Vec<Assessment>>;

    fn list_students(&self, class_id: &str) -> BackendResult<Vec<Student>>;

    fn get_scores(&self, class_id: &str) -> BackendResult<Vec<ScoreEntry>>;

    /// All-or-nothing from the caller's point of view.
    fn upsert_scores(&self, class_id: &str, entries: &[ScoreUpsert]) -> BackendResult<()>;

    /// Assessment ids excluded for one student in one class.
    fn list_exclusions(&self, student_id: &str, class_id: &str) -> BackendResult<Vec<String>>;

    fn create_exclusion(
        &self,
        student_id: &str,
        class_id: &str,
        assessment_id: &str,
    ) -> BackendResult<()>;

    fn delete_exclusion(
        &self,
        student_id: &str,
        class_id: &str,
        assessment_id: &str,
    ) -> BackendResult<()>;
}
