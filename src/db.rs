use crate::backend::{BackendError, BackendResult, GradeBackend};
use crate::model::{Assessment, ScoreEntry, ScoreUpsert, Student};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

pub fn open_db(workspace: &Path, file_name: &str) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(file_name))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            is_parent INTEGER NOT NULL,
            parent_id TEXT,
            weight_points REAL NOT NULL,
            max_score REAL,
            sort_order INTEGER,
            date TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(parent_id) REFERENCES assessments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_class ON assessments(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_parent ON assessments(parent_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            student_id TEXT NOT NULL,
            assessment_id TEXT NOT NULL,
            raw_score REAL,
            PRIMARY KEY(student_id, assessment_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(assessment_id) REFERENCES assessments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_assessment ON scores(assessment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exclusions(
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            assessment_id TEXT NOT NULL,
            PRIMARY KEY(student_id, class_id, assessment_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(assessment_id) REFERENCES assessments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exclusions_class ON exclusions(class_id)",
        [],
    )?;

    Ok(())
}

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub id: String,
    pub name: String,
}

pub fn create_class(conn: &Connection, name: &str) -> BackendResult<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO classes(id, name) VALUES(?, ?)", (&id, name))?;
    Ok(id)
}

pub fn list_classes(conn: &Connection) -> BackendResult<Vec<ClassRow>> {
    let mut stmt = conn.prepare("SELECT id, name FROM classes ORDER BY name, id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassRow {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn class_exists(conn: &Connection, class_id: &str) -> BackendResult<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub fn create_student(conn: &Connection, class_id: &str, name: &str) -> BackendResult<String> {
    if !class_exists(conn, class_id)? {
        return Err(BackendError::NotFound);
    }
    let next_sort: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, name, sort_order) VALUES(?, ?, ?, ?)",
        (&id, class_id, name, next_sort),
    )?;
    Ok(id)
}

/// Fields accepted when creating an assessment.
#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub class_id: String,
    pub name: String,
    pub is_parent: bool,
    pub parent_id: Option<String>,
    pub weight_points: f64,
    pub max_score: Option<f64>,
    pub sort_order: Option<i64>,
    pub date: Option<NaiveDate>,
}

pub fn create_assessment(conn: &Connection, new: &NewAssessment) -> BackendResult<String> {
    if !class_exists(conn, &new.class_id)? {
        return Err(BackendError::NotFound);
    }
    if !new.weight_points.is_finite() || new.weight_points < 0.0 {
        return Err(BackendError::Rejected(
            "weightPoints must be a non-negative number".to_string(),
        ));
    }
    if new.is_parent {
        if new.max_score.is_some() {
            return Err(BackendError::Rejected(
                "parent assessments have no maxScore".to_string(),
            ));
        }
        if new.parent_id.is_some() {
            return Err(BackendError::Rejected(
                "parent assessments cannot be nested".to_string(),
            ));
        }
    } else {
        match new.max_score {
            Some(m) if m.is_finite() && m > 0.0 => {}
            _ => {
                return Err(BackendError::Rejected(
                    "leaf assessments need maxScore > 0".to_string(),
                ))
            }
        }
    }
    if let Some(pid) = new.parent_id.as_deref() {
        let parent: Option<i64> = conn
            .query_row(
                "SELECT is_parent FROM assessments WHERE id = ? AND class_id = ?",
                (pid, &new.class_id),
                |r| r.get(0),
            )
            .optional()?;
        match parent {
            Some(flag) if flag != 0 => {}
            Some(_) => {
                return Err(BackendError::Rejected(
                    "parentId must reference a parent assessment".to_string(),
                ))
            }
            None => return Err(BackendError::NotFound),
        }
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO assessments(
           id, class_id, name, is_parent, parent_id, weight_points, max_score, sort_order, date
         )
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &new.class_id,
            &new.name,
            new.is_parent as i64,
            new.parent_id.as_deref(),
            new.weight_points,
            new.max_score,
            new.sort_order,
            new.date.map(|d| d.format("%Y-%m-%d").to_string()),
        ),
    )?;
    Ok(id)
}

/// Delete an assessment along with its children and every score and
/// exclusion that references them. Returns how many assessments went.
pub fn delete_assessment(conn: &Connection, assessment_id: &str) -> BackendResult<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut ids: Vec<String> = {
        let mut stmt = tx.prepare("SELECT id FROM assessments WHERE parent_id = ?")?;
        let rows = stmt
            .query_map([assessment_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    ids.push(assessment_id.to_string());

    let mut removed = 0;
    for id in &ids {
        tx.execute("DELETE FROM scores WHERE assessment_id = ?", [id])?;
        tx.execute("DELETE FROM exclusions WHERE assessment_id = ?", [id])?;
        removed += tx.execute("DELETE FROM assessments WHERE id = ?", [id])?;
    }
    if removed == 0 {
        return Err(BackendError::NotFound);
    }
    tx.commit()?;
    Ok(removed)
}

/// `GradeBackend` over a workspace connection.
pub struct SqliteBackend<'a> {
    conn: &'a Connection,
    max_upsert_entries: usize,
}

impl<'a> SqliteBackend<'a> {
    pub fn new(conn: &'a Connection, max_upsert_entries: usize) -> Self {
        Self {
            conn,
            max_upsert_entries,
        }
    }

    fn check_upsert(&self, class_id: &str, e: &ScoreUpsert) -> BackendResult<()> {
        if !e.score.is_finite() || e.score < 0.0 {
            return Err(BackendError::Rejected(format!(
                "score for {}/{} must be a non-negative number",
                e.student_id, e.assessment_id
            )));
        }
        let is_parent: Option<i64> = self
            .conn
            .query_row(
                "SELECT is_parent FROM assessments WHERE id = ? AND class_id = ?",
                (&e.assessment_id, class_id),
                |r| r.get(0),
            )
            .optional()?;
        match is_parent {
            Some(0) => {}
            Some(_) => {
                return Err(BackendError::Rejected(format!(
                    "assessment {} is a parent and holds no scores",
                    e.assessment_id
                )))
            }
            None => {
                return Err(BackendError::Rejected(format!(
                    "assessment {} is not in class {}",
                    e.assessment_id, class_id
                )))
            }
        }
        let student: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM students WHERE id = ? AND class_id = ?",
                (&e.student_id, class_id),
                |r| r.get(0),
            )
            .optional()?;
        if student.is_none() {
            return Err(BackendError::Rejected(format!(
                "student {} is not in class {}",
                e.student_id, class_id
            )));
        }
        Ok(())
    }
}

impl GradeBackend for SqliteBackend<'_> {
    fn list_assessments(&self, class_id: &str) -> BackendResult<Vec<Assessment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, class_id, name, is_parent, parent_id, weight_points, max_score,
                    sort_order, date
             FROM assessments
             WHERE class_id = ?
             ORDER BY sort_order, name",
        )?;
        let rows = stmt
            .query_map([class_id], |r| {
                Ok(Assessment {
                    id: r.get(0)?,
                    class_id: r.get(1)?,
                    name: r.get(2)?,
                    is_parent: r.get::<_, i64>(3)? != 0,
                    parent_id: r.get(4)?,
                    weight_points: r.get(5)?,
                    max_score: r.get(6)?,
                    sort_order: r.get(7)?,
                    date: parse_date(r.get(8)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_students(&self, class_id: &str) -> BackendResult<Vec<Student>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM students WHERE class_id = ? ORDER BY sort_order")?;
        let rows = stmt
            .query_map([class_id], |r| {
                Ok(Student {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_scores(&self, class_id: &str) -> BackendResult<Vec<ScoreEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.student_id, s.assessment_id, s.raw_score,
                    EXISTS(SELECT 1 FROM exclusions e
                           WHERE e.student_id = s.student_id
                             AND e.assessment_id = s.assessment_id
                             AND e.class_id = a.class_id)
             FROM scores s
             JOIN assessments a ON a.id = s.assessment_id
             WHERE a.class_id = ?",
        )?;
        let rows = stmt
            .query_map([class_id], |r| {
                Ok(ScoreEntry {
                    student_id: r.get(0)?,
                    assessment_id: r.get(1)?,
                    raw_score: r.get(2)?,
                    is_excluded: r.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn upsert_scores(&self, class_id: &str, entries: &[ScoreUpsert]) -> BackendResult<()> {
        if entries.len() > self.max_upsert_entries {
            return Err(BackendError::Rejected(format!(
                "batch exceeds max entries: {} > {}",
                entries.len(),
                self.max_upsert_entries
            )));
        }
        // Dropping the transaction without commit rolls the batch back.
        let tx = self.conn.unchecked_transaction()?;
        for e in entries {
            self.check_upsert(class_id, e)?;
            tx.execute(
                "INSERT INTO scores(student_id, assessment_id, raw_score)
                 VALUES(?, ?, ?)
                 ON CONFLICT(student_id, assessment_id) DO UPDATE SET
                   raw_score = excluded.raw_score",
                (&e.student_id, &e.assessment_id, e.score),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn list_exclusions(&self, student_id: &str, class_id: &str) -> BackendResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT assessment_id FROM exclusions
             WHERE student_id = ? AND class_id = ?
             ORDER BY assessment_id",
        )?;
        let rows = stmt
            .query_map((student_id, class_id), |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn create_exclusion(
        &self,
        student_id: &str,
        class_id: &str,
        assessment_id: &str,
    ) -> BackendResult<()> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO exclusions(student_id, class_id, assessment_id) VALUES(?, ?, ?)",
            (student_id, class_id, assessment_id),
        )?;
        if changed == 0 {
            return Err(BackendError::AlreadyExcluded);
        }
        Ok(())
    }

    fn delete_exclusion(
        &self,
        student_id: &str,
        class_id: &str,
        assessment_id: &str,
    ) -> BackendResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM exclusions WHERE student_id = ? AND class_id = ? AND assessment_id = ?",
            (student_id, class_id, assessment_id),
        )?;
        if changed == 0 {
            return Err(BackendError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Seed {
        conn: Connection,
        class_id: String,
        student_id: String,
        quiz_id: String,
        project_id: String,
    }

    fn seed() -> Seed {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        init_schema(&conn).expect("schema");
        let class_id = create_class(&conn, "Math 9").expect("class");
        let student_id = create_student(&conn, &class_id, "Ada").expect("student");
        let quiz_id = create_assessment(
            &conn,
            &NewAssessment {
                class_id: class_id.clone(),
                name: "Quiz".to_string(),
                is_parent: false,
                parent_id: None,
                weight_points: 40.0,
                max_score: Some(50.0),
                sort_order: Some(0),
                date: NaiveDate::from_ymd_opt(2026, 9, 14),
            },
        )
        .expect("quiz");
        let project_id = create_assessment(
            &conn,
            &NewAssessment {
                class_id: class_id.clone(),
                name: "Project".to_string(),
                is_parent: true,
                parent_id: None,
                weight_points: 60.0,
                max_score: None,
                sort_order: Some(1),
                date: None,
            },
        )
        .expect("project");
        Seed {
            conn,
            class_id,
            student_id,
            quiz_id,
            project_id,
        }
    }

    fn upsert(s: &Seed, assessment_id: &str, score: f64) -> ScoreUpsert {
        ScoreUpsert {
            student_id: s.student_id.clone(),
            assessment_id: assessment_id.to_string(),
            score,
        }
    }

    #[test]
    fn assessments_round_trip_with_dates() {
        let s = seed();
        let backend = SqliteBackend::new(&s.conn, 10);
        let list = backend.list_assessments(&s.class_id).expect("list");
        assert_eq!(list.len(), 2);
        let quiz = list.iter().find(|a| a.id == s.quiz_id).expect("quiz row");
        assert_eq!(quiz.date, NaiveDate::from_ymd_opt(2026, 9, 14));
        assert_eq!(quiz.max_score, Some(50.0));
        let project = list.iter().find(|a| a.id == s.project_id).expect("project row");
        assert!(project.is_parent);
        assert_eq!(project.max_score, None);
    }

    #[test]
    fn create_assessment_enforces_shape() {
        let s = seed();
        let bad_leaf = NewAssessment {
            class_id: s.class_id.clone(),
            name: "Bad".to_string(),
            is_parent: false,
            parent_id: None,
            weight_points: 10.0,
            max_score: Some(0.0),
            sort_order: None,
            date: None,
        };
        assert!(matches!(
            create_assessment(&s.conn, &bad_leaf),
            Err(BackendError::Rejected(_))
        ));
        let under_leaf = NewAssessment {
            max_score: Some(10.0),
            parent_id: Some(s.quiz_id.clone()),
            ..bad_leaf.clone()
        };
        assert!(matches!(
            create_assessment(&s.conn, &under_leaf),
            Err(BackendError::Rejected(_))
        ));
        let under_missing = NewAssessment {
            parent_id: Some("nope".to_string()),
            ..under_leaf
        };
        assert!(matches!(
            create_assessment(&s.conn, &under_missing),
            Err(BackendError::NotFound)
        ));
    }

    #[test]
    fn upsert_is_all_or_nothing() {
        let s = seed();
        let backend = SqliteBackend::new(&s.conn, 10);
        backend
            .upsert_scores(&s.class_id, &[upsert(&s, &s.quiz_id, 20.0)])
            .expect("first upsert");

        let err = backend
            .upsert_scores(
                &s.class_id,
                &[upsert(&s, &s.quiz_id, 45.0), upsert(&s, &s.project_id, 5.0)],
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));

        let scores = backend.get_scores(&s.class_id).expect("scores");
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].raw_score, Some(20.0));
    }

    #[test]
    fn upsert_rejects_oversize_batches() {
        let s = seed();
        let backend = SqliteBackend::new(&s.conn, 1);
        let err = backend
            .upsert_scores(
                &s.class_id,
                &[upsert(&s, &s.quiz_id, 1.0), upsert(&s, &s.quiz_id, 2.0)],
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
        assert!(backend.get_scores(&s.class_id).unwrap().is_empty());
    }

    #[test]
    fn exclusions_report_conflicts_and_flag_scores() {
        let s = seed();
        let backend = SqliteBackend::new(&s.conn, 10);
        backend
            .upsert_scores(&s.class_id, &[upsert(&s, &s.quiz_id, 20.0)])
            .unwrap();

        backend
            .create_exclusion(&s.student_id, &s.class_id, &s.quiz_id)
            .expect("exclude");
        assert!(matches!(
            backend.create_exclusion(&s.student_id, &s.class_id, &s.quiz_id),
            Err(BackendError::AlreadyExcluded)
        ));
        assert_eq!(
            backend.list_exclusions(&s.student_id, &s.class_id).unwrap(),
            vec![s.quiz_id.clone()]
        );
        assert!(backend.get_scores(&s.class_id).unwrap()[0].is_excluded);

        backend
            .delete_exclusion(&s.student_id, &s.class_id, &s.quiz_id)
            .expect("include");
        assert!(matches!(
            backend.delete_exclusion(&s.student_id, &s.class_id, &s.quiz_id),
            Err(BackendError::NotFound)
        ));
        assert!(!backend.get_scores(&s.class_id).unwrap()[0].is_excluded);
    }

    #[test]
    fn deleting_a_parent_removes_children_and_their_scores() {
        let s = seed();
        let part = create_assessment(
            &s.conn,
            &NewAssessment {
                class_id: s.class_id.clone(),
                name: "Part A".to_string(),
                is_parent: false,
                parent_id: Some(s.project_id.clone()),
                weight_points: 60.0,
                max_score: Some(10.0),
                sort_order: Some(0),
                date: None,
            },
        )
        .expect("part");
        let backend = SqliteBackend::new(&s.conn, 10);
        backend
            .upsert_scores(&s.class_id, &[upsert(&s, &part, 7.0)])
            .unwrap();
        backend
            .create_exclusion(&s.student_id, &s.class_id, &part)
            .unwrap();

        assert_eq!(delete_assessment(&s.conn, &s.project_id).unwrap(), 2);
        assert!(backend.get_scores(&s.class_id).unwrap().is_empty());
        assert!(backend
            .list_exclusions(&s.student_id, &s.class_id)
            .unwrap()
            .is_empty());
        assert_eq!(backend.list_assessments(&s.class_id).unwrap().len(), 1);
        assert!(matches!(
            delete_assessment(&s.conn, &s.project_id),
            Err(BackendError::NotFound)
        ));
    }
}
