use crate::backend::{BackendError, GradeBackend};
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{backend, require_db, require_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_students_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state.db.as_ref())?;
    let class_id = require_str(req, "classId")?;
    let name = require_str(req, "name")?.trim();
    if name.is_empty() {
        return Err(HandlerErr::new("bad_params", "student name must not be empty"));
    }
    let student_id = db::create_student(conn, class_id, name).map_err(|e| match e {
        BackendError::NotFound => HandlerErr::new("not_found", "class not found")
            .with_details(json!({ "classId": class_id })),
        other => HandlerErr::new("db_insert_failed", other.to_string())
            .with_details(json!({ "table": "students" })),
    })?;

    if let Some(open) = state.session.as_mut() {
        if open.session.class_id() == class_id {
            open.session
                .refresh(&backend(conn, &state.config))
                .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
        }
    }
    Ok(json!({ "studentId": student_id }))
}

fn handle_students_list(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state.db.as_ref())?;
    let class_id = require_str(req, "classId")?;
    let students = backend(conn, &state.config).list_students(class_id)?;
    Ok(json!({ "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.create" => handle_students_create(state, req),
        "students.list" => handle_students_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
