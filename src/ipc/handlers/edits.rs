use crate::calc::round_off_1_decimal;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    backend, cell_json, require_db, require_session, require_str, respond, status_json,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{EditOutcome, SaveError};
use serde_json::json;

/// Cell input arrives as whatever the client typed; numbers are accepted too.
fn edit_input(req: &Request) -> Result<String, HandlerErr> {
    match req.params.get("input") {
        None | Some(serde_json::Value::Null) => Ok(String::new()),
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(HandlerErr::new("bad_params", "input must be a string or number")),
    }
}

fn handle_edit_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_str(req, "studentId")?;
    let assessment_id = require_str(req, "assessmentId")?;
    let input = edit_input(req)?;
    let open = require_session(state.session.as_mut())?;

    let outcome = open.session.set_edit(student_id, assessment_id, &input);
    let total = match outcome {
        EditOutcome::Ignored => None,
        _ => Some(open.session.compute_total(student_id)),
    };

    let session = &open.session;
    let cell = match outcome {
        EditOutcome::Ignored => serde_json::Value::Null,
        _ => cell_json(session, student_id, assessment_id),
    };
    Ok(json!({
        "outcome": outcome,
        "cell": cell,
        "total": total,
        "displayTotal": total.map(round_off_1_decimal),
        "status": status_json(Some(&*open)),
    }))
}

fn handle_edit_discard(
    state: &mut AppState,
    _req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let open = require_session(state.session.as_mut())?;
    let discarded = open.session.pending_edits();
    open.session.discard_edits();
    Ok(json!({
        "discarded": discarded,
        "status": status_json(Some(&*open)),
    }))
}

fn handle_session_save(
    state: &mut AppState,
    _req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state.db.as_ref())?;
    let open = require_session(state.session.as_mut())?;
    let backend = backend(conn, &state.config);

    match open.session.save_all(&backend) {
        Ok(outcome) => Ok(json!({
            "outcome": outcome,
            "status": status_json(Some(&*open)),
        })),
        Err(SaveError::InProgress) => Err(HandlerErr::new(
            "save_in_progress",
            SaveError::InProgress.to_string(),
        )),
        Err(e) => Err(HandlerErr::new("save_failed", e.to_string()).with_details(json!({
            "pendingEdits": open.session.pending_edits(),
            "refreshFailed": matches!(e, SaveError::Refresh(_)),
        }))),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "edit.set" => handle_edit_set(state, req),
        "edit.discard" => handle_edit_discard(state, req),
        "session.save" => handle_session_save(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
