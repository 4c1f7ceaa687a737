use crate::calc::round_off_1_decimal;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    backend, bool_param, require_db, require_session, require_str, respond, status_json,
};
use crate::ipc::types::{AppState, Request};
use crate::session::SessionError;
use serde_json::json;

fn handle_exclusion_set(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_str(req, "studentId")?;
    let assessment_id = require_str(req, "assessmentId")?;
    let Some(excluded) = bool_param(req, "excluded") else {
        return Err(HandlerErr::new("bad_params", "missing/invalid params.excluded"));
    };
    let conn = require_db(state.db.as_ref())?;
    let open = require_session(state.session.as_mut())?;

    let outcome = open
        .session
        .set_excluded(&backend(conn, &state.config), student_id, assessment_id, excluded)
        .map_err(|e| {
            let message = e.to_string();
            match e {
                SessionError::Backend(b) => HandlerErr::from(b),
                // The toggle is stored and applied; only the follow-up reload failed.
                SessionError::Reload(_) => HandlerErr::new("db_query_failed", message)
                    .with_details(json!({
                        "toggleSaved": true,
                        "excluded": excluded,
                        "status": status_json(Some(&*open)),
                    })),
                SessionError::UnknownStudent(id) => {
                    HandlerErr::new("not_found", message).with_details(json!({ "studentId": id }))
                }
                SessionError::UnknownAssessment(id) => HandlerErr::new("not_found", message)
                    .with_details(json!({ "assessmentId": id })),
            }
        })?;

    let total = open.session.compute_total(student_id);
    Ok(json!({
        "outcome": outcome,
        "excluded": open.session.is_excluded(student_id, assessment_id),
        "total": total,
        "displayTotal": round_off_1_decimal(total),
        "status": status_json(Some(&*open)),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "exclusion.set" => handle_exclusion_set(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
