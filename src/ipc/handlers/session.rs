use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    backend, bool_param, ensure_can_leave, require_db, require_session, require_str, respond,
    status_json,
};
use crate::ipc::types::{AppState, OpenSession, Request};
use crate::notify;
use crate::session::{GradebookSession, SessionOptions};
use serde_json::json;
use tracing::info;

fn handle_session_open(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state.db.as_ref())?;
    let class_id = require_str(req, "classId")?;
    let discard = bool_param(req, "discard").unwrap_or(false);
    ensure_can_leave(state.session.as_ref(), discard)?;

    if !db::class_exists(conn, class_id)? {
        return Err(HandlerErr::new("not_found", "class not found")
            .with_details(json!({ "classId": class_id })));
    }

    let options = SessionOptions {
        weight_tolerance: state.config.weight_tolerance,
        ..SessionOptions::default()
    };
    let mut session = GradebookSession::open(&backend(conn, &state.config), class_id, options)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let events = session.subscribe();
    let warnings = session.weight_warnings();
    state.session = Some(OpenSession { session, events });

    Ok(json!({
        "status": status_json(state.session.as_ref()),
        "weightWarnings": warnings,
    }))
}

fn handle_session_close(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let discard = bool_param(req, "discard").unwrap_or(false);
    ensure_can_leave(state.session.as_ref(), discard)?;
    if let Some(open) = state.session.take() {
        info!(
            class_id = open.session.class_id(),
            discarded = open.session.pending_edits(),
            "grading session closed"
        );
    }
    Ok(json!({ "status": status_json(None) }))
}

fn handle_session_status(
    state: &mut AppState,
    _req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    Ok(status_json(state.session.as_ref()))
}

fn handle_session_events(
    state: &mut AppState,
    _req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let open = require_session(state.session.as_mut())?;
    let events = notify::drain(&open.events);
    Ok(json!({
        "revision": open.session.revision(),
        "events": events,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "session.open" => handle_session_open(state, req),
        "session.close" => handle_session_close(state, req),
        "session.status" => handle_session_status(state, req),
        "session.events" => handle_session_events(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
