use crate::config::DaemonConfig;
use crate::db::SqliteBackend;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{OpenSession, Request};
use crate::ledger::EffectiveScore;
use crate::model::Assessment;
use crate::session::GradebookSession;
use rusqlite::Connection;
use serde_json::json;

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn str_param<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

pub fn require_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, HandlerErr> {
    str_param(req, key)
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing params.{key}")))
}

pub fn bool_param(req: &Request, key: &str) -> Option<bool> {
    req.params.get(key).and_then(|v| v.as_bool())
}

pub fn require_db(db: Option<&Connection>) -> Result<&Connection, HandlerErr> {
    db.ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_session(open: Option<&mut OpenSession>) -> Result<&mut OpenSession, HandlerErr> {
    open.ok_or_else(|| HandlerErr::new("no_session", "open a class session first"))
}

pub fn backend<'a>(conn: &'a Connection, config: &DaemonConfig) -> SqliteBackend<'a> {
    SqliteBackend::new(conn, config.max_upsert_entries)
}

/// Refuse to leave a session holding unsaved edits unless told to discard.
pub fn ensure_can_leave(open: Option<&OpenSession>, discard: bool) -> Result<(), HandlerErr> {
    let Some(open) = open else {
        return Ok(());
    };
    if open.session.has_unsaved_changes() && !discard {
        return Err(HandlerErr::new(
            "unsaved_changes",
            "the open session has unsaved edits; save or pass discard=true",
        )
        .with_details(json!({
            "classId": open.session.class_id(),
            "pendingEdits": open.session.pending_edits(),
        })));
    }
    Ok(())
}

pub fn assessment_json(a: &Assessment) -> serde_json::Value {
    json!({
        "id": a.id,
        "classId": a.class_id,
        "name": a.name,
        "isParent": a.is_parent,
        "parentId": a.parent_id,
        "weightPoints": a.weight_points,
        "maxScore": a.max_score,
        "sortOrder": a.sort_order,
        "date": a.date.map(|d| d.format("%Y-%m-%d").to_string()),
    })
}

/// One leaf cell as every view renders it.
pub fn cell_json(
    session: &GradebookSession,
    student_id: &str,
    assessment_id: &str,
) -> serde_json::Value {
    let effective = session.effective_score(student_id, assessment_id);
    let state = match effective {
        EffectiveScore::Value(_) => "value",
        EffectiveScore::Cleared => "cleared",
        EffectiveScore::NoEntry => "noEntry",
    };
    let dirty = session
        .ledger()
        .overlay_value(student_id, assessment_id)
        .is_some();
    json!({
        "assessmentId": assessment_id,
        "value": effective.value(),
        "state": state,
        "excluded": session.is_excluded(student_id, assessment_id),
        "dirty": dirty,
    })
}

pub fn status_json(open: Option<&OpenSession>) -> serde_json::Value {
    match open {
        None => json!({ "open": false }),
        Some(open) => {
            let s = &open.session;
            json!({
                "open": true,
                "classId": s.class_id(),
                "hasUnsavedChanges": s.has_unsaved_changes(),
                "pendingEdits": s.pending_edits(),
                "canSave": s.can_save(),
                "saveInFlight": s.save_in_flight(),
                "revision": s.revision(),
            })
        }
    }
}
