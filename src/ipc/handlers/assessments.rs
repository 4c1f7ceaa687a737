use crate::backend::GradeBackend;
use crate::config::DaemonConfig;
use crate::db::{self, NewAssessment};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    assessment_json, backend, bool_param, require_db, require_str, respond, str_param,
};
use crate::ipc::types::{AppState, OpenSession, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn parse_new_assessment(req: &Request) -> Result<NewAssessment, HandlerErr> {
    let class_id = require_str(req, "classId")?.to_string();
    let name = require_str(req, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::new("bad_params", "assessment name must not be empty"));
    }
    let Some(weight_points) = req.params.get("weightPoints").and_then(|v| v.as_f64()) else {
        return Err(HandlerErr::new("bad_params", "missing/invalid weightPoints"));
    };
    let max_score = match req.params.get("maxScore") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_f64() {
            Some(n) => Some(n),
            None => return Err(HandlerErr::new("bad_params", "maxScore must be a number")),
        },
    };
    let sort_order = match req.params.get("sortOrder") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_i64() {
            Some(n) => Some(n),
            None => return Err(HandlerErr::new("bad_params", "sortOrder must be an integer")),
        },
    };
    let date = match str_param(req, "date") {
        None => None,
        Some(s) => match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => {
                return Err(HandlerErr::new("bad_params", "date must be YYYY-MM-DD")
                    .with_details(json!({ "date": s })))
            }
        },
    };

    Ok(NewAssessment {
        class_id,
        name,
        is_parent: bool_param(req, "isParent").unwrap_or(false),
        parent_id: str_param(req, "parentId").map(str::to_string),
        weight_points,
        max_score,
        sort_order,
        date,
    })
}

/// Keep an open session on `class_id` in step with assessment changes.
fn refresh_if_open(
    open: Option<&mut OpenSession>,
    conn: &Connection,
    config: &DaemonConfig,
    class_id: &str,
) -> Result<(), HandlerErr> {
    let Some(open) = open else {
        return Ok(());
    };
    if open.session.class_id() != class_id {
        return Ok(());
    }
    open.session
        .refresh(&backend(conn, config))
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn handle_assessments_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state.db.as_ref())?;
    let new = parse_new_assessment(req)?;
    let assessment_id = db::create_assessment(conn, &new)?;
    refresh_if_open(state.session.as_mut(), conn, &state.config, &new.class_id)?;
    Ok(json!({ "assessmentId": assessment_id }))
}

fn handle_assessments_list(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state.db.as_ref())?;
    let class_id = require_str(req, "classId")?;
    let assessments = backend(conn, &state.config).list_assessments(class_id)?;
    let rows: Vec<serde_json::Value> = assessments.iter().map(assessment_json).collect();
    Ok(json!({ "assessments": rows }))
}

fn handle_assessments_delete(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state.db.as_ref())?;
    let assessment_id = require_str(req, "assessmentId")?;
    let class_id: Option<String> = conn
        .query_row(
            "SELECT class_id FROM assessments WHERE id = ?",
            [assessment_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let Some(class_id) = class_id else {
        return Err(HandlerErr::new("not_found", "assessment not found")
            .with_details(json!({ "assessmentId": assessment_id })));
    };
    let removed = db::delete_assessment(conn, assessment_id)?;
    refresh_if_open(state.session.as_mut(), conn, &state.config, &class_id)?;
    Ok(json!({ "removed": removed }))
}

fn handle_scores_list(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state.db.as_ref())?;
    let class_id = require_str(req, "classId")?;
    let scores = backend(conn, &state.config).get_scores(class_id)?;
    Ok(json!({ "scores": scores }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assessments.create" => handle_assessments_create(state, req),
        "assessments.list" => handle_assessments_list(state, req),
        "assessments.delete" => handle_assessments_delete(state, req),
        "scores.list" => handle_scores_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
