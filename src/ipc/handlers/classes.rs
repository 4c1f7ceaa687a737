use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{require_db, require_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_classes_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state.db.as_ref())?;
    let name = require_str(req, "name")?.trim();
    if name.is_empty() {
        return Err(HandlerErr::new("bad_params", "class name must not be empty"));
    }
    let class_id = db::create_class(conn, name).map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "classes" }))
    })?;
    Ok(json!({ "classId": class_id }))
}

fn handle_classes_list(
    state: &mut AppState,
    _req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state.db.as_ref())?;
    let classes = db::list_classes(conn)?;
    Ok(json!({ "classes": classes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.create" => handle_classes_create(state, req),
        "classes.list" => handle_classes_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
