use crate::config;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{bool_param, ensure_can_leave};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "sessionClassId": state.session.as_ref().map(|s| s.session.class_id().to_string()),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let discard = bool_param(req, "discard").unwrap_or(false);
    if let Err(e) = ensure_can_leave(state.session.as_ref(), discard) {
        return e.response(&req.id);
    }

    let cfg = match config::load_config(&path) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "bad_config", e.to_string(), None),
    };

    match db::open_db(&path, &cfg.db_file_name) {
        Ok(conn) => {
            info!(workspace = %path.display(), "workspace selected");
            state.session = None;
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            state.config = cfg;
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "config": {
                        "dbFileName": state.config.db_file_name,
                        "maxUpsertEntries": state.config.max_upsert_entries,
                        "weightTolerance": state.config.weight_tolerance,
                    }
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
