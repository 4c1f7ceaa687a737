use crate::calc::{round_off_1_decimal, TotalBreakdown};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    assessment_json, cell_json, require_session, require_str, respond, status_json,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Assessment;
use crate::session::GradebookSession;
use serde_json::json;

/// Parent cells show the rolled-up percentage instead of a raw score.
fn parent_cell_json(
    session: &GradebookSession,
    student_id: &str,
    parent: &Assessment,
) -> serde_json::Value {
    json!({
        "assessmentId": parent.id,
        "parentPercent": session.parent_score(student_id, &parent.id).map(round_off_1_decimal),
        "excluded": session.is_excluded(student_id, &parent.id),
    })
}

fn any_cell_json(
    session: &GradebookSession,
    student_id: &str,
    a: &Assessment,
) -> serde_json::Value {
    if a.is_parent {
        parent_cell_json(session, student_id, a)
    } else {
        cell_json(session, student_id, &a.id)
    }
}

fn breakdowns(session: &mut GradebookSession) -> Vec<TotalBreakdown> {
    let ids: Vec<String> = session.students().iter().map(|s| s.id.clone()).collect();
    ids.iter().map(|id| session.breakdown(id).clone()).collect()
}

/// Full gradebook: one row per student, one column per top-level item.
fn handle_grid_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let open = require_session(state.session.as_mut())?;
    let totals = breakdowns(&mut open.session);
    let session = &open.session;

    let top = session.hierarchy().top_level();
    let columns: Vec<serde_json::Value> = top
        .iter()
        .map(|a| {
            let mut col = assessment_json(a);
            let child_ids: Vec<&str> = session
                .hierarchy()
                .children_of(&a.id)
                .iter()
                .map(|c| c.id.as_str())
                .collect();
            col["childIds"] = json!(child_ids);
            col
        })
        .collect();

    let rows: Vec<serde_json::Value> = session
        .students()
        .iter()
        .zip(totals.iter())
        .map(|(st, b)| {
            let cells: Vec<serde_json::Value> =
                top.iter().map(|a| any_cell_json(session, &st.id, a)).collect();
            json!({
                "studentId": st.id,
                "name": st.name,
                "cells": cells,
                "total": b.total,
                "displayTotal": b.display_total(),
                "activeWeight": b.active_weight,
            })
        })
        .collect();

    Ok(json!({
        "classId": session.class_id(),
        "columns": columns,
        "rows": rows,
        "weightWarnings": session.weight_warnings(),
        "status": status_json(Some(&*open)),
    }))
}

/// Per-parent editor: the parent's children for every student.
fn handle_group_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let parent_id = require_str(req, "parentId")?;
    let open = require_session(state.session.as_mut())?;
    if !open
        .session
        .hierarchy()
        .get(parent_id)
        .map(|a| a.is_parent)
        .unwrap_or(false)
    {
        return Err(HandlerErr::new("not_found", "parent assessment not found")
            .with_details(json!({ "parentId": parent_id })));
    }
    let totals = breakdowns(&mut open.session);
    let session = &open.session;

    let Some(parent) = session.hierarchy().get(parent_id) else {
        return Err(HandlerErr::new("not_found", "parent assessment not found"));
    };
    let children = session.hierarchy().children_of(&parent.id);
    let children_points: f64 = children.iter().map(|c| c.weight_points).sum();

    let rows: Vec<serde_json::Value> = session
        .students()
        .iter()
        .zip(totals.iter())
        .map(|(st, b)| {
            let cells: Vec<serde_json::Value> =
                children.iter().map(|c| cell_json(session, &st.id, &c.id)).collect();
            json!({
                "studentId": st.id,
                "name": st.name,
                "cells": cells,
                "parent": parent_cell_json(session, &st.id, parent),
                "total": b.total,
                "displayTotal": b.display_total(),
            })
        })
        .collect();

    Ok(json!({
        "parent": assessment_json(parent),
        "children": children.iter().map(|c| assessment_json(c)).collect::<Vec<_>>(),
        "childrenPoints": children_points,
        "rows": rows,
        "status": status_json(Some(&*open)),
    }))
}

/// Per-student editor: every assessment for one student, in display order.
fn handle_student_get(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_str(req, "studentId")?;
    let open = require_session(state.session.as_mut())?;
    if !open.session.has_student(student_id) {
        return Err(HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id })));
    }
    let breakdown = open.session.breakdown(student_id).clone();
    let session = &open.session;

    let student = session.students().iter().find(|s| s.id == student_id);
    let excluded_ids = session.exclusions().excluded_for(student_id);
    let items: Vec<serde_json::Value> = session
        .hierarchy()
        .flattened()
        .into_iter()
        .map(|a| {
            json!({
                "assessment": assessment_json(a),
                "cell": any_cell_json(session, student_id, a),
            })
        })
        .collect();

    Ok(json!({
        "student": student,
        "items": items,
        "excludedIds": excluded_ids,
        "breakdown": breakdown,
        "total": breakdown.total,
        "displayTotal": breakdown.display_total(),
        "status": status_json(Some(&*open)),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grid.get" => handle_grid_get(state, req),
        "group.get" => handle_group_get(state, req),
        "student.get" => handle_student_get(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
