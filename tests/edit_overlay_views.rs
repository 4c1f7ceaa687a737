mod test_support;

use serde_json::json;
use test_support::{approx, f64_at, setup_mixed_class, str_at, Sidecar};

#[test]
fn unsaved_edit_is_visible_in_every_view() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let mut sc = Sidecar::spawn();
    let ids = setup_mixed_class(&mut sc, workspace.path());

    let edited = sc.request_ok(
        "edit.set",
        json!({ "studentId": ids.s1, "assessmentId": ids.part_b, "input": "10" }),
    );
    assert_eq!(str_at(&edited, "/outcome/kind"), "stored");
    assert_eq!(edited.pointer("/cell/dirty").and_then(|v| v.as_bool()), Some(true));
    assert!(approx(f64_at(&edited, "/total"), 80.0), "{edited}");
    assert!(approx(f64_at(&edited, "/displayTotal"), 80.0));

    let grid = sc.request_ok("grid.get", json!({}));
    assert!(approx(f64_at(&grid, "/rows/0/total"), 80.0));
    assert!(approx(f64_at(&grid, "/rows/0/cells/1/parentPercent"), 100.0));

    let group = sc.request_ok("group.get", json!({ "parentId": ids.project }));
    assert!(approx(f64_at(&group, "/rows/0/cells/1/value"), 10.0));
    assert!(approx(f64_at(&group, "/rows/0/total"), 80.0));

    let student = sc.request_ok("student.get", json!({ "studentId": ids.s1 }));
    let part_b = student
        .pointer("/items")
        .and_then(|v| v.as_array())
        .expect("items")
        .iter()
        .find(|item| {
            item.pointer("/assessment/id").and_then(|v| v.as_str()) == Some(ids.part_b.as_str())
        })
        .expect("part b item")
        .clone();
    assert!(approx(f64_at(&part_b, "/cell/value"), 10.0));
    assert!(approx(f64_at(&student, "/total"), 80.0));

    // Nothing reached the store yet.
    let scores = sc.request_ok("scores.list", json!({ "classId": ids.class_id }));
    let stored = scores
        .pointer("/scores")
        .and_then(|v| v.as_array())
        .expect("scores")
        .iter()
        .find(|s| s.get("assessmentId").and_then(|v| v.as_str()) == Some(ids.part_b.as_str()))
        .and_then(|s| s.get("rawScore"))
        .and_then(|v| v.as_f64());
    assert_eq!(stored, Some(5.0));

    let status = sc.request_ok("session.status", json!({}));
    assert_eq!(status.get("hasUnsavedChanges").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(status.get("canSave").and_then(|v| v.as_bool()), Some(true));

    sc.shutdown();
}

#[test]
fn save_sends_only_changed_cells() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let mut sc = Sidecar::spawn();
    let ids = setup_mixed_class(&mut sc, workspace.path());

    // Same as stored, out of range, cleared, junk.
    for (sid, aid, input) in [
        (&ids.s1, &ids.quiz, json!("25")),
        (&ids.s1, &ids.part_a, json!(7)),
        (&ids.s2, &ids.quiz, json!("80")),
        (&ids.s2, &ids.part_a, json!("")),
        (&ids.s2, &ids.part_b, json!("abc")),
    ] {
        sc.request_ok("edit.set", json!({ "studentId": sid, "assessmentId": aid, "input": input }));
    }

    let saved = sc.request_ok("session.save", json!({}));
    assert_eq!(str_at(&saved, "/outcome/kind"), "saved");
    assert_eq!(saved.pointer("/outcome/count").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(saved.pointer("/status/hasUnsavedChanges").and_then(|v| v.as_bool()), Some(false));

    let scores = sc.request_ok("scores.list", json!({ "classId": ids.class_id }));
    let rows = scores.pointer("/scores").and_then(|v| v.as_array()).expect("scores");
    assert_eq!(rows.len(), 4);
    let s2_quiz = rows
        .iter()
        .find(|s| {
            s.get("studentId").and_then(|v| v.as_str()) == Some(ids.s2.as_str())
                && s.get("assessmentId").and_then(|v| v.as_str()) == Some(ids.quiz.as_str())
        })
        .expect("s2 quiz stored");
    assert_eq!(s2_quiz.get("rawScore").and_then(|v| v.as_f64()), Some(50.0));

    let nothing = sc.request_ok("session.save", json!({}));
    assert_eq!(str_at(&nothing, "/outcome/kind"), "nothingToSave");
    assert_eq!(nothing.pointer("/outcome/revertedClears").and_then(|v| v.as_u64()), Some(0));

    // A stored score cannot be deleted; clearing it reverts on save.
    sc.request_ok(
        "edit.set",
        json!({ "studentId": ids.s1, "assessmentId": ids.quiz, "input": "" }),
    );
    let reverted = sc.request_ok("session.save", json!({}));
    assert_eq!(str_at(&reverted, "/outcome/kind"), "nothingToSave");
    assert_eq!(reverted.pointer("/outcome/revertedClears").and_then(|v| v.as_u64()), Some(1));
    let student = sc.request_ok("student.get", json!({ "studentId": ids.s1 }));
    assert!(approx(f64_at(&student, "/items/0/cell/value"), 25.0), "{student}");

    sc.shutdown();
}

#[test]
fn edits_on_parents_or_strangers_are_ignored() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let mut sc = Sidecar::spawn();
    let ids = setup_mixed_class(&mut sc, workspace.path());

    let parent = sc.request_ok(
        "edit.set",
        json!({ "studentId": ids.s1, "assessmentId": ids.project, "input": "50" }),
    );
    assert_eq!(str_at(&parent, "/outcome/kind"), "ignored");
    assert!(parent.get("cell").map(|v| v.is_null()).unwrap_or(false));

    let stranger = sc.request_ok(
        "edit.set",
        json!({ "studentId": "ghost", "assessmentId": ids.quiz, "input": "50" }),
    );
    assert_eq!(str_at(&stranger, "/outcome/kind"), "ignored");
    assert_eq!(
        stranger.pointer("/status/hasUnsavedChanges").and_then(|v| v.as_bool()),
        Some(false)
    );

    assert_eq!(
        sc.request_err(
            "edit.set",
            json!({ "studentId": ids.s1, "assessmentId": ids.quiz, "input": [1] }),
        ),
        "bad_params"
    );

    sc.shutdown();
}

#[test]
fn events_report_each_change_in_order() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let mut sc = Sidecar::spawn();
    let ids = setup_mixed_class(&mut sc, workspace.path());
    let _ = sc.request_ok("session.events", json!({}));

    sc.request_ok(
        "edit.set",
        json!({ "studentId": ids.s2, "assessmentId": ids.quiz, "input": "40" }),
    );
    sc.request_ok("edit.discard", json!({}));

    let events = sc.request_ok("session.events", json!({}));
    let list = events.pointer("/events").and_then(|v| v.as_array()).expect("events");
    let kinds: Vec<&str> = list
        .iter()
        .map(|e| e.pointer("/event/kind").and_then(|v| v.as_str()).expect("kind"))
        .collect();
    assert_eq!(kinds, vec!["overlayChanged", "overlayCleared"]);
    let revisions: Vec<u64> = list
        .iter()
        .map(|e| e.get("revision").and_then(|v| v.as_u64()).expect("revision"))
        .collect();
    assert!(revisions[0] < revisions[1]);
    assert_eq!(events.get("revision").and_then(|v| v.as_u64()), Some(revisions[1]));

    sc.shutdown();
}
