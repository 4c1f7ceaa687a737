#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub struct Sidecar {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_gradebookd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn gradebookd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Raw response envelope.
    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Error code of a request expected to fail.
    pub fn request_err(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }

    pub fn shutdown(self) {
        let Sidecar { mut child, stdin, .. } = self;
        drop(stdin);
        let _ = child.wait();
    }
}

pub fn str_at<'a>(v: &'a serde_json::Value, pointer: &str) -> &'a str {
    v.pointer(pointer)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing string at {pointer} in {v}"))
}

pub fn f64_at(v: &serde_json::Value, pointer: &str) -> f64 {
    v.pointer(pointer)
        .and_then(|v| v.as_f64())
        .unwrap_or_else(|| panic!("missing number at {pointer} in {v}"))
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

/// Ids of a class built for weighted-total scenarios.
pub struct MixedClass {
    pub class_id: String,
    pub s1: String,
    pub s2: String,
    pub quiz: String,
    pub project: String,
    pub part_a: String,
    pub part_b: String,
}

/// Quiz (40 points, out of 50) plus Project (60 points) split into two
/// 30-point parts out of 10 each. s1 has quiz 25, parts 10 and 5.
pub fn setup_mixed_class(sc: &mut Sidecar, workspace: &std::path::Path) -> MixedClass {
    sc.request_ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let class = sc.request_ok("classes.create", json!({ "name": "Period 3" }));
    let class_id = str_at(&class, "/classId").to_string();

    let s1 = sc.request_ok("students.create", json!({ "classId": class_id, "name": "Avery" }));
    let s2 = sc.request_ok("students.create", json!({ "classId": class_id, "name": "Blake" }));

    let quiz = sc.request_ok(
        "assessments.create",
        json!({
            "classId": class_id,
            "name": "Quiz",
            "weightPoints": 40,
            "maxScore": 50,
            "sortOrder": 0,
        }),
    );
    let project = sc.request_ok(
        "assessments.create",
        json!({
            "classId": class_id,
            "name": "Project",
            "isParent": true,
            "weightPoints": 60,
            "sortOrder": 1,
        }),
    );
    let project_id = str_at(&project, "/assessmentId").to_string();
    let part_a = sc.request_ok(
        "assessments.create",
        json!({
            "classId": class_id,
            "name": "Part A",
            "parentId": project_id,
            "weightPoints": 30,
            "maxScore": 10,
            "sortOrder": 0,
        }),
    );
    let part_b = sc.request_ok(
        "assessments.create",
        json!({
            "classId": class_id,
            "name": "Part B",
            "parentId": project_id,
            "weightPoints": 30,
            "maxScore": 10,
            "sortOrder": 1,
        }),
    );

    let ids = MixedClass {
        class_id,
        s1: str_at(&s1, "/studentId").to_string(),
        s2: str_at(&s2, "/studentId").to_string(),
        quiz: str_at(&quiz, "/assessmentId").to_string(),
        project: project_id,
        part_a: str_at(&part_a, "/assessmentId").to_string(),
        part_b: str_at(&part_b, "/assessmentId").to_string(),
    };

    sc.request_ok("session.open", json!({ "classId": ids.class_id }));
    for (aid, input) in [(&ids.quiz, "25"), (&ids.part_a, "10"), (&ids.part_b, "5")] {
        sc.request_ok(
            "edit.set",
            json!({ "studentId": ids.s1, "assessmentId": aid, "input": input }),
        );
    }
    sc.request_ok("session.save", json!({}));
    ids
}
