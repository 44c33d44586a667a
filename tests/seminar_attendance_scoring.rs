use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_badgebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn badgebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    last: &str,
) -> String {
    request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({ "lastName": last, "firstName": "Test" }),
    )
    .get("studentId")
    .and_then(|v| v.as_str())
    .expect("studentId")
    .to_string()
}

fn seminars(result: &serde_json::Value) -> f64 {
    result
        .get("scores")
        .and_then(|s| s.get("seminarsWebinars"))
        .and_then(|v| v.as_f64())
        .expect("seminarsWebinars")
}

#[test]
fn scoreless_rows_count_and_cap_at_ten() {
    let workspace = temp_dir("badgebook-seminar-count");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = create_student(&mut stdin, &mut reader, "2", "Nakamura");

    // Explicit null score mimics rows from before the score column existed.
    let mut last = json!({});
    for i in 0..3 {
        last = request_ok(
            &mut stdin,
            &mut reader,
            &format!("a{i}"),
            "attendance.add",
            json!({
                "studentId": student_id,
                "eventDate": format!("2026-01-{:02}", i + 1),
                "score": null,
            }),
        );
    }
    assert_eq!(seminars(&last), 3.0);

    for i in 3..12 {
        last = request_ok(
            &mut stdin,
            &mut reader,
            &format!("a{i}"),
            "attendance.add",
            json!({
                "studentId": student_id,
                "eventDate": format!("2026-01-{:02}", i + 1),
                "score": null,
            }),
        );
    }
    assert_eq!(seminars(&last), 10.0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn banked_points_floor_and_removal_recomputes() {
    let workspace = temp_dir("badgebook-seminar-points");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = create_student(&mut stdin, &mut reader, "2", "Haddad");

    // Two default-scored confirmations bank 100 each; the half-credit event
    // leaves the sum at 250 -> floor(2.5) = 2.
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.add",
        json!({ "studentId": student_id, "eventDate": "2026-02-01" }),
    );
    let first_id = first
        .get("attendanceId")
        .and_then(|v| v.as_str())
        .expect("attendanceId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.add",
        json!({ "studentId": student_id, "eventDate": "2026-02-08", "score": 50.0 }),
    );
    let third = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.add",
        json!({ "studentId": student_id, "eventDate": "2026-02-15" }),
    );
    assert_eq!(seminars(&third), 2.0);

    // Dropping a full-credit event leaves 150 banked points -> 1.
    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.remove",
        json!({ "attendanceId": first_id }),
    );
    assert_eq!(seminars(&removed), 1.0);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.list",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        listed.get("events").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
