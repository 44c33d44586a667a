use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

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

#[test]
fn polled_snapshots_stay_internally_consistent() {
    let workspace = temp_dir("badgebook-progress");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    for i in 0..40 {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{i}"),
            "students.create",
            json!({ "lastName": format!("Student{i}"), "firstName": "Test" }),
        );
        let student_id = created
            .get("studentId")
            .and_then(|v| v.as_str())
            .expect("studentId")
            .to_string();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("a{i}"),
            "attendance.add",
            json!({ "studentId": student_id, "eventDate": "2026-04-01" }),
        );
    }

    // Idle progress: nothing started yet.
    let idle = request_ok(&mut stdin, &mut reader, "idle", "recalc.progress", json!({}));
    let idle = idle.get("progress").cloned().expect("progress");
    assert_eq!(idle.get("startedAt").and_then(|v| v.as_str()), None);
    assert_eq!(idle.get("isComplete").and_then(|v| v.as_bool()), Some(false));

    let started = request_ok(&mut stdin, &mut reader, "run", "recalc.run", json!({}));
    assert_eq!(started.get("started").and_then(|v| v.as_bool()), Some(true));

    let mut finished = false;
    for i in 0..500 {
        let result = request_ok(
            &mut stdin,
            &mut reader,
            &format!("p{i}"),
            "recalc.progress",
            json!({}),
        );
        let progress = result.get("progress").cloned().expect("progress");
        let total = progress
            .get("totalStudents")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let current = progress
            .get("currentStudent")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let complete = progress
            .get("isComplete")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let errored = progress
            .get("isError")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if total > 0 {
            assert!(
                current <= total,
                "currentStudent {} exceeds totalStudents {}",
                current,
                total
            );
        }
        assert!(!(complete && errored), "complete and errored at once");

        if complete {
            assert_eq!(total, 40);
            assert_eq!(current, 40);
            assert!(progress.get("endedAt").and_then(|v| v.as_str()).is_some());
            finished = true;
            break;
        }
        assert!(!errored, "batch errored: {}", progress);
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(finished, "batch never completed");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
