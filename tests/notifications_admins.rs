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
    let exe = env!("CARGO_BIN_EXE_examgridd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn examgridd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn notifications_list_newest_first() {
    let workspace = temp_dir("examgrid-notifications");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "notifications.create",
        json!({ "title": "Seating generated", "message": "Internal Exam - Oct is ready" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "notifications.create",
        json!({ "title": "Seating published", "message": "Internal Exam - Oct is visible" }),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "notifications.list",
        json!({}),
    );
    let notifications = listed["notifications"].as_array().expect("notifications");
    assert_eq!(notifications.len(), 2);
    assert_eq!(
        notifications[0]["title"].as_str(),
        Some("Seating published")
    );
    assert_eq!(
        notifications[1]["title"].as_str(),
        Some("Seating generated")
    );
    assert!(notifications[0]["createdAt"]
        .as_str()
        .is_some_and(|s| !s.is_empty()));

    let bad = request(
        &mut stdin,
        &mut reader,
        "5",
        "notifications.create",
        json!({ "title": "   ", "message": "x" }),
    );
    assert_eq!(bad["error"]["code"].as_str(), Some("bad_params"));
}

#[test]
fn admins_create_list_delete_with_unique_email() {
    let workspace = temp_dir("examgrid-admins");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "admins.create",
        json!({ "name": "Priya", "email": "Priya@example.edu" }),
    );
    let admin_id = created["admin"]["id"].as_str().expect("id").to_string();
    // Emails are stored lowercased.
    assert_eq!(created["admin"]["email"].as_str(), Some("priya@example.edu"));

    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "admins.create",
        json!({ "name": "Other", "email": "priya@example.edu" }),
    );
    assert_eq!(dup["error"]["code"].as_str(), Some("conflict"));

    let invalid = request(
        &mut stdin,
        &mut reader,
        "4",
        "admins.create",
        json!({ "name": "X", "email": "not-an-email" }),
    );
    assert_eq!(invalid["error"]["code"].as_str(), Some("bad_params"));

    let listed = request_ok(&mut stdin, &mut reader, "5", "admins.list", json!({}));
    assert_eq!(listed["admins"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(listed["cached"].as_bool(), Some(false));
    let cached = request_ok(&mut stdin, &mut reader, "6", "admins.list", json!({}));
    assert_eq!(cached["cached"].as_bool(), Some(true));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "admins.delete",
        json!({ "adminId": admin_id }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "8", "admins.list", json!({}));
    assert_eq!(listed["admins"], json!([]));

    let missing = request(
        &mut stdin,
        &mut reader,
        "9",
        "admins.delete",
        json!({ "adminId": "nope" }),
    );
    assert_eq!(missing["error"]["code"].as_str(), Some("not_found"));
}
