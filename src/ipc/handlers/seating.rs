use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    get_optional_str, get_required_index, get_required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::seating::{
    build_state, SeatingSession, TransferSource, TransferTarget,
};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;

fn session_snapshot(session: &SeatingSession) -> serde_json::Value {
    let mut snap = session.state.snapshot();
    let obj = snap.as_object_mut().expect("snapshot is an object");
    obj.insert("examId".to_string(), json!(session.exam_id));
    obj.insert("name".to_string(), json!(session.exam_name));
    obj.insert("dirty".to_string(), json!(session.dirty));
    obj.insert(
        "diagnostics".to_string(),
        json!({
            "benchFallbacks": session.stats.bench_fallbacks,
            "droppedSlots": session.stats.dropped_slots,
        }),
    );
    snap
}

fn parse_source(params: &serde_json::Value) -> Result<TransferSource, HandlerErr> {
    let Some(from) = params.get("from") else {
        return Err(HandlerErr::bad_params("missing from"));
    };
    match from.get("kind").and_then(|v| v.as_str()) {
        Some("list") => Ok(TransferSource::List {
            student_id: get_required_str(from, "studentId")?,
        }),
        Some("seat") => Ok(TransferSource::Seat {
            hall_id: get_required_str(from, "hallId")?,
            row: get_required_index(from, "row")?,
            col: get_required_index(from, "col")?,
        }),
        _ => Err(HandlerErr::bad_params("from.kind must be list or seat")),
    }
}

fn parse_target(params: &serde_json::Value) -> Result<TransferTarget, HandlerErr> {
    let Some(to) = params.get("to") else {
        return Err(HandlerErr::bad_params("missing to"));
    };
    match to.get("kind").and_then(|v| v.as_str()) {
        Some("list") => Ok(TransferTarget::List),
        Some("seat") => Ok(TransferTarget::Seat {
            hall_id: get_required_str(to, "hallId")?,
            row: get_required_index(to, "row")?,
            col: get_required_index(to, "col")?,
        }),
        _ => Err(HandlerErr::bad_params("to.kind must be list or seat")),
    }
}

/// Builds a fresh editing session from the exam's stored document.
/// Replaces any session already open; unsaved edits from the previous
/// one are discarded, same as navigating away.
fn handle_seating_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_id = match get_required_str(&req.params, "examId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let row = match conn
        .query_row(
            "SELECT name, document FROM exams WHERE id = ?",
            [&exam_id],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
        )
        .optional()
    {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "exam not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let (exam_name, document_text) = row;

    let document: serde_json::Value = match serde_json::from_str(&document_text) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_document",
                format!("stored document is not valid JSON: {}", e),
                Some(json!({ "examId": exam_id })),
            )
        }
    };

    // A document that fails to build installs no session at all.
    let (editor, stats) = match build_state(&document) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_document",
                e.to_string(),
                Some(json!({ "examId": exam_id })),
            )
        }
    };

    if stats.bench_fallbacks > 0 || stats.dropped_slots > 0 {
        tracing::warn!(
            exam_id = exam_id.as_str(),
            bench_fallbacks = stats.bench_fallbacks,
            dropped_slots = stats.dropped_slots,
            "opened with degraded slot data"
        );
    }

    let session = SeatingSession {
        exam_id,
        exam_name,
        state: editor,
        stats,
        dirty: false,
    };
    let snap = session_snapshot(&session);
    state.session = Some(session);
    ok(&req.id, snap)
}

fn handle_seating_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "open an exam first", None);
    };
    ok(&req.id, session_snapshot(session))
}

fn handle_seating_select_hall(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open an exam first", None);
    };
    let hall_id = match get_required_str(&req.params, "hallId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match session.state.select_hall(&hall_id) {
        Ok(()) => ok(&req.id, json!({ "selectedHallId": hall_id })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

/// One drag/drop gesture. All seat mutation goes through
/// `EditorState::apply_transfer`; this handler only translates wire
/// descriptors and error codes.
fn handle_seating_transfer(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open an exam first", None);
    };
    let from = match parse_source(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let to = match parse_target(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match session.state.apply_transfer(from, to) {
        Ok(outcome) => {
            session.dirty |= outcome.changed();
            ok(
                &req.id,
                json!({ "changed": outcome.changed(), "action": outcome.action() }),
            )
        }
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_seating_add_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open an exam first", None);
    };
    let name = match get_required_str(&req.params, "name") {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        Ok(_) => return err(&req.id, "bad_params", "name must not be empty", None),
        Err(e) => return e.response(&req.id),
    };
    let roll_no = get_optional_str(&req.params, "rollNo");

    match session.state.add_student(name, roll_no) {
        Ok(student) => {
            let result = json!({
                "student": {
                    "id": student.id,
                    "name": student.name,
                    "rollNo": student.roll_no,
                }
            });
            session.dirty = true;
            ok(&req.id, result)
        }
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_seating_update_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open an exam first", None);
    };
    let student_id = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let name = get_optional_str(&req.params, "name");
    let roll_no = get_optional_str(&req.params, "rollNo");
    if name.is_none() && roll_no.is_none() {
        return err(&req.id, "bad_params", "nothing to update", None);
    }

    match session.state.update_student(&student_id, name, roll_no) {
        Ok(()) => {
            session.dirty = true;
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_seating_remove_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open an exam first", None);
    };
    let student_id = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match session.state.remove_student(&student_id) {
        Ok(()) => {
            session.dirty = true;
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

/// Serializes the session back to the wire document and writes it to the
/// exam row in one statement. On failure the session stays dirty and the
/// user retries; there is no partial save.
fn handle_seating_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open an exam first", None);
    };

    let document = session.state.serialize_document(&session.exam_id);
    let updated = match conn.execute(
        "UPDATE exams SET document = ?, updated_at = ? WHERE id = ?",
        (
            document.to_string(),
            Utc::now().to_rfc3339(),
            &session.exam_id,
        ),
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if updated == 0 {
        return err(&req.id, "not_found", "exam no longer exists", None);
    }

    session.dirty = false;
    let seated = session.state.seated_count();
    let unallocated = session.state.unallocated.len();
    state.cache.exams.invalidate();
    ok(
        &req.id,
        json!({ "saved": true, "seated": seated, "unallocated": unallocated }),
    )
}

fn handle_seating_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let had_session = state.session.take().is_some();
    ok(&req.id, json!({ "closed": had_session }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "seating.open" => Some(handle_seating_open(state, req)),
        "seating.state" => Some(handle_seating_state(state, req)),
        "seating.selectHall" => Some(handle_seating_select_hall(state, req)),
        "seating.transfer" => Some(handle_seating_transfer(state, req)),
        "seating.addStudent" => Some(handle_seating_add_student(state, req)),
        "seating.updateStudent" => Some(handle_seating_update_student(state, req)),
        "seating.removeStudent" => Some(handle_seating_remove_student(state, req)),
        "seating.save" => Some(handle_seating_save(state, req)),
        "seating.close" => Some(handle_seating_close(state, req)),
        _ => None,
    }
}
