use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::seating;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn load_exams(conn: &Connection) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, exam_date, is_published FROM exams
             ORDER BY updated_at DESC, name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let exam_date: Option<String> = row.get(2)?;
        let is_published: i64 = row.get(3)?;
        Ok(json!({
            "id": id,
            "name": name,
            "examDate": exam_date,
            "isPublished": is_published != 0,
        }))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "exams": [], "cached": false }));
    };
    let force = req
        .params
        .get("force")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    match state
        .cache
        .exams
        .get(force, Utc::now(), || load_exams(conn))
    {
        Ok((exams, cached)) => ok(&req.id, json!({ "exams": exams, "cached": cached })),
        Err(e) => e.response(&req.id),
    }
}

/// Stores a generated seating document as a new (or re-imported) exam.
/// The document is validated by building it once; a document the editor
/// cannot open is rejected here instead of failing later.
fn handle_exams_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match get_required_str(&req.params, "name") {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        Ok(_) => return err(&req.id, "bad_params", "name must not be empty", None),
        Err(e) => return e.response(&req.id),
    };
    let Some(halls) = req.params.get("halls").filter(|v| v.is_object()) else {
        return err(&req.id, "bad_params", "missing halls object", None);
    };
    let exam_id =
        get_optional_str(&req.params, "examId").unwrap_or_else(|| Uuid::new_v4().to_string());
    let exam_date = get_optional_str(&req.params, "examDate");
    let unallocated = req
        .params
        .get("unallocated")
        .cloned()
        .unwrap_or_else(|| json!([]));
    if !unallocated.is_array() {
        return err(&req.id, "bad_params", "unallocated must be an array", None);
    }

    let document = json!({
        "examId": exam_id,
        "halls": halls,
        "unallocated": unallocated,
    });

    let (built, stats) = match seating::build_state(&document) {
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

    let document_text = document.to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO exams(id, name, exam_date, is_published, document, updated_at)
         VALUES(?, ?, ?, 0, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           exam_date = excluded.exam_date,
           document = excluded.document,
           updated_at = excluded.updated_at",
        (
            &exam_id,
            &name,
            &exam_date,
            &document_text,
            Utc::now().to_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "exams" })),
        );
    }

    state.cache.exams.invalidate();
    ok(
        &req.id,
        json!({
            "examId": exam_id,
            "hallCount": built.halls.len(),
            "seated": built.seated_count(),
            "unallocated": built.unallocated.len(),
            "diagnostics": {
                "benchFallbacks": stats.bench_fallbacks,
                "droppedSlots": stats.dropped_slots,
            }
        }),
    )
}

fn handle_exams_set_published(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let exam_id = match get_required_str(&req.params, "examId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(is_published) = req.params.get("isPublished").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing isPublished", None);
    };

    match conn.execute(
        "UPDATE exams SET is_published = ?, updated_at = ? WHERE id = ?",
        (
            is_published as i64,
            Utc::now().to_rfc3339(),
            &exam_id,
        ),
    ) {
        Ok(0) => err(&req.id, "not_found", "exam not found", None),
        Ok(_) => {
            state.cache.exams.invalidate();
            ok(&req.id, json!({ "examId": exam_id, "isPublished": is_published }))
        }
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_exams_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let exam_id = match get_required_str(&req.params, "examId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match conn.execute("DELETE FROM exams WHERE id = ?", [&exam_id]) {
        Ok(0) => err(&req.id, "not_found", "exam not found", None),
        Ok(_) => {
            // An open editing session for this exam has nothing left to
            // save into.
            if state
                .session
                .as_ref()
                .is_some_and(|s| s.exam_id == exam_id)
            {
                tracing::info!(exam_id = exam_id.as_str(), "closing session for deleted exam");
                state.session = None;
            }
            state.cache.exams.invalidate();
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "exams" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.list" => Some(handle_exams_list(state, req)),
        "exams.import" => Some(handle_exams_import(state, req)),
        "exams.setPublished" => Some(handle_exams_set_published(state, req)),
        "exams.delete" => Some(handle_exams_delete(state, req)),
        _ => None,
    }
}
