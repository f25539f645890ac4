use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_dim, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::seating::{natural_name_cmp, SESSION_MAX_COLS, SESSION_MAX_ROWS};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const HALL_STATUSES: [&str; 2] = ["active", "inactive"];
const HALL_SEATING_TYPES: [&str; 2] = ["chair", "bench"];

fn check_status(status: &str) -> Result<(), HandlerErr> {
    if HALL_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(HandlerErr::bad_params(format!(
            "status must be one of: {}",
            HALL_STATUSES.join(", ")
        )))
    }
}

fn check_seating_type(seating_type: &str) -> Result<(), HandlerErr> {
    if HALL_SEATING_TYPES.contains(&seating_type) {
        Ok(())
    } else {
        Err(HandlerErr::bad_params(format!(
            "seatingType must be one of: {}",
            HALL_SEATING_TYPES.join(", ")
        )))
    }
}

fn check_dims(rows: usize, columns: usize) -> Result<(), HandlerErr> {
    if rows > SESSION_MAX_ROWS || columns > SESSION_MAX_COLS {
        return Err(HandlerErr {
            code: "bad_params",
            message: "hall dimensions are too large".to_string(),
            details: Some(json!({
                "rows": rows,
                "columns": columns,
                "maxRows": SESSION_MAX_ROWS,
                "maxColumns": SESSION_MAX_COLS
            })),
        });
    }
    Ok(())
}

fn hall_json(
    id: &str,
    name: &str,
    rows: i64,
    columns: i64,
    capacity: i64,
    status: &str,
    seating_type: &str,
) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "rows": rows,
        "columns": columns,
        "capacity": capacity,
        "status": status,
        "seatingType": seating_type,
    })
}

fn load_halls(conn: &Connection) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, name, rows, columns, capacity, status, seating_type FROM halls")
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let mut rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let r: i64 = row.get(2)?;
            let c: i64 = row.get(3)?;
            let cap: i64 = row.get(4)?;
            let status: String = row.get(5)?;
            let seating_type: String = row.get(6)?;
            Ok(hall_json(&id, &name, r, c, cap, &status, &seating_type))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    // Room numbers sort numerically, the way they appear on the floor.
    rows.sort_by(|a, b| {
        natural_name_cmp(
            a.get("name").and_then(|v| v.as_str()).unwrap_or(""),
            b.get("name").and_then(|v| v.as_str()).unwrap_or(""),
        )
    });
    Ok(rows)
}

fn handle_halls_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "halls": [], "cached": false }));
    };
    let force = req
        .params
        .get("force")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    match state
        .cache
        .halls
        .get(force, Utc::now(), || load_halls(conn))
    {
        Ok((halls, cached)) => ok(&req.id, json!({ "halls": halls, "cached": cached })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_halls_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match get_required_str(&req.params, "name") {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        Ok(_) => return err(&req.id, "bad_params", "name must not be empty", None),
        Err(e) => return e.response(&req.id),
    };
    let rows = match get_required_dim(&req.params, "rows") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let columns = match get_required_dim(&req.params, "columns") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = check_dims(rows, columns) {
        return e.response(&req.id);
    }
    let status = get_optional_str(&req.params, "status").unwrap_or_else(|| "active".to_string());
    if let Err(e) = check_status(&status) {
        return e.response(&req.id);
    }
    let seating_type =
        get_optional_str(&req.params, "seatingType").unwrap_or_else(|| "chair".to_string());
    if let Err(e) = check_seating_type(&seating_type) {
        return e.response(&req.id);
    }

    let hall_id = Uuid::new_v4().to_string();
    let capacity = (rows * columns) as i64;
    if let Err(e) = conn.execute(
        "INSERT INTO halls(id, name, rows, columns, capacity, status, seating_type, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &hall_id,
            &name,
            rows as i64,
            columns as i64,
            capacity,
            &status,
            &seating_type,
            Utc::now().to_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "halls" })),
        );
    }

    state.cache.halls.invalidate();
    ok(
        &req.id,
        json!({ "hall": hall_json(&hall_id, &name, rows as i64, columns as i64, capacity, &status, &seating_type) }),
    )
}

fn handle_halls_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let hall_id = match get_required_str(&req.params, "hallId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let existing = match conn
        .query_row(
            "SELECT name, rows, columns, status, seating_type FROM halls WHERE id = ?",
            [&hall_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()
    {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "hall not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let name = match get_optional_str(&req.params, "name") {
        Some(v) if v.trim().is_empty() => {
            return err(&req.id, "bad_params", "name must not be empty", None)
        }
        Some(v) => v.trim().to_string(),
        None => existing.0,
    };
    let rows = match req.params.get("rows") {
        Some(_) => match get_required_dim(&req.params, "rows") {
            Ok(v) => v,
            Err(e) => return e.response(&req.id),
        },
        None => existing.1 as usize,
    };
    let columns = match req.params.get("columns") {
        Some(_) => match get_required_dim(&req.params, "columns") {
            Ok(v) => v,
            Err(e) => return e.response(&req.id),
        },
        None => existing.2 as usize,
    };
    if let Err(e) = check_dims(rows, columns) {
        return e.response(&req.id);
    }
    let status = get_optional_str(&req.params, "status").unwrap_or(existing.3);
    if let Err(e) = check_status(&status) {
        return e.response(&req.id);
    }
    let seating_type = get_optional_str(&req.params, "seatingType").unwrap_or(existing.4);
    if let Err(e) = check_seating_type(&seating_type) {
        return e.response(&req.id);
    }

    let capacity = (rows * columns) as i64;
    if let Err(e) = conn.execute(
        "UPDATE halls
         SET name = ?, rows = ?, columns = ?, capacity = ?, status = ?, seating_type = ?, updated_at = ?
         WHERE id = ?",
        (
            &name,
            rows as i64,
            columns as i64,
            capacity,
            &status,
            &seating_type,
            Utc::now().to_rfc3339(),
            &hall_id,
        ),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "halls" })),
        );
    }

    state.cache.halls.invalidate();
    ok(
        &req.id,
        json!({ "hall": hall_json(&hall_id, &name, rows as i64, columns as i64, capacity, &status, &seating_type) }),
    )
}

fn handle_halls_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let hall_id = match get_required_str(&req.params, "hallId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match conn.execute("DELETE FROM halls WHERE id = ?", [&hall_id]) {
        Ok(0) => err(&req.id, "not_found", "hall not found", None),
        Ok(_) => {
            state.cache.halls.invalidate();
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "halls" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "halls.list" => Some(handle_halls_list(state, req)),
        "halls.create" => Some(handle_halls_create(state, req)),
        "halls.update" => Some(handle_halls_update(state, req)),
        "halls.delete" => Some(handle_halls_delete(state, req)),
        _ => None,
    }
}
