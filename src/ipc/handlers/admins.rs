use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn load_admins(conn: &Connection) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, name, email, created_at FROM admins ORDER BY name")
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let email: String = row.get(2)?;
        let created_at: String = row.get(3)?;
        Ok(json!({
            "id": id,
            "name": name,
            "email": email,
            "createdAt": created_at,
        }))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn handle_admins_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "admins": [], "cached": false }));
    };
    let force = req
        .params
        .get("force")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    match state
        .cache
        .admins
        .get(force, Utc::now(), || load_admins(conn))
    {
        Ok((admins, cached)) => ok(&req.id, json!({ "admins": admins, "cached": cached })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_admins_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match get_required_str(&req.params, "name") {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        Ok(_) => return err(&req.id, "bad_params", "name must not be empty", None),
        Err(e) => return e.response(&req.id),
    };
    let email = match get_required_str(&req.params, "email") {
        Ok(v) => v.trim().to_ascii_lowercase(),
        Err(e) => return e.response(&req.id),
    };
    if email.is_empty() || !email.contains('@') {
        return err(&req.id, "bad_params", "email is not valid", None);
    }

    let existing: Option<String> = match conn
        .query_row("SELECT id FROM admins WHERE email = ?", [&email], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if existing.is_some() {
        return err(
            &req.id,
            "conflict",
            "an admin with this email already exists",
            Some(json!({ "email": email })),
        );
    }

    let admin_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO admins(id, name, email, created_at) VALUES(?, ?, ?, ?)",
        (&admin_id, &name, &email, &created_at),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "admins" })),
        );
    }

    state.cache.admins.invalidate();
    ok(
        &req.id,
        json!({
            "admin": {
                "id": admin_id,
                "name": name,
                "email": email,
                "createdAt": created_at,
            }
        }),
    )
}

fn handle_admins_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let admin_id = match get_required_str(&req.params, "adminId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match conn.execute("DELETE FROM admins WHERE id = ?", [&admin_id]) {
        Ok(0) => err(&req.id, "not_found", "admin not found", None),
        Ok(_) => {
            state.cache.admins.invalidate();
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "admins" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admins.list" => Some(handle_admins_list(state, req)),
        "admins.create" => Some(handle_admins_create(state, req)),
        "admins.delete" => Some(handle_admins_delete(state, req)),
        _ => None,
    }
}
