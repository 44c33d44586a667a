use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok, score_err};
use crate::ipc::helpers::{required_str, student_exists};
use crate::ipc::types::{AppState, Request};
use crate::recalc;

const DEFAULT_ACTIVITY_POINTS: f64 = 10.0;

fn handle_activities_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let title = match required_str(&req.params, "title") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e.response(&req.id),
    };
    if title.is_empty() {
        return err(&req.id, "bad_params", "title must not be empty", None);
    }
    let points = req
        .params
        .get("points")
        .and_then(|v| v.as_f64())
        .unwrap_or(DEFAULT_ACTIVITY_POINTS);
    if points < 0.0 {
        return err(&req.id, "bad_params", "points must not be negative", None);
    }

    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return e.response(&req.id),
    }

    let activity_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO activities(id, student_id, title, points, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &activity_id,
            &student_id,
            &title,
            points,
            chrono::Utc::now().to_rfc3339(),
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    match recalc::refresh_student(conn, &student_id) {
        Ok(row) => ok(
            &req.id,
            json!({
                "activityId": activity_id,
                "scores": serde_json::to_value(row).unwrap_or_default(),
            }),
        ),
        Err(e) => score_err(&req.id, &e),
    }
}

fn handle_activities_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let activity_id = match required_str(&req.params, "activityId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let student_id: Option<String> = match conn
        .query_row(
            "SELECT student_id FROM activities WHERE id = ?",
            [&activity_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(student_id) = student_id else {
        return err(&req.id, "not_found", "activity not found", None);
    };

    if let Err(e) = conn.execute("DELETE FROM activities WHERE id = ?", [&activity_id]) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }

    match recalc::refresh_student(conn, &student_id) {
        Ok(row) => ok(
            &req.id,
            json!({ "scores": serde_json::to_value(row).unwrap_or_default() }),
        ),
        Err(e) => score_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "activities.add" => Some(handle_activities_add(state, req)),
        "activities.remove" => Some(handle_activities_remove(state, req)),
        _ => None,
    }
}
