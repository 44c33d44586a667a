use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok, score_err};
use crate::ipc::helpers::{required_str, student_exists, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::recalc;

/// Attendance confirmations bank a fixed 100 points when the caller does not
/// say otherwise. An explicit JSON null stores no score at all, matching rows
/// written before the score column existed, which fall under the count-based
/// seminar rule.
fn parse_event_score(params: &serde_json::Value) -> Result<Option<f64>, HandlerErr> {
    match params.get("score") {
        None => Ok(Some(100.0)),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params("score must be a number or null")),
    }
}

fn handle_attendance_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let event_date = match required_str(&req.params, "eventDate") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let score = match parse_event_score(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return e.response(&req.id),
    }

    let attendance_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO attendance_events(id, student_id, event_date, score, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &attendance_id,
            &student_id,
            &event_date,
            score,
            chrono::Utc::now().to_rfc3339(),
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    match recalc::refresh_student(conn, &student_id) {
        Ok(row) => ok(
            &req.id,
            json!({
                "attendanceId": attendance_id,
                "scores": serde_json::to_value(row).unwrap_or_default(),
            }),
        ),
        Err(e) => score_err(&req.id, &e),
    }
}

fn handle_attendance_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let attendance_id = match required_str(&req.params, "attendanceId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let student_id: Option<String> = match conn
        .query_row(
            "SELECT student_id FROM attendance_events WHERE id = ?",
            [&attendance_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(student_id) = student_id else {
        return err(&req.id, "not_found", "attendance record not found", None);
    };

    if let Err(e) = conn.execute(
        "DELETE FROM attendance_events WHERE id = ?",
        [&attendance_id],
    ) {
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

fn handle_attendance_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, event_date, score, created_at
         FROM attendance_events
         WHERE student_id = ?
         ORDER BY event_date",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&student_id], |r| {
            Ok(json!({
                "attendanceId": r.get::<_, String>(0)?,
                "eventDate": r.get::<_, String>(1)?,
                "score": r.get::<_, Option<f64>>(2)?,
                "createdAt": r.get::<_, Option<String>>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(events) => ok(&req.id, json!({ "events": events })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.add" => Some(handle_attendance_add(state, req)),
        "attendance.remove" => Some(handle_attendance_remove(state, req)),
        "attendance.list" => Some(handle_attendance_list(state, req)),
        _ => None,
    }
}
