use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok, score_err};
use crate::ipc::helpers::{required_str, student_exists};
use crate::ipc::types::{AppState, Request};
use crate::recalc;

fn handle_grades_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let year_label = match required_str(&req.params, "yearLabel") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e.response(&req.id),
    };
    if year_label.is_empty() {
        return err(&req.id, "bad_params", "yearLabel must not be empty", None);
    }
    let Some(grade) = req.params.get("grade").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing numeric grade", None);
    };
    if !(0.0..=100.0).contains(&grade) {
        return err(&req.id, "bad_params", "grade must be within 0-100", None);
    }

    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return e.response(&req.id),
    }

    if let Err(e) = conn.execute(
        "INSERT INTO academic_grades(id, student_id, year_label, grade)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, year_label) DO UPDATE SET grade = excluded.grade",
        (Uuid::new_v4().to_string(), &student_id, &year_label, grade),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
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
        "grades.set" => Some(handle_grades_set(state, req)),
        _ => None,
    }
}
