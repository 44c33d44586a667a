use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok, score_err};
use crate::ipc::helpers::{required_str, student_exists, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::{db, recalc};

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let last_name = match required_str(&req.params, "lastName") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let first_name = match required_str(&req.params, "firstName") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let email = req
        .params
        .get("email")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let sort_order: i64 = match conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students",
        [],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, last_name, first_name, email, active, sort_order, created_at)
         VALUES(?, ?, ?, ?, 1, ?, ?)",
        (
            &student_id,
            &last_name,
            &first_name,
            &email,
            sort_order,
            chrono::Utc::now().to_rfc3339(),
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    if let Err(e) = db::ensure_score_row(conn, &student_id) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "studentId": student_id }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT s.id, s.last_name, s.first_name, s.active, s.sort_order,
                COALESCE(c.overall, 0), COALESCE(c.badge, 'none')
         FROM students s
         LEFT JOIN score_components c ON c.student_id = s.id
         ORDER BY s.sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            Ok(json!({
                "studentId": r.get::<_, String>(0)?,
                "displayName": format!("{}, {}", last, first),
                "active": r.get::<_, i64>(3)? != 0,
                "sortOrder": r.get::<_, i64>(4)?,
                "overall": r.get::<_, f64>(5)?,
                "badge": r.get::<_, String>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn fetch_score_row(conn: &Connection, student_id: &str) -> Result<serde_json::Value, HandlerErr> {
    db::ensure_score_row(conn, student_id).map_err(HandlerErr::db)?;
    conn.query_row(
        "SELECT academic_grades, extracurricular, seminars_webinars, certifications,
                challenges_completed, mastery, overall, badge
         FROM score_components
         WHERE student_id = ?",
        [student_id],
        |r| {
            Ok(json!({
                "studentId": student_id,
                "academicGrades": r.get::<_, f64>(0)?,
                "extracurricular": r.get::<_, f64>(1)?,
                "seminarsWebinars": r.get::<_, f64>(2)?,
                "certifications": r.get::<_, f64>(3)?,
                "challengesCompleted": r.get::<_, f64>(4)?,
                "mastery": r.get::<_, f64>(5)?,
                "overall": r.get::<_, f64>(6)?,
                "badge": r.get::<_, String>(7)?,
            }))
        },
    )
    .map_err(HandlerErr::db)
}

fn handle_students_scores(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return e.response(&req.id),
    }

    match fetch_score_row(conn, &student_id) {
        Ok(scores) => ok(&req.id, json!({ "scores": scores })),
        Err(e) => e.response(&req.id),
    }
}

fn banked_column(category: &str) -> Option<&'static str> {
    match category {
        "Mastery" => Some("mastery"),
        "CompletedChallenges" => Some("challenges_completed"),
        "Certifications" => Some("certifications"),
        _ => None,
    }
}

/// Direct write path for the banked components whose source pipelines
/// (test submissions, challenge grading, certification review) live outside
/// this daemon.
fn handle_set_component(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let category = match required_str(&req.params, "category") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(value) = req.params.get("value").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing numeric value", None);
    };
    let Some(column) = banked_column(&category) else {
        return err(
            &req.id,
            "bad_params",
            format!("{} is derived from source records, not set directly", category),
            None,
        );
    };

    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return e.response(&req.id),
    }
    if let Err(e) = db::ensure_score_row(conn, &student_id) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    let sql = format!(
        "UPDATE score_components SET {} = ?, updated_at = ? WHERE student_id = ?",
        column
    );
    if let Err(e) = conn.execute(
        &sql,
        (value, chrono::Utc::now().to_rfc3339(), &student_id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    match recalc::refresh_overall_only(conn, &student_id) {
        Ok(row) => ok(
            &req.id,
            json!({ "scores": serde_json::to_value(row).unwrap_or_default() }),
        ),
        Err(e) => score_err(&req.id, &e),
    }
}

/// Rebuild one student's source-backed components on demand, the same pass
/// the attendance and grade mutations trigger implicitly.
fn handle_scores_refresh(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return e.response(&req.id),
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
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.scores" => Some(handle_students_scores(state, req)),
        "scores.setComponent" => Some(handle_set_component(state, req)),
        "scores.refresh" => Some(handle_scores_refresh(state, req)),
        _ => None,
    }
}
