use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::{Result, ScoreError};
use crate::weights::{CATEGORY_CHALLENGES, CATEGORY_MASTERY};

/// Mastery and CompletedChallenges bank raw points with no recompute-from-source
/// path, so a weight change rescales the banked value for every student by
/// new/old. The other categories are rebuilt from source in the batch pass and
/// never rescaled here.
fn rescalable_column(category: &str) -> Option<&'static str> {
    match category {
        CATEGORY_MASTERY => Some("mastery"),
        CATEGORY_CHALLENGES => Some("challenges_completed"),
        _ => None,
    }
}

/// Multiply every student's banked value for `category` by `new_weight /
/// old_weight`. Returns the number of student rows touched. A zero old
/// weight has no defined ratio; the rescale is skipped and logged, never
/// fatal.
pub fn rescale(
    conn: &Connection,
    category: &str,
    old_weight: f64,
    new_weight: f64,
) -> Result<usize> {
    let Some(column) = rescalable_column(category) else {
        debug!(category, "category recomputes from source, skipping rescale");
        return Ok(0);
    };

    if old_weight == 0.0 {
        warn!(
            category,
            new_weight, "old weight is zero, cannot derive rescale ratio, skipping"
        );
        return Ok(0);
    }

    let ratio = new_weight / old_weight;
    let sql = format!(
        "UPDATE score_components SET {col} = {col} * ?, updated_at = ?",
        col = column
    );
    let touched = conn
        .execute(&sql, (ratio, chrono::Utc::now().to_rfc3339()))
        .map_err(|e| ScoreError::persistence("rescale component", e))?;

    debug!(category, ratio, touched, "rescaled banked component");
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn conn_with_student(challenges: f64, mastery: f64) -> (Connection, String) {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("init schema");
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO students(id, last_name, first_name, active, sort_order)
             VALUES(?, 'Student', 'One', 1, 0)",
            [&id],
        )
        .expect("insert student");
        conn.execute(
            "INSERT INTO score_components(student_id, challenges_completed, mastery)
             VALUES(?, ?, ?)",
            (&id, challenges, mastery),
        )
        .expect("insert components");
        (conn, id)
    }

    fn component(conn: &Connection, id: &str, column: &str) -> f64 {
        conn.query_row(
            &format!("SELECT {} FROM score_components WHERE student_id = ?", column),
            [id],
            |r| r.get(0),
        )
        .expect("read component")
    }

    #[test]
    fn halving_the_weight_halves_banked_points() {
        let (conn, id) = conn_with_student(8.0, 50.0);
        let touched = rescale(&conn, CATEGORY_CHALLENGES, 20.0, 10.0).expect("rescale");
        assert_eq!(touched, 1);
        assert_eq!(component(&conn, &id, "challenges_completed"), 4.0);
        // The other banked category is untouched.
        assert_eq!(component(&conn, &id, "mastery"), 50.0);
    }

    #[test]
    fn zero_old_weight_is_a_logged_no_op() {
        let (conn, id) = conn_with_student(8.0, 50.0);
        let touched = rescale(&conn, CATEGORY_CHALLENGES, 0.0, 10.0).expect("rescale");
        assert_eq!(touched, 0);
        assert_eq!(component(&conn, &id, "challenges_completed"), 8.0);
    }

    #[test]
    fn source_backed_categories_are_skipped() {
        let (conn, id) = conn_with_student(8.0, 50.0);
        let touched = rescale(&conn, "AcademicGrades", 30.0, 15.0).expect("rescale");
        assert_eq!(touched, 0);
        assert_eq!(component(&conn, &id, "challenges_completed"), 8.0);
        assert_eq!(component(&conn, &id, "mastery"), 50.0);
    }
}
