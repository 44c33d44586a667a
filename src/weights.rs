use rusqlite::Connection;
use serde::Serialize;

use crate::error::{Result, ScoreError};

pub const CATEGORY_ACADEMIC: &str = "AcademicGrades";
pub const CATEGORY_CHALLENGES: &str = "CompletedChallenges";
pub const CATEGORY_MASTERY: &str = "Mastery";
pub const CATEGORY_SEMINARS: &str = "SeminarsWebinars";
pub const CATEGORY_EXTRACURRICULAR: &str = "Extracurricular";

/// |sum - 100| beyond this rejects the whole set.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeightRow {
    pub category: String,
    pub weight: f64,
    pub description: String,
    #[serde(skip_serializing)]
    pub sort_order: i64,
}

const DEFAULTS: [(&str, f64, &str); 5] = [
    (CATEGORY_ACADEMIC, 30.0, "Yearly academic grades"),
    (CATEGORY_CHALLENGES, 20.0, "Completed challenge points"),
    (CATEGORY_MASTERY, 20.0, "Mastery test points"),
    (CATEGORY_SEMINARS, 10.0, "Seminar and webinar attendance"),
    (CATEGORY_EXTRACURRICULAR, 20.0, "Extracurricular activities"),
];

pub fn default_rows() -> Vec<WeightRow> {
    DEFAULTS
        .iter()
        .enumerate()
        .map(|(i, (category, weight, description))| WeightRow {
            category: category.to_string(),
            weight: *weight,
            description: description.to_string(),
            sort_order: i as i64,
        })
        .collect()
}

pub fn is_known_category(category: &str) -> bool {
    DEFAULTS.iter().any(|(c, _, _)| *c == category)
}

pub fn canonical_sort_order(category: &str) -> i64 {
    DEFAULTS
        .iter()
        .position(|(c, _, _)| *c == category)
        .map(|i| i as i64)
        .unwrap_or(i64::MAX)
}

pub fn seed_defaults_if_empty(conn: &Connection) -> anyhow::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM weight_config", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }
    for row in default_rows() {
        conn.execute(
            "INSERT INTO weight_config(category, weight, description, sort_order)
             VALUES(?, ?, ?, ?)",
            (&row.category, row.weight, &row.description, row.sort_order),
        )?;
    }
    Ok(())
}

/// Persisted rows in display order; the fixed default set when nothing has
/// been persisted yet. Missing configuration is never an error.
pub fn load(conn: &Connection) -> Result<Vec<WeightRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT category, weight, description, sort_order
             FROM weight_config
             ORDER BY sort_order",
        )
        .map_err(|e| ScoreError::persistence("load weight_config", e))?;
    let rows: Vec<WeightRow> = stmt
        .query_map([], |r| {
            Ok(WeightRow {
                category: r.get(0)?,
                weight: r.get(1)?,
                description: r.get(2)?,
                sort_order: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| ScoreError::persistence("load weight_config", e))?;

    if rows.is_empty() {
        return Ok(default_rows());
    }
    Ok(rows)
}

pub fn weight_of(rows: &[WeightRow], category: &str) -> Option<f64> {
    rows.iter()
        .find(|r| r.category == category)
        .map(|r| r.weight)
}

pub fn validate(rows: &[WeightRow]) -> Result<()> {
    let sum: f64 = rows.iter().map(|r| r.weight).sum();
    if (sum - 100.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ScoreError::InvalidWeightSum { sum });
    }
    Ok(())
}

/// Replace every row. Meant to run inside an open transaction so the
/// all-or-nothing contract holds; callers own commit/rollback.
pub fn apply_rows(conn: &Connection, rows: &[WeightRow]) -> Result<()> {
    conn.execute("DELETE FROM weight_config", [])
        .map_err(|e| ScoreError::persistence("clear weight_config", e))?;
    for row in rows {
        conn.execute(
            "INSERT INTO weight_config(category, weight, description, sort_order)
             VALUES(?, ?, ?, ?)",
            (&row.category, row.weight, &row.description, row.sort_order),
        )
        .map_err(|e| ScoreError::persistence("insert weight_config", e))?;
    }
    Ok(())
}

/// Validate and persist a full weight set as a unit. Constraint enforcement
/// is deferred while the rows are mid-replacement; the transaction commits or
/// rolls back whole, leaving the prior configuration intact on failure.
/// The weight-update pipeline opens its own wider transaction and calls
/// `apply_rows` directly; this standalone form serves configuration-only
/// writers.
#[allow(dead_code)]
pub fn apply_atomically(conn: &Connection, rows: &[WeightRow]) -> Result<()> {
    validate(rows)?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| ScoreError::persistence("begin weight tx", e))?;
    tx.execute_batch("PRAGMA defer_foreign_keys = ON")
        .map_err(|e| ScoreError::persistence("defer constraints", e))?;
    apply_rows(&tx, rows)?;
    tx.commit()
        .map_err(|e| ScoreError::persistence("commit weight tx", e))?;
    Ok(())
}
