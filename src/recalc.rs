use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::{Result, ScoreError};
use crate::scoring::{self, ScoreComponents};
use crate::weights::{self, WeightRow};
use crate::{db, reconcile};

/// Transient batch-recalculation state. One instance per process, shared
/// between the running batch (writer) and progress pollers (readers); all
/// access goes through the lock and pollers only ever see cloned snapshots.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalcProgress {
    pub total_students: usize,
    pub current_student: usize,
    pub current_student_id: Option<String>,
    pub is_complete: bool,
    pub is_error: bool,
    pub error_message: Option<String>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
}

pub type SharedProgress = Arc<Mutex<RecalcProgress>>;

pub fn new_shared_progress() -> SharedProgress {
    Arc::new(Mutex::new(RecalcProgress::default()))
}

fn lock(progress: &SharedProgress) -> MutexGuard<'_, RecalcProgress> {
    match progress.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub fn snapshot(progress: &SharedProgress) -> RecalcProgress {
    lock(progress).clone()
}

pub fn is_running(progress: &SharedProgress) -> bool {
    let guard = lock(progress);
    guard.started_at.is_some() && !guard.is_complete && !guard.is_error
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn begin(progress: &SharedProgress) {
    let mut guard = lock(progress);
    *guard = RecalcProgress {
        started_at: Some(now()),
        ..Default::default()
    };
}

fn fail(progress: &SharedProgress, err: &ScoreError) {
    let mut guard = lock(progress);
    guard.is_complete = false;
    guard.is_error = true;
    guard.error_message = Some(err.to_string());
    if guard.started_at.is_none() {
        guard.started_at = Some(now());
    }
    guard.ended_at = Some(now());
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentScoreRow {
    pub student_id: String,
    pub academic_grades: f64,
    pub extracurricular: f64,
    pub seminars_webinars: f64,
    pub certifications: f64,
    pub challenges_completed: f64,
    pub mastery: f64,
    pub overall: f64,
    pub badge: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightUpdateResult {
    pub ok: bool,
    pub message: String,
    pub students_processed: usize,
    pub rescaled: Vec<String>,
}

fn fetch_stored(conn: &Connection, student_id: &str) -> Result<ScoreComponents> {
    db::ensure_score_row(conn, student_id)
        .map_err(|e| ScoreError::persistence("ensure score row", e))?;
    conn.query_row(
        "SELECT academic_grades, extracurricular, seminars_webinars,
                certifications, challenges_completed, mastery
         FROM score_components
         WHERE student_id = ?",
        [student_id],
        |r| {
            Ok(ScoreComponents {
                academic_grades: r.get(0)?,
                extracurricular: r.get(1)?,
                seminars_webinars: r.get(2)?,
                certifications: r.get(3)?,
                challenges_completed: r.get(4)?,
                mastery: r.get(5)?,
            })
        },
    )
    .map_err(|e| ScoreError::persistence("fetch score row", e))
}

fn compute_seminars(conn: &Connection, student_id: &str) -> rusqlite::Result<f64> {
    let mut stmt = conn.prepare("SELECT score FROM attendance_events WHERE student_id = ?")?;
    let scores: Vec<Option<f64>> = stmt
        .query_map([student_id], |r| r.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(scoring::seminar_score(&scores))
}

fn compute_academic(conn: &Connection, student_id: &str) -> rusqlite::Result<f64> {
    let mut stmt = conn.prepare(
        "SELECT grade FROM academic_grades WHERE student_id = ? ORDER BY year_label",
    )?;
    let grades: Vec<f64> = stmt
        .query_map([student_id], |r| r.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(scoring::academic_score(&grades))
}

fn compute_extracurricular(conn: &Connection, student_id: &str) -> rusqlite::Result<f64> {
    let mut stmt = conn.prepare("SELECT points FROM activities WHERE student_id = ?")?;
    let points: Vec<f64> = stmt
        .query_map([student_id], |r| r.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(scoring::activity_score(&points))
}

/// A sub-component that cannot be rebuilt keeps its stored value; the batch
/// moves on. Only store-level failures abort a run.
fn component_or_stored(
    result: rusqlite::Result<f64>,
    stored: f64,
    student_id: &str,
    category: &'static str,
) -> f64 {
    match result {
        Ok(value) => value,
        Err(e) => {
            let err = ScoreError::ComponentCompute {
                student_id: student_id.to_string(),
                category,
                message: e.to_string(),
            };
            warn!(error = %err, "keeping stored component value");
            stored
        }
    }
}

/// Rebuild one student's source-backed components, blend the overall, and
/// persist. Mastery, CompletedChallenges, and Certifications are banked
/// values and pass through untouched (a weight change already rescaled the
/// first two before any batch pass reaches this).
pub fn refresh_student(conn: &Connection, student_id: &str) -> Result<StudentScoreRow> {
    let stored = fetch_stored(conn, student_id)?;

    let seminars_webinars = component_or_stored(
        compute_seminars(conn, student_id),
        stored.seminars_webinars,
        student_id,
        "SeminarsWebinars",
    );
    let academic_grades = component_or_stored(
        compute_academic(conn, student_id),
        stored.academic_grades,
        student_id,
        "AcademicGrades",
    );
    let extracurricular = component_or_stored(
        compute_extracurricular(conn, student_id),
        stored.extracurricular,
        student_id,
        "Extracurricular",
    );

    let components = ScoreComponents {
        academic_grades,
        extracurricular,
        seminars_webinars,
        certifications: stored.certifications,
        challenges_completed: stored.challenges_completed,
        mastery: stored.mastery,
    };
    let (overall, badge) = scoring::compute_overall(&components);

    conn.execute(
        "UPDATE score_components
         SET academic_grades = ?, extracurricular = ?, seminars_webinars = ?,
             overall = ?, badge = ?, updated_at = ?
         WHERE student_id = ?",
        (
            components.academic_grades,
            components.extracurricular,
            components.seminars_webinars,
            overall,
            badge.as_str(),
            now(),
            student_id,
        ),
    )
    .map_err(|e| ScoreError::persistence("persist score row", e))?;

    Ok(StudentScoreRow {
        student_id: student_id.to_string(),
        academic_grades: components.academic_grades,
        extracurricular: components.extracurricular,
        seminars_webinars: components.seminars_webinars,
        certifications: components.certifications,
        challenges_completed: components.challenges_completed,
        mastery: components.mastery,
        overall,
        badge: badge.as_str().to_string(),
    })
}

/// Recompute only the blended overall and badge from whatever component
/// values are stored right now. Used after a direct banked-component write.
pub fn refresh_overall_only(conn: &Connection, student_id: &str) -> Result<StudentScoreRow> {
    let stored = fetch_stored(conn, student_id)?;
    let (overall, badge) = scoring::compute_overall(&stored);
    conn.execute(
        "UPDATE score_components SET overall = ?, badge = ?, updated_at = ? WHERE student_id = ?",
        (overall, badge.as_str(), now(), student_id),
    )
    .map_err(|e| ScoreError::persistence("persist overall", e))?;
    Ok(StudentScoreRow {
        student_id: student_id.to_string(),
        academic_grades: stored.academic_grades,
        extracurricular: stored.extracurricular,
        seminars_webinars: stored.seminars_webinars,
        certifications: stored.certifications,
        challenges_completed: stored.challenges_completed,
        mastery: stored.mastery,
        overall,
        badge: badge.as_str().to_string(),
    })
}

fn list_student_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM students ORDER BY sort_order")
        .map_err(|e| ScoreError::Orchestration(format!("enumerate students: {e}")))?;
    stmt.query_map([], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(|e| ScoreError::Orchestration(format!("enumerate students: {e}")))
}

/// Walk every student sequentially, rebuilding components and the blended
/// overall. Progress is updated under the lock after each student. Component
/// failures are isolated per student; an enumeration or persist failure marks
/// the run errored and propagates, leaving already-processed students as they
/// were persisted.
pub fn run_batch(conn: &Connection, progress: &SharedProgress) -> Result<usize> {
    begin(progress);

    let students = match list_student_ids(conn) {
        Ok(v) => v,
        Err(e) => {
            fail(progress, &e);
            return Err(e);
        }
    };

    {
        let mut guard = lock(progress);
        guard.total_students = students.len();
    }

    for (i, student_id) in students.iter().enumerate() {
        {
            let mut guard = lock(progress);
            guard.current_student = i + 1;
            guard.current_student_id = Some(student_id.clone());
        }
        if let Err(e) = refresh_student(conn, student_id) {
            fail(progress, &e);
            return Err(e);
        }
    }

    {
        let mut guard = lock(progress);
        guard.is_complete = true;
        guard.ended_at = Some(now());
    }
    Ok(students.len())
}

/// The full admin weight-change pipeline: validate, replace the weight rows,
/// ratio-rescale the banked categories whose weight moved, then run the batch
/// pass, all inside one transaction. Any step failing rolls the whole thing
/// back, so observers never see a weight set that does not sum to 100.
pub fn update_weights(
    conn: &Connection,
    progress: &SharedProgress,
    new_rows: &[WeightRow],
) -> Result<WeightUpdateResult> {
    weights::validate(new_rows)?;
    let old_rows = weights::load(conn)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| ScoreError::persistence("begin weight update tx", e))?;
    tx.execute_batch("PRAGMA defer_foreign_keys = ON")
        .map_err(|e| ScoreError::persistence("defer constraints", e))?;

    weights::apply_rows(&tx, new_rows)?;

    let mut rescaled = Vec::new();
    for category in [weights::CATEGORY_MASTERY, weights::CATEGORY_CHALLENGES] {
        let old_weight = weights::weight_of(&old_rows, category).unwrap_or(0.0);
        let new_weight = weights::weight_of(new_rows, category).unwrap_or(old_weight);
        if (new_weight - old_weight).abs() > f64::EPSILON {
            reconcile::rescale(&tx, category, old_weight, new_weight)?;
            if old_weight != 0.0 {
                rescaled.push(category.to_string());
            }
        }
    }

    let students_processed = run_batch(&tx, progress)?;

    if let Err(e) = tx.commit() {
        let err = ScoreError::persistence("commit weight update", e);
        fail(progress, &err);
        return Err(err);
    }

    Ok(WeightUpdateResult {
        ok: true,
        message: format!(
            "updated {} category weights, recalculated {} students",
            new_rows.len(),
            students_processed
        ),
        students_processed,
        rescaled,
    })
}

/// Kick off a batch run on its own thread with a fresh connection to the
/// workspace database. Outcome lands in the shared progress record.
pub fn spawn_batch(workspace: PathBuf, progress: SharedProgress) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let conn = match db::open_db(&workspace) {
            Ok(conn) => conn,
            Err(e) => {
                let err = ScoreError::Orchestration(format!("open workspace db: {e}"));
                error!(error = %err, "batch recalculation could not start");
                fail(&progress, &err);
                return;
            }
        };
        if let Err(e) = run_batch(&conn, &progress) {
            error!(error = %e, "batch recalculation failed");
        }
    })
}
