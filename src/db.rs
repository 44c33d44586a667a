use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use crate::weights;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("badgebook.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            email TEXT,
            active INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_sort ON students(sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS score_components(
            student_id TEXT PRIMARY KEY,
            academic_grades REAL NOT NULL DEFAULT 0,
            extracurricular REAL NOT NULL DEFAULT 0,
            seminars_webinars REAL NOT NULL DEFAULT 0,
            certifications REAL NOT NULL DEFAULT 0,
            challenges_completed REAL NOT NULL DEFAULT 0,
            mastery REAL NOT NULL DEFAULT 0,
            overall REAL NOT NULL DEFAULT 0,
            badge TEXT NOT NULL DEFAULT 'none',
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS weight_config(
            category TEXT PRIMARY KEY,
            weight REAL NOT NULL,
            description TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_events(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            event_date TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    // Workspaces created before per-event point scores existed have rows
    // without the column; those rows stay NULL and select the count-based
    // seminar rule.
    ensure_attendance_events_score(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance_events(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            year_label TEXT NOT NULL,
            grade REAL NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, year_label)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_academic_grades_student ON academic_grades(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activities(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            title TEXT NOT NULL,
            points REAL NOT NULL,
            created_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activities_student ON activities(student_id)",
        [],
    )?;

    weights::seed_defaults_if_empty(conn)?;

    Ok(())
}

fn ensure_attendance_events_score(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "attendance_events", "score")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE attendance_events ADD COLUMN score REAL", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Every student gets a components row the first time anything scores them.
pub fn ensure_score_row(conn: &Connection, student_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO score_components(student_id) VALUES(?)",
        [student_id],
    )?;
    Ok(())
}
