use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("quiz.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            course TEXT NOT NULL DEFAULT '',
            group_name TEXT NOT NULL DEFAULT '',
            sort_order INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tests(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'draft',
            duration_secs INTEGER,
            started_at TEXT,
            finished_at TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    // Older workspaces predate the per-question time limit. Add if needed.
    ensure_tests_question_timeout(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quizzes(
            id TEXT PRIMARY KEY,
            test_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            completed_at TEXT,
            FOREIGN KEY(test_id) REFERENCES tests(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(test_id, student_id)
        )",
        [],
    )?;
    ensure_quizzes_original_filename(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quizzes_test ON quizzes(test_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quizzes_student ON quizzes(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS questions(
            id TEXT PRIMARY KEY,
            quiz_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            code_snippet TEXT NOT NULL DEFAULT '',
            question TEXT NOT NULL,
            answers TEXT NOT NULL,
            correct_answer_index INTEGER NOT NULL,
            explanation TEXT NOT NULL DEFAULT '',
            teacher_note TEXT NOT NULL DEFAULT '',
            penalty REAL NOT NULL DEFAULT 0,
            source TEXT NOT NULL DEFAULT '',
            FOREIGN KEY(quiz_id) REFERENCES quizzes(id),
            UNIQUE(quiz_id, sort_order)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_questions_quiz ON questions(quiz_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_tests_question_timeout(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "tests", "question_timeout")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE tests ADD COLUMN question_timeout INTEGER", [])?;
    Ok(())
}

fn ensure_quizzes_original_filename(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "quizzes", "original_filename")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE quizzes ADD COLUMN original_filename TEXT NOT NULL DEFAULT ''",
        [],
    )?;
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
