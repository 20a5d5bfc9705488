use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::questions;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::path::Path;
use uuid::Uuid;

struct StudentRef {
    id: String,
    name: String,
    email: String,
}

enum StudentMatch {
    None,
    One(usize),
    Ambiguous,
}

fn compact_key(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or("")
}

/// Filename-to-student inference: a student matches when the compact form of
/// their full name or email local part occurs in the compact file stem.
/// Hits on more than one distinct student are ambiguous, never guessed.
fn match_student(stem: &str, students: &[StudentRef]) -> StudentMatch {
    let stem_key = compact_key(stem);
    if stem_key.is_empty() {
        return StudentMatch::None;
    }

    let mut hit: Option<usize> = None;
    for (i, s) in students.iter().enumerate() {
        let name_key = compact_key(&s.name);
        let local_key = compact_key(email_local_part(&s.email));
        let matched = (!name_key.is_empty() && stem_key.contains(&name_key))
            || (!local_key.is_empty() && stem_key.contains(&local_key));
        if !matched {
            continue;
        }
        match hit {
            None => hit = Some(i),
            Some(_) => return StudentMatch::Ambiguous,
        }
    }

    match hit {
        Some(i) => StudentMatch::One(i),
        None => StudentMatch::None,
    }
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string()
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

fn load_students(conn: &Connection) -> Result<Vec<StudentRef>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT id, name, email FROM students ORDER BY sort_order, name")?;
    let rows = stmt.query_map([], |r| {
        Ok(StudentRef {
            id: r.get(0)?,
            name: r.get(1)?,
            email: r.get(2)?,
        })
    })?;
    rows.collect()
}

fn handle_quizzes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "quizzes": [] }));
    };

    let test_filter = req
        .params
        .get("testId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let sql = "SELECT
           q.id,
           q.test_id,
           q.student_id,
           s.name,
           q.title,
           q.original_filename,
           q.created_at,
           q.completed_at,
           (SELECT COUNT(*) FROM questions qs WHERE qs.quiz_id = q.id) AS question_count
         FROM quizzes q
         JOIN students s ON s.id = q.student_id
         WHERE (?1 IS NULL OR q.test_id = ?1)
         ORDER BY q.created_at DESC, q.id";
    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&test_filter], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "testId": row.get::<_, String>(1)?,
                "studentId": row.get::<_, String>(2)?,
                "studentName": row.get::<_, String>(3)?,
                "title": row.get::<_, String>(4)?,
                "originalFilename": row.get::<_, String>(5)?,
                "createdAt": row.get::<_, String>(6)?,
                "completedAt": row.get::<_, Option<String>>(7)?,
                "questionCount": row.get::<_, i64>(8)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(quizzes) => ok(&req.id, json!({ "quizzes": quizzes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn resolve_target_test(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<String, (&'static str, String)> {
    if let Some(test_id) = params.get("testId").and_then(|v| v.as_str()) {
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM tests WHERE id = ?", [test_id], |r| r.get(0))
            .optional()
            .map_err(|e| ("db_query_failed", e.to_string()))?;
        if exists.is_none() {
            return Err(("not_found", "test not found".to_string()));
        }
        return Ok(test_id.to_string());
    }

    // The interactive upload form targets "the current test": the most
    // recently created one.
    let latest: Option<String> = conn
        .query_row(
            "SELECT id FROM tests ORDER BY created_at DESC, rowid DESC LIMIT 1",
            [],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| ("db_query_failed", e.to_string()))?;
    latest.ok_or(("no_test", "no tests exist; create one first".to_string()))
}

fn import_one_file(
    conn: &Connection,
    test_id: &str,
    path: &str,
    students: &[StudentRef],
) -> serde_json::Value {
    let display = file_name(path);
    let stem = file_stem(path);

    let student = match match_student(&stem, students) {
        StudentMatch::None => {
            return json!({
                "file": display,
                "status": "skipped",
                "reason": "no matching student"
            })
        }
        StudentMatch::Ambiguous => {
            return json!({
                "file": display,
                "status": "skipped",
                "reason": "ambiguous student match"
            })
        }
        StudentMatch::One(i) => &students[i],
    };

    // Idempotency against (student, test): a re-imported file never creates
    // a second quiz.
    let existing: Result<Option<String>, _> = conn
        .query_row(
            "SELECT id FROM quizzes WHERE test_id = ? AND student_id = ?",
            [test_id, student.id.as_str()],
            |r| r.get(0),
        )
        .optional();
    match existing {
        Ok(Some(_)) => {
            return json!({
                "file": display,
                "status": "skipped",
                "studentId": student.id,
                "reason": format!("{} already has a quiz in this test", student.name)
            })
        }
        Ok(None) => {}
        Err(e) => {
            return json!({
                "file": display,
                "status": "failed",
                "reason": e.to_string()
            })
        }
    }

    let content = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            return json!({
                "file": display,
                "status": "failed",
                "reason": e.to_string()
            })
        }
    };
    let parsed = match questions::parse_quiz_payload(&content) {
        Ok(p) => p,
        Err(e) => {
            return json!({
                "file": display,
                "status": "failed",
                "reason": e.to_string()
            })
        }
    };
    let title = questions::quiz_title(&parsed, &stem);

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => {
            return json!({
                "file": display,
                "status": "failed",
                "reason": e.to_string()
            })
        }
    };
    let quiz_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    if let Err(e) = tx.execute(
        "INSERT INTO quizzes(id, test_id, student_id, title, original_filename, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&quiz_id, test_id, &student.id, &title, &display, &now),
    ) {
        let _ = tx.rollback();
        return json!({
            "file": display,
            "status": "failed",
            "reason": e.to_string()
        });
    }
    for (order, q) in parsed.questions.iter().enumerate() {
        let answers_json = match serde_json::to_string(&q.answers) {
            Ok(v) => v,
            Err(e) => {
                let _ = tx.rollback();
                return json!({
                    "file": display,
                    "status": "failed",
                    "reason": e.to_string()
                });
            }
        };
        if let Err(e) = tx.execute(
            "INSERT INTO questions(
                id, quiz_id, sort_order, code_snippet, question, answers,
                correct_answer_index, explanation, teacher_note, penalty, source)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &quiz_id,
                (order + 1) as i64,
                &q.code_snippet,
                &q.question,
                &answers_json,
                q.correct_answer_index as i64,
                &q.explanation,
                &q.teacher_note,
                q.penalty,
                &q.source,
            ),
        ) {
            let _ = tx.rollback();
            return json!({
                "file": display,
                "status": "failed",
                "reason": e.to_string()
            });
        }
    }
    if let Err(e) = tx.commit() {
        return json!({
            "file": display,
            "status": "failed",
            "reason": e.to_string()
        });
    }

    json!({
        "file": display,
        "status": "imported",
        "quizId": quiz_id,
        "studentId": student.id,
        "title": title,
        "questions": parsed.questions.len()
    })
}

fn handle_import_questions(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let paths = req
        .params
        .get("paths")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if paths.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "paths must be a non-empty array of file paths",
            None,
        );
    }

    let test_id = match resolve_target_test(conn, &req.params) {
        Ok(v) => v,
        Err((code, message)) => return err(&req.id, code, message, None),
    };
    let students = match load_students(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut files = Vec::with_capacity(paths.len());
    let mut imported = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for path in &paths {
        let report = import_one_file(conn, &test_id, path, &students);
        match report.get("status").and_then(|v| v.as_str()) {
            Some("imported") => imported += 1,
            Some("skipped") => skipped += 1,
            _ => failed += 1,
        }
        files.push(report);
    }

    ok(
        &req.id,
        json!({
            "testId": test_id,
            "filesTotal": paths.len(),
            "imported": imported,
            "skipped": skipped,
            "failed": failed,
            "files": files
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "quizzes.list" => Some(handle_quizzes_list(state, req)),
        "quizzes.importQuestions" => Some(handle_import_questions(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn students() -> Vec<StudentRef> {
        vec![
            StudentRef {
                id: "s1".into(),
                name: "Alice Johnson".into(),
                email: "alice.johnson@example.com".into(),
            },
            StudentRef {
                id: "s2".into(),
                name: "Bob Stone".into(),
                email: "bstone@example.com".into(),
            },
        ]
    }

    #[test]
    fn matches_by_compact_name() {
        let s = students();
        assert!(matches!(
            match_student("Alice_Johnson-week3", &s),
            StudentMatch::One(0)
        ));
    }

    #[test]
    fn matches_by_email_local_part() {
        let s = students();
        assert!(matches!(
            match_student("quiz-bstone-final", &s),
            StudentMatch::One(1)
        ));
    }

    #[test]
    fn unmatched_stem_yields_none() {
        let s = students();
        assert!(matches!(
            match_student("week3_charlie", &s),
            StudentMatch::None
        ));
    }

    #[test]
    fn two_candidates_are_ambiguous() {
        let s = students();
        assert!(matches!(
            match_student("alice.johnson+bob.stone", &s),
            StudentMatch::Ambiguous
        ));
    }

    #[test]
    fn empty_stem_never_matches() {
        let s = students();
        assert!(matches!(match_student("---", &s), StudentMatch::None));
    }
}
