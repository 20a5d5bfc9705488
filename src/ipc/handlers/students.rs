use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           s.id,
           s.name,
           s.email,
           s.course,
           s.group_name,
           (SELECT COUNT(*) FROM quizzes q WHERE q.student_id = s.id) AS quiz_count
         FROM students s
         ORDER BY s.name, s.email",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let email: String = row.get(2)?;
            let course: String = row.get(3)?;
            let group: String = row.get(4)?;
            let quiz_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "email": email,
                "course": course,
                "group": group,
                "quizCount": quiz_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_import_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let path = match req.params.get("path").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing path", None),
    };

    // Unreadable roster is fatal; per-row problems are not.
    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) => {
            return err(
                &req.id,
                "parse_failed",
                e.to_string(),
                Some(json!({ "path": path })),
            )
        }
    };
    let (rows, warnings, rows_total) = roster::parse_roster_rows(&text);

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let now = chrono::Utc::now().to_rfc3339();
    let mut created = 0usize;
    let mut updated = 0usize;
    let mut unchanged = 0usize;

    for (row_index, row) in rows.iter().enumerate() {
        let existing = tx
            .query_row(
                "SELECT id, name, course, group_name FROM students WHERE email = ?",
                [&row.email],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                },
            )
            .optional();
        let existing = match existing {
            Ok(v) => v,
            Err(e) => {
                let _ = tx.rollback();
                return err(&req.id, "db_query_failed", e.to_string(), None);
            }
        };

        match existing {
            Some((id, name, course, group)) => {
                // Email is the natural key; only touch rows that changed.
                if name == row.name && course == row.course && group == row.group {
                    unchanged += 1;
                    continue;
                }
                if let Err(e) = tx.execute(
                    "UPDATE students
                     SET name = ?, course = ?, group_name = ?, updated_at = ?
                     WHERE id = ?",
                    (&row.name, &row.course, &row.group, &now, &id),
                ) {
                    let _ = tx.rollback();
                    return err(&req.id, "db_update_failed", e.to_string(), None);
                }
                updated += 1;
            }
            None => {
                let student_id = Uuid::new_v4().to_string();
                if let Err(e) = tx.execute(
                    "INSERT INTO students(id, name, email, course, group_name, sort_order, updated_at)
                     VALUES(?, ?, ?, ?, ?, ?, ?)",
                    (
                        &student_id,
                        &row.name,
                        &row.email,
                        &row.course,
                        &row.group,
                        row_index as i64,
                        &now,
                    ),
                ) {
                    let _ = tx.rollback();
                    return err(
                        &req.id,
                        "db_insert_failed",
                        e.to_string(),
                        Some(json!({ "line": row.line_no })),
                    );
                }
                created += 1;
            }
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "path": path,
            "rowsTotal": rows_total,
            "created": created,
            "updated": updated,
            "unchanged": unchanged,
            "skipped": warnings.len(),
            "warnings": warnings
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.importCsv" => Some(handle_students_import_csv(state, req)),
        _ => None,
    }
}
