
use serde_json::{json, Value};
use std::io::BufReader;
use std::path::Path;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_ok, spawn_sidecar, temp_dir};

const VALID_QUIZ: &str = r#"[
    {"question": "What prints?", "answers": ["a) 1", "b) 2 *"], "weight": 0.25},
    {"question": "Pick one", "answers": ["x", "y"], "correct_answer_index": 1}
]"#;

fn setup_roster_and_test(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) -> String {
    let csv_path = workspace.join("participants.csv");
    std::fs::write(
        &csv_path,
        "name,email,course,group\n\
         Alice Johnson,alice.johnson@example.com,CS101,A\n\
         Bob Stone,bstone@example.com,CS101,B\n",
    )
    .expect("write roster");
    let _ = request_ok(
        stdin,
        reader,
        "setup-roster",
        "students.importCsv",
        json!({ "path": csv_path.to_string_lossy() }),
    );
    let created = request_ok(
        stdin,
        reader,
        "setup-test",
        "tests.create",
        json!({ "title": "Week 3", "durationSecs": 1800 }),
    );
    created["testId"].as_str().expect("testId").to_string()
}

fn file_report<'a>(result: &'a Value, file: &str) -> &'a Value {
    result["files"]
        .as_array()
        .expect("files array")
        .iter()
        .find(|f| f["file"].as_str() == Some(file))
        .unwrap_or_else(|| panic!("no report for {}: {}", file, result))
}

#[test]
fn import_questions_reports_per_file_outcomes() {
    let workspace = temp_dir("quizd-questions-import");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let test_id = setup_roster_and_test(&mut stdin, &mut reader, &workspace);

    let alice = workspace.join("alice.johnson_week3.json");
    let bob = workspace.join("bstone-week3.json");
    let charlie = workspace.join("charlie_week3.json");
    let broken = workspace.join("alice.johnson_broken.json");
    std::fs::write(&alice, VALID_QUIZ).expect("write alice quiz");
    std::fs::write(&bob, VALID_QUIZ).expect("write bob quiz");
    std::fs::write(&charlie, VALID_QUIZ).expect("write charlie quiz");
    std::fs::write(&broken, "{not json").expect("write broken quiz");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "quizzes.importQuestions",
        json!({
            "testId": test_id,
            "paths": [
                alice.to_string_lossy(),
                bob.to_string_lossy(),
                charlie.to_string_lossy()
            ]
        }),
    );
    assert_eq!(result["filesTotal"].as_i64(), Some(3));
    assert_eq!(result["imported"].as_i64(), Some(2));
    assert_eq!(result["skipped"].as_i64(), Some(1));
    assert_eq!(result["failed"].as_i64(), Some(0));
    assert_eq!(
        file_report(&result, "charlie_week3.json")["reason"].as_str(),
        Some("no matching student")
    );
    let alice_row = file_report(&result, "alice.johnson_week3.json");
    assert_eq!(alice_row["status"].as_str(), Some("imported"));
    assert_eq!(alice_row["questions"].as_i64(), Some(2));

    // Re-importing for a student who already has a quiz in this test is a
    // reported skip, never a duplicate. The broken payload is a failure.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "quizzes.importQuestions",
        json!({
            "testId": test_id,
            "paths": [alice.to_string_lossy(), broken.to_string_lossy()]
        }),
    );
    assert_eq!(again["imported"].as_i64(), Some(0));
    assert_eq!(again["skipped"].as_i64(), Some(2));
    let dup = file_report(&again, "alice.johnson_week3.json");
    assert_eq!(dup["status"].as_str(), Some("skipped"));
    assert!(dup["reason"]
        .as_str()
        .unwrap_or("")
        .contains("Alice Johnson"));
    // The broken file belongs to Alice too, so the duplicate check wins
    // before parsing is attempted.
    assert_eq!(
        file_report(&again, "alice.johnson_broken.json")["status"].as_str(),
        Some("skipped")
    );

    let quizzes = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "quizzes.list",
        json!({ "testId": test_id }),
    );
    assert_eq!(quizzes["quizzes"].as_array().map(|a| a.len()), Some(2));
}

#[test]
fn import_questions_invalid_payload_fails_per_file() {
    let workspace = temp_dir("quizd-questions-import-invalid");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let test_id = setup_roster_and_test(&mut stdin, &mut reader, &workspace);

    let no_correct = workspace.join("bstone_week3.json");
    std::fs::write(&no_correct, r#"[{"question": "Q", "answers": ["x", "y"]}]"#)
        .expect("write invalid quiz");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "quizzes.importQuestions",
        json!({ "testId": test_id, "paths": [no_correct.to_string_lossy()] }),
    );
    assert_eq!(result["imported"].as_i64(), Some(0));
    assert_eq!(result["failed"].as_i64(), Some(1));
    let row = file_report(&result, "bstone_week3.json");
    assert_eq!(row["status"].as_str(), Some("failed"));
    assert!(row["reason"].as_str().unwrap_or("").contains("entry #1"));

    // A failed file leaves nothing behind; the import can be retried.
    let quizzes = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "quizzes.list",
        json!({ "testId": test_id }),
    );
    assert_eq!(quizzes["quizzes"].as_array().map(|a| a.len()), Some(0));
}

#[test]
fn import_questions_ambiguous_filename_is_skipped() {
    let workspace = temp_dir("quizd-questions-import-ambiguous");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let test_id = setup_roster_and_test(&mut stdin, &mut reader, &workspace);

    let ambiguous = workspace.join("alice.johnson_and_bstone.json");
    std::fs::write(&ambiguous, VALID_QUIZ).expect("write ambiguous quiz");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "quizzes.importQuestions",
        json!({ "testId": test_id, "paths": [ambiguous.to_string_lossy()] }),
    );
    assert_eq!(result["skipped"].as_i64(), Some(1));
    assert_eq!(
        file_report(&result, "alice.johnson_and_bstone.json")["reason"].as_str(),
        Some("ambiguous student match")
    );
}
